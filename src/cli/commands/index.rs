//! Index command - index a directory into a collection

use crate::cli::output::{colors, format_duration, render_event};
use crate::cli::OutputFormat;
use crate::core::config::{Config, Device};
use crate::core::indexer::StartRequest;
use crate::core::progress::{ProgressEvent, ProgressObserver};
use crate::core::services::Services;
use crate::core::types::RunSummary;
use crate::core::xdg::XdgDirs;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the index command
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory to index
    pub directory: PathBuf,

    /// Only index files directly inside the directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Target collection (defaults to storage.collection_name)
    #[arg(long, short = 'c')]
    pub collection: Option<String>,

    /// Embedding model (overrides embedding.model_name)
    #[arg(long)]
    pub model: Option<String>,

    /// Characters per chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Chunks per embedding and write batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Memory budget for one embedding batch, in GB
    #[arg(long)]
    pub memory_limit: Option<f64>,

    /// Run embedding inference on CUDA
    #[arg(long)]
    pub use_cuda: bool,

    /// Drop the collection before indexing into it
    #[arg(long)]
    pub recreate: bool,

    /// Suppress progress output
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

impl IndexArgs {
    /// Overlay the per-run flags on the loaded configuration
    ///
    /// The caller validates the result.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.embedding.model_name = model.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config.indexing.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = self.chunk_overlap {
            config.indexing.chunk_overlap = chunk_overlap;
        }
        if let Some(batch_size) = self.batch_size {
            config.indexing.batch_size = batch_size;
        }
        if let Some(memory_limit) = self.memory_limit {
            config.embedding.memory_limit = memory_limit;
        }
        if self.use_cuda {
            config.embedding.device = Device::Cuda;
        }
    }
}

/// Execute the index command
///
/// Renders the run's progress events while it executes. Ctrl-C requests
/// cancellation, which takes effect before the next file.
pub async fn execute(
    args: IndexArgs,
    config: Config,
    xdg: &XdgDirs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    // Absolute paths keep document ids stable across working directories
    let directory = args
        .directory
        .canonicalize()
        .unwrap_or_else(|_| args.directory.clone());
    let recursive = config.indexing.recursive && !args.no_recursive;

    if !args.quiet && format == OutputFormat::Human {
        eprintln!(
            "Loading embedding model {}...",
            colors::dim(&config.embedding.model_name)
        );
    }

    let services = Services::load(config, xdg).await?;
    let orchestrator = services.orchestrator(args.collection.as_deref())?;

    let request = StartRequest::new(directory, recursive).with_recreate(args.recreate);
    let mut handle = orchestrator.start(request)?;
    let mut observer = handle.events();
    let cancel = handle.cancellation_token();

    let wait = handle.wait();
    tokio::pin!(wait);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    let result = loop {
        tokio::select! {
            result = &mut wait => break result,
            Some(event) = observer.recv() => print_event(&event, &args, format)?,
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                cancel.cancel();
                if format == OutputFormat::Human {
                    eprintln!("{}", colors::warning("Cancelling after the current file..."));
                }
            }
        }
    };

    drain(&mut observer, &args, format)?;

    let summary = result?;
    print_summary(&summary, format)?;

    Ok(())
}

/// Print events still buffered once the run has ended
fn drain(
    observer: &mut ProgressObserver,
    args: &IndexArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    while let Some(event) = observer.try_recv() {
        print_event(&event, args, format)?;
    }
    Ok(())
}

fn print_event(
    event: &ProgressEvent,
    args: &IndexArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.quiet {
        return Ok(());
    }

    match format {
        OutputFormat::Human => eprintln!("{}", render_event(event)),
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
    }
    Ok(())
}

fn print_summary(
    summary: &RunSummary,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => {
            let duration_secs = summary.duration_ms as f64 / 1000.0;
            println!(
                "{} {} files ({} chunks) into {} in {}",
                colors::success("Indexed"),
                colors::number(&(summary.total_files - summary.error_files).to_string()),
                colors::number(&summary.total_chunks.to_string()),
                colors::collection(&summary.collection),
                colors::number(&format_duration(duration_secs))
            );
            if summary.skipped_files > 0 {
                println!(
                    "Skipped: {} files",
                    colors::number(&summary.skipped_files.to_string())
                );
            }
            for failure in &summary.failures {
                println!(
                    "{} {}: {}",
                    colors::error("Failed"),
                    colors::file_path(&failure.file_path),
                    failure.error
                );
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({ "summary": summary }))?
            );
        }
    }

    Ok(())
}

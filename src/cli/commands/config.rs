//! Config command - show current configuration

use crate::cli::output::{colors, format_bytes, print_header};
use crate::cli::OutputFormat;
use crate::core::config::Config;
use crate::core::xdg::XdgDirs;
use clap::Args;
use serde::Serialize;

/// Arguments for the show-config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Also show resolved directories
    #[arg(long, short = 'a')]
    pub all: bool,
}

/// Resolved directories
#[derive(Debug, Serialize)]
pub struct PathsResponse {
    pub config_file: String,
    pub collections_dir: String,
    pub models_dir: String,
}

/// Configuration response
#[derive(Debug, Serialize)]
pub struct ConfigResponse<'a> {
    #[serde(flatten)]
    pub config: &'a Config,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathsResponse>,
}

/// Execute the show-config command
pub fn execute(
    args: ConfigArgs,
    config: &Config,
    xdg: &XdgDirs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let paths = args.all.then(|| PathsResponse {
        config_file: xdg.config_file().display().to_string(),
        collections_dir: config.storage.collections_dir().display().to_string(),
        models_dir: xdg.models_dir().display().to_string(),
    });

    match format {
        OutputFormat::Human => {
            let indexing = &config.indexing;
            print_header("Configuration:");
            println!("  indexing:");
            println!("    chunk_size: {}", indexing.chunk_size);
            println!("    chunk_overlap: {}", indexing.chunk_overlap);
            println!("    batch_size: {}", indexing.batch_size);
            println!("    max_content_length: {}", indexing.max_content_length);
            println!("    max_chunks_per_file: {}", indexing.max_chunks_per_file);
            println!(
                "    max_file_size: {}",
                format_bytes(indexing.max_file_size_mb as u64 * 1024 * 1024)
            );
            println!("    recursive: {}", indexing.recursive);
            println!("    extensions: {:?}", indexing.extensions);
            println!("    exclude_patterns: {:?}", indexing.exclude_patterns);
            println!("  embedding:");
            println!("    model_name: {}", config.embedding.model_name);
            println!(
                "    memory_limit: {}",
                format_bytes(config.embedding.memory_limit_bytes())
            );
            println!("    device: {}", config.embedding.device);
            println!("  storage:");
            println!("    data_dir: {}", config.storage.data_dir.display());
            println!(
                "    collection_name: {}",
                colors::collection(&config.storage.collection_name)
            );
            println!("  limits:");
            println!(
                "    operation_timeout_secs: {}",
                config.limits.operation_timeout_secs
            );
            println!("    progress_capacity: {}", config.limits.progress_capacity);

            if let Some(paths) = &paths {
                println!("  paths:");
                println!("    config_file: {}", colors::file_path(&paths.config_file));
                println!(
                    "    collections_dir: {}",
                    colors::file_path(&paths.collections_dir)
                );
                println!("    models_dir: {}", colors::file_path(&paths.models_dir));
            }
        }
        OutputFormat::Json => {
            let response = ConfigResponse { config, paths };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

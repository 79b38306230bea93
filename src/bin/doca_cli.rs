//! Doca CLI - Command-line interface for the Doca indexing pipeline
//!
//! # Examples
//!
//! ```bash
//! # Index a directory into the default collection
//! doca index ~/notes
//!
//! # Top level only, into a named collection, events as JSON lines
//! doca --format json index ./handbook --no-recursive --collection handbook
//!
//! # Show configuration
//! doca show-config
//! ```

use clap::Parser;
use doca::cli::{run, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging to stderr so stdout stays free for command output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "doca=info".into());

    let json = std::env::var("DOCA_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

//! CLI adapter for Doca
//!
//! Starts indexing runs from the command line and renders their progress
//! stream. Depends on `core/`; nothing in `core/` depends on it.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

/// Doca - Document Indexing Pipeline
///
/// Splits text documents into overlapping chunks, embeds them and stores
/// the vectors in a local collection.
#[derive(Parser, Debug)]
#[command(name = "doca")]
#[command(version)]
#[command(about = "Document chunking and embedding pipeline", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// How results and progress are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Colored lines for a terminal
    #[default]
    Human,
    /// JSON output for scripting (one progress event per line)
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a directory of documents into a collection
    Index(commands::IndexArgs),

    /// Print the effective configuration after file and env overrides
    #[command(name = "show-config")]
    ShowConfig(commands::ConfigArgs),

    /// Print a shell completion script
    ///
    /// For example:
    ///
    ///   bash:  doca completions bash > ~/.local/share/bash-completion/completions/doca
    ///   zsh:   doca completions zsh > ~/.zfunc/_doca
    ///   fish:  doca completions fish > ~/.config/fish/completions/doca.fish
    Completions(commands::CompletionsArgs),
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    use crate::core::config::Config;
    use crate::core::xdg::XdgDirs;

    let format = cli.format;
    let args = match cli.command {
        // Needs neither config nor services
        Commands::Completions(args) => return commands::completions::execute(args),
        Commands::ShowConfig(args) => {
            let xdg = XdgDirs::new();
            let config = Config::load_with_xdg(&xdg)?;
            return commands::config::execute(args, &config, &xdg, format);
        }
        Commands::Index(args) => args,
    };

    let xdg = XdgDirs::new();
    xdg.log_paths();
    xdg.ensure_dirs_exist()?;

    let mut config = Config::load_with_xdg(&xdg)?;
    args.apply_overrides(&mut config);
    config.validate()?;
    config.log_config();

    commands::index::execute(args, config, &xdg, format).await
}

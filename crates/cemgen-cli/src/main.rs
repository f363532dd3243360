//! cemgen CLI - Custom Elements Manifest generation
//!
//! # Usage
//!
//! ```bash
//! # Generate the manifest once
//! cemgen generate
//!
//! # Watch sources and regenerate on change
//! cemgen watch
//!
//! # Validate an existing manifest
//! cemgen validate custom-elements.json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// cemgen - Custom Elements Manifest generation from web component sources
#[derive(Parser, Debug)]
#[command(name = "cemgen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Project root to operate on
    #[arg(long, short = 'p', global = true, env = "CEMGEN_PROJECT")]
    project: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// Effective project root.
    pub fn project_root(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Convert global options to config overrides.
    pub fn to_config_overrides(&self) -> cemgen_config::ConfigOverrides {
        cemgen_config::ConfigOverrides {
            project_root: self.project.clone(),
            verbose: self.verbose,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the custom elements manifest
    Generate(commands::generate::GenerateArgs),

    /// Watch sources and regenerate on change
    Watch(commands::watch::WatchArgs),

    /// Validate an existing manifest file
    Validate(commands::validate::ValidateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Generate(args) => commands::generate::execute(args, cli.global),
        Commands::Watch(args) => commands::watch::execute(args, cli.global),
        Commands::Validate(args) => commands::validate::execute(args, cli.global),
    }
}

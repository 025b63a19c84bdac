//! Treewatch CLI - treewatch command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// Treewatch - recursive file system change watcher
#[derive(Parser)]
#[command(name = "treewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directories and print change events
    Watch {
        /// Absolute or relative paths to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Engine configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only report these kinds (e.g. "created,deleted,moved")
        #[arg(short, long)]
        events: Option<String>,

        /// Watch only the given paths, not their subdirectories
        #[arg(long)]
        no_recursive: bool,

        /// Milliseconds per wait; 0 blocks until something happens
        #[arg(long, default_value = "0")]
        timeout: u64,

        /// Exit after this many events
        #[arg(short = 'n', long)]
        max_events: Option<usize>,
    },
    /// Show the kernel's inotify limits
    Limits,
    /// Print the effective engine configuration as TOML
    Config {
        /// Configuration file to validate and print
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            paths,
            config,
            events,
            no_recursive,
            timeout,
            max_events,
        } => cmd::watch::run(cmd::watch::WatchArgs {
            paths,
            config,
            events,
            recursive: !no_recursive,
            timeout,
            max_events,
        }),
        Commands::Limits => cmd::limits::run(),
        Commands::Config { path } => cmd::config::run(path.as_deref()),
    }
}

//! Watch paths and stream events to stdout

use crate::output;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing::debug;
use treewatch_core::EngineConfig;
use watcher::{InotifyEngine, WaitStatus};

pub struct WatchArgs {
    pub paths: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub events: Option<String>,
    pub recursive: bool,
    pub timeout: u64,
    pub max_events: Option<usize>,
}

pub fn run(args: WatchArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(list) = &args.events {
        config.default_mask = output::parse_kinds(list)?;
    }
    if !args.recursive {
        config.recursive = false;
    }

    debug!("Engine config: {:?}", config);
    let mut engine =
        InotifyEngine::open(config).context("Failed to open inotify instance")?;

    for path in &args.paths {
        let path = absolute(path)?;
        engine.watch(&path).with_context(|| {
            format!(
                "Failed to watch {} ({})",
                path.display(),
                InotifyEngine::error_message(engine.last_error())
            )
        })?;
    }

    eprintln!(
        "{} {} directories",
        "Watching".bold(),
        engine.watch_count().to_string().cyan()
    );

    let mut printed = 0usize;
    loop {
        if engine.wait(args.timeout)? == WaitStatus::TimedOut {
            continue;
        }
        if let Err(err) = engine.drain() {
            // The engine stays usable after a failed cycle.
            eprintln!("{} {}", "warning:".yellow(), err);
        }
        for event in engine.drain_events() {
            println!("{}", output::format_event(&event));
            printed += 1;
            if args.max_events.is_some_and(|max| printed >= max) {
                return Ok(());
            }
        }
        if engine.watch_count() == 0 {
            eprintln!("{}", "Nothing left to watch".dimmed());
            return Ok(());
        }
    }
}

/// Make a command-line path absolute against the working directory
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

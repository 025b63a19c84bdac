//! Show kernel inotify limits

use anyhow::Result;
use owo_colors::OwoColorize;
use watcher::limits::{InotifyLimits, INOTIFY_PROC_DIR};

pub fn run() -> Result<()> {
    let limits = InotifyLimits::read();

    println!("{}", "inotify limits".bold());
    println!("{}: {}\n", "Location".dimmed(), INOTIFY_PROC_DIR.dimmed());

    for (name, value) in [
        ("max_user_watches", limits.max_user_watches),
        ("max_queued_events", limits.max_queued_events),
        ("max_user_instances", limits.max_user_instances),
    ] {
        match value {
            Some(value) => println!("  {} = {}", name.cyan(), value),
            None => println!("  {} = {}", name.cyan(), "unknown".yellow()),
        }
    }

    println!(
        "\n{}",
        "Each watched directory uses one watch; raise max_user_watches for large trees.".dimmed()
    );
    Ok(())
}

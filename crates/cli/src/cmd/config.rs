//! Print the effective engine configuration

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use treewatch_core::EngineConfig;

pub fn run(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Invalid config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let source = path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string());
    eprintln!("{}: {}", "Source".dimmed(), source.dimmed());
    print!("{}", config.to_toml_string()?);
    Ok(())
}

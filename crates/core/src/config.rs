//! Engine configuration
//!
//! Passed by value when an engine is constructed. Loadable from TOML:
//!
//! ```toml
//! default_mask = "CREATED | DELETED | MOVED_OUT | MOVED_IN"
//! recursive = true
//! read_buffer_size = 8192
//! ```

use crate::error::{Result, WatchError};
use crate::event::EventKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest buffer that can hold one maximal kernel record
/// (16-byte header + NAME_MAX + terminating NUL).
pub const MIN_READ_BUFFER_SIZE: usize = 16 + 255 + 1;

/// Upper bound on the read buffer (1 MiB)
pub const MAX_READ_BUFFER_SIZE: usize = 1 << 20;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mask applied by `WatchEngine::watch` (default: all subscribable kinds)
    pub default_mask: EventKind,

    /// Whether `WatchEngine::watch` registers recursively (default: true)
    pub recursive: bool,

    /// Bytes requested per read from the notification source (default: 8192)
    pub read_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mask: EventKind::ALL,
            recursive: true,
            read_buffer_size: 8192,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| WatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| WatchError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| WatchError::Config(e.to_string()))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(MIN_READ_BUFFER_SIZE..=MAX_READ_BUFFER_SIZE).contains(&self.read_buffer_size) {
            return Err(WatchError::Config(format!(
                "read_buffer_size must be within {}-{} (got {})",
                MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE, self.read_buffer_size
            )));
        }
        if self.default_mask != self.default_mask.subscribable() {
            return Err(WatchError::Config(format!(
                "default_mask may only contain subscribable kinds (got {})",
                self.default_mask
            )));
        }
        Ok(())
    }
}

//! Treewatch Core - shared vocabulary for the recursive watch engine
//!
//! This crate provides:
//! - The caller-visible event bits and event item
//! - The error taxonomy shared by the engine and its drivers
//! - The engine configuration value

pub mod config;
pub mod error;
pub mod event;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use error::{ErrorCode, Result, WatchError};
pub use event::{EventKind, WatchEvent};

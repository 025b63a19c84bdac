//! Recursive file system watching for treewatch
//!
//! This crate turns the raw inotify record stream into [`WatchEvent`]s:
//! - Incremental, torn-read-safe record decoding
//! - One watch per directory, extended as the tree grows
//! - Directory renames relabel existing watches instead of re-registering
//! - Modify/close coalescing (one event per write session)
//!
//! [`WatchEvent`]: treewatch_core::WatchEvent

pub mod codec;
pub mod correlate;
pub mod engine;
pub mod install;
pub mod limits;
pub mod platform;
pub mod source;
pub mod table;

#[cfg(test)]
mod testing;

pub use engine::{WaitStatus, WatchEngine};
pub use limits::InotifyLimits;
pub use source::{InotifyMask, NotifySource, WatchHandle};
pub use table::{WatchEntry, WatchTable};
pub use treewatch_core::{EngineConfig, EventKind, WatchError, WatchEvent};

#[cfg(target_os = "linux")]
pub use platform::InotifySource;

/// Engine backed by the running kernel's inotify
#[cfg(target_os = "linux")]
pub type InotifyEngine = WatchEngine<InotifySource>;

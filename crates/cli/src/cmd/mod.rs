//! CLI command implementations

pub mod config;
pub mod limits;
pub mod watch;

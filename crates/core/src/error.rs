//! Error taxonomy for watch operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for watch operations
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors surfaced by the watch engine
#[derive(Debug, Error)]
pub enum WatchError {
    /// Path is empty, relative, or (for recursive watches) not a directory
    #[error("invalid path: {}", .0.display())]
    InvalidParam(PathBuf),

    /// Path is already registered
    #[error("path already watched: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// No notification source is open
    #[error("notification source not initialized")]
    NotInitialized,

    /// The notification source could not be opened
    #[error("failed to open notification source: {0}")]
    SourceOpen(#[source] io::Error),

    /// The OS rejected a control call or a walk could not open a directory
    #[error("operation failed on {}: {source}", .path.display())]
    Operation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the notification stream failed
    #[error("notification stream error: {0}")]
    Stream(#[source] io::Error),

    /// Configuration could not be loaded or is out of range
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse error categories exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidParam,
    AlreadyExists,
    NotInitialized,
    UnknownError,
}

impl WatchError {
    /// Wrap an OS failure for `path`
    pub fn operation(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Operation {
            path: path.into(),
            source,
        }
    }

    /// Category of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParam(_) | Self::Config(_) => ErrorCode::InvalidParam,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::SourceOpen(_) | Self::Operation { .. } | Self::Stream(_) => {
                ErrorCode::UnknownError
            }
        }
    }

    /// Raw OS error number, when the failure came from the OS
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SourceOpen(source) | Self::Operation { source, .. } | Self::Stream(source) => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}

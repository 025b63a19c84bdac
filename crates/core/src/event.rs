//! Caller-visible event vocabulary
//!
//! The bit values below are treewatch's own; the watcher crate translates
//! kernel bits at its boundary.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

bitflags! {
    /// Kinds of change reported by the engine
    ///
    /// The subscribable kinds (`MODIFIED_AND_CLOSED` through `DELETED`) may be
    /// requested when registering a path. The remaining bits are attached by
    /// the engine itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EventKind: u32 {
        /// A file was written and then closed (coalesced write session)
        const MODIFIED_AND_CLOSED = 1 << 0;
        /// An item left its watched directory
        const MOVED_OUT           = 1 << 1;
        /// An item arrived in a watched directory
        const MOVED_IN            = 1 << 2;
        /// An item was created in a watched directory
        const CREATED             = 1 << 3;
        /// An item was deleted from a watched directory
        const DELETED             = 1 << 4;

        /// Watch coverage for a newly discovered subtree could not be installed
        const ERROR               = 1 << 8;
        /// The filesystem holding the watched path was unmounted
        const UNMOUNTED           = 1 << 9;
        /// The watch was released by the kernel
        const WATCH_INVALIDATED   = 1 << 10;
        /// The kernel queue overflowed and events were lost
        const QUEUE_OVERFLOW      = 1 << 11;
        /// The subject of the event is a directory
        const IS_DIRECTORY        = 1 << 15;

        /// Both halves of a move
        const MOVED = Self::MOVED_OUT.bits() | Self::MOVED_IN.bits();
        /// Every subscribable kind
        const ALL = Self::MODIFIED_AND_CLOSED.bits()
            | Self::MOVED.bits()
            | Self::CREATED.bits()
            | Self::DELETED.bits();
    }
}

/// Single-bit names in display order
const NAMES: &[(EventKind, &str)] = &[
    (EventKind::MODIFIED_AND_CLOSED, "MODIFIED_AND_CLOSED"),
    (EventKind::MOVED_OUT, "MOVED_OUT"),
    (EventKind::MOVED_IN, "MOVED_IN"),
    (EventKind::CREATED, "CREATED"),
    (EventKind::DELETED, "DELETED"),
    (EventKind::ERROR, "ERROR"),
    (EventKind::UNMOUNTED, "UNMOUNTED"),
    (EventKind::WATCH_INVALIDATED, "WATCH_INVALIDATED"),
    (EventKind::QUEUE_OVERFLOW, "QUEUE_OVERFLOW"),
    (EventKind::IS_DIRECTORY, "IS_DIRECTORY"),
];

impl EventKind {
    /// The subscribable part of this set
    pub fn subscribable(self) -> Self {
        self & Self::ALL
    }

    /// Kinds delivered regardless of the requested mask
    pub fn always_delivered() -> Self {
        Self::ERROR | Self::UNMOUNTED | Self::WATCH_INVALIDATED | Self::QUEUE_OVERFLOW
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("NONE")?;
        }
        Ok(())
    }
}

/// A normalized event handed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened
    pub kind: EventKind,
    /// Correlation token shared by the two halves of a move (0 otherwise)
    pub cookie: u32,
    /// Absolute path of the subject (empty for queue overflow)
    pub path: PathBuf,
}

impl WatchEvent {
    /// Create a new event
    pub fn new(kind: EventKind, cookie: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            cookie,
            path: path.into(),
        }
    }

    /// Synthetic event for a kernel queue overflow
    pub fn overflow(cookie: u32) -> Self {
        Self::new(EventKind::QUEUE_OVERFLOW, cookie, PathBuf::new())
    }

    /// Path of the subject
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the subject is a directory
    pub fn is_dir(&self) -> bool {
        self.kind.contains(EventKind::IS_DIRECTORY)
    }

    /// Whether the event carries a coverage-gap flag
    pub fn has_error(&self) -> bool {
        self.kind.contains(EventKind::ERROR)
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.kind)
    }
}

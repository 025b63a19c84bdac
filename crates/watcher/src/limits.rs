//! Kernel inotify limits
//!
//! Exhausting `max_user_watches` is the usual reason a large recursive
//! watch fails, so the engine reports these alongside ENOSPC.

use std::fmt;
use std::fs;
use std::path::Path;

/// Where the kernel publishes the inotify tunables
pub const INOTIFY_PROC_DIR: &str = "/proc/sys/fs/inotify";

/// Snapshot of the per-user inotify limits
///
/// A field is `None` when its file could not be read or parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InotifyLimits {
    pub max_user_watches: Option<u64>,
    pub max_queued_events: Option<u64>,
    pub max_user_instances: Option<u64>,
}

impl InotifyLimits {
    /// Read the limits of the running kernel
    pub fn read() -> Self {
        Self::read_from(Path::new(INOTIFY_PROC_DIR))
    }

    /// Read the limits from a directory laid out like [`INOTIFY_PROC_DIR`]
    pub fn read_from(dir: &Path) -> Self {
        Self {
            max_user_watches: read_value(&dir.join("max_user_watches")),
            max_queued_events: read_value(&dir.join("max_queued_events")),
            max_user_instances: read_value(&dir.join("max_user_instances")),
        }
    }
}

fn read_value(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

impl fmt::Display for InotifyLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: Option<u64>| value.map_or_else(|| "unknown".to_string(), |v| v.to_string());
        write!(
            f,
            "max_user_watches={} max_queued_events={} max_user_instances={}",
            show(self.max_user_watches),
            show(self.max_queued_events),
            show(self.max_user_instances)
        )
    }
}

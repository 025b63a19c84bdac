//! Notification source boundary
//!
//! The engine never talks to the kernel directly. It issues control calls
//! and reads raw record bytes through [`NotifySource`]; the Linux
//! implementation lives in [`crate::platform`].

use bitflags::bitflags;
use std::io;
use std::path::Path;
use std::time::Duration;
use treewatch_core::EventKind;

/// Opaque identifier the source assigns to a registered path
pub type WatchHandle = i32;

bitflags! {
    /// Source-level event bits (inotify layout)
    ///
    /// Only the watcher crate sees these; callers work with [`EventKind`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InotifyMask: u32 {
        const ACCESS        = 0x0000_0001;
        const MODIFY        = 0x0000_0002;
        const ATTRIB        = 0x0000_0004;
        const CLOSE_WRITE   = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN          = 0x0000_0020;
        const MOVED_FROM    = 0x0000_0040;
        const MOVED_TO      = 0x0000_0080;
        const CREATE        = 0x0000_0100;
        const DELETE        = 0x0000_0200;
        const DELETE_SELF   = 0x0000_0400;
        const MOVE_SELF     = 0x0000_0800;

        // Sent by the kernel without being requested
        const UNMOUNT       = 0x0000_2000;
        const Q_OVERFLOW    = 0x0000_4000;
        const IGNORED       = 0x0000_8000;

        // Registration flags
        const ONLYDIR       = 0x0100_0000;
        const DONT_FOLLOW   = 0x0200_0000;
        const EXCL_UNLINK   = 0x0400_0000;
        const MASK_ADD      = 0x2000_0000;
        const ISDIR         = 0x4000_0000;
        const ONESHOT       = 0x8000_0000;
    }
}

impl InotifyMask {
    /// Kernel mask to register for a caller's requested kinds
    ///
    /// Recursive registrations always subscribe to structural changes so
    /// coverage can follow the tree; the extra records are filtered out
    /// before they reach the caller. Returns an empty mask when nothing
    /// subscribable was requested.
    pub fn for_request(requested: EventKind, recursive: bool) -> Self {
        let requested = requested.subscribable();
        if requested.is_empty() {
            return Self::empty();
        }

        let mut mask = Self::DELETE_SELF;
        if requested.contains(EventKind::MODIFIED_AND_CLOSED) {
            mask |= Self::MODIFY | Self::CLOSE_WRITE;
        }
        if requested.contains(EventKind::MOVED_OUT) {
            mask |= Self::MOVED_FROM;
        }
        if requested.contains(EventKind::MOVED_IN) {
            mask |= Self::MOVED_TO;
        }
        if requested.contains(EventKind::CREATED) {
            mask |= Self::CREATE;
        }
        if requested.contains(EventKind::DELETED) {
            mask |= Self::DELETE;
        }
        if recursive {
            mask |= Self::CREATE | Self::MOVED_FROM | Self::MOVED_TO | Self::ONLYDIR;
        }
        mask
    }
}

/// A kernel-style notification primitive
///
/// Implementations must be non-blocking on `read`: an empty queue is
/// reported as [`io::ErrorKind::WouldBlock`].
pub trait NotifySource {
    /// Open a fresh source
    fn open() -> io::Result<Self>
    where
        Self: Sized;

    /// Register `path` and return its handle
    fn add_watch(&mut self, path: &Path, mask: InotifyMask) -> io::Result<WatchHandle>;

    /// Release a handle
    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()>;

    /// Drop bookkeeping for a handle the kernel has already released
    fn forget(&mut self, _handle: WatchHandle) {}

    /// Block until records are available or the timeout elapses
    ///
    /// `None` blocks indefinitely. Returns `false` on timeout.
    fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool>;

    /// Read raw record bytes into `buf`
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

//! inotify-backed notification source

use crate::source::{InotifyMask, NotifySource, WatchHandle};
use ahash::AHashMap;
use inotify::{Inotify, WatchDescriptor, WatchMask};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;
use std::time::Duration;

/// Non-blocking inotify instance
///
/// Handles are the kernel's watch descriptor ids. Dropping the source
/// closes the descriptor, which releases every handle registered on it.
#[derive(Debug)]
pub struct InotifySource {
    inotify: Inotify,
    descriptors: AHashMap<WatchHandle, WatchDescriptor>,
}

impl InotifySource {
    /// Open a non-blocking, close-on-exec inotify instance
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inotify: Inotify::init()?,
            descriptors: AHashMap::new(),
        })
    }

    /// Number of handles currently held
    pub fn handle_count(&self) -> usize {
        self.descriptors.len()
    }
}

impl NotifySource for InotifySource {
    fn open() -> io::Result<Self> {
        Self::new()
    }

    fn add_watch(&mut self, path: &Path, mask: InotifyMask) -> io::Result<WatchHandle> {
        let wd = self
            .inotify
            .watches()
            .add(path, WatchMask::from_bits_truncate(mask.bits()))?;
        let handle = wd.get_watch_descriptor_id();
        self.descriptors.insert(handle, wd);
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        let wd = self
            .descriptors
            .remove(&handle)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;
        self.inotify.watches().remove(wd)
    }

    fn forget(&mut self, handle: WatchHandle) {
        self.descriptors.remove(&handle);
    }

    fn wait_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        let timeout_ms = match timeout {
            Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
            None => -1,
        };
        let fd = self.inotify.as_fd();

        loop {
            let mut fds = [PollFd::new(&fd, PollFlags::POLLIN)];
            match poll(&mut fds, timeout_ms) {
                Ok(ready) => return Ok(ready > 0),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(self.inotify.as_raw_fd(), buf).map_err(io::Error::from)
    }
}

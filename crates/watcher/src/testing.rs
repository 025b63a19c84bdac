//! Scripted notification source for driving the engine in tests

use crate::codec::HEADER_SIZE;
use crate::source::{InotifyMask, NotifySource, WatchHandle};
use ahash::AHashMap;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Encode one record the way the kernel lays it out
pub(crate) fn encode_record(
    handle: WatchHandle,
    mask: InotifyMask,
    cookie: u32,
    name: Option<&str>,
) -> Vec<u8> {
    // Names are NUL-terminated and padded to the header alignment.
    let name_len = match name {
        Some(name) => (name.len() + 1).div_ceil(HEADER_SIZE) * HEADER_SIZE,
        None => 0,
    };

    let mut bytes = Vec::with_capacity(HEADER_SIZE + name_len);
    bytes.extend_from_slice(&handle.to_ne_bytes());
    bytes.extend_from_slice(&mask.bits().to_ne_bytes());
    bytes.extend_from_slice(&cookie.to_ne_bytes());
    bytes.extend_from_slice(&(name_len as u32).to_ne_bytes());
    if let Some(name) = name {
        bytes.extend_from_slice(name.as_bytes());
        bytes.resize(HEADER_SIZE + name_len, 0);
    }
    bytes
}

/// In-memory source that records control calls and replays queued bytes
#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    next_handle: WatchHandle,
    /// Every successful registration, in order
    pub adds: Vec<(PathBuf, InotifyMask)>,
    /// Every released handle, in order
    pub removes: Vec<WatchHandle>,
    /// Paths whose registration fails with the given errno
    pub failures: AHashMap<PathBuf, i32>,
    /// Paths that resolve to an existing handle
    pub aliases: AHashMap<PathBuf, WatchHandle>,
    /// Handles reported as released by the kernel
    pub forgotten: Vec<WatchHandle>,
    /// Chunks returned by successive reads
    pub chunks: VecDeque<Vec<u8>>,
    /// Error returned once the chunks run out (instead of WouldBlock)
    pub read_error: Option<io::ErrorKind>,
}

impl FakeSource {
    /// Queue one encoded record as its own read chunk
    pub fn push_record(
        &mut self,
        handle: WatchHandle,
        mask: InotifyMask,
        cookie: u32,
        name: Option<&str>,
    ) {
        self.chunks.push_back(encode_record(handle, mask, cookie, name));
    }

    /// Queue raw bytes as a read chunk
    pub fn push_bytes(&mut self, bytes: Vec<u8>) {
        self.chunks.push_back(bytes);
    }

    /// Make registration of `path` fail with `errno`
    pub fn fail_on(&mut self, path: impl Into<PathBuf>, errno: i32) {
        self.failures.insert(path.into(), errno);
    }

    /// Make registration of `path` return `handle`, as the kernel does for
    /// a second name of an already watched object
    pub fn alias(&mut self, path: impl Into<PathBuf>, handle: WatchHandle) {
        self.aliases.insert(path.into(), handle);
    }
}

impl NotifySource for FakeSource {
    fn open() -> io::Result<Self> {
        Ok(Self::default())
    }

    fn add_watch(&mut self, path: &Path, mask: InotifyMask) -> io::Result<WatchHandle> {
        if let Some(&errno) = self.failures.get(path) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if !path.exists() {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        self.adds.push((path.to_path_buf(), mask));
        if let Some(&handle) = self.aliases.get(path) {
            return Ok(handle);
        }
        self.next_handle += 1;
        Ok(self.next_handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        self.removes.push(handle);
        Ok(())
    }

    fn forget(&mut self, handle: WatchHandle) {
        self.forgotten.push(handle);
    }

    fn wait_readable(&mut self, _timeout: Option<Duration>) -> io::Result<bool> {
        Ok(!self.chunks.is_empty())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.chunks.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > buf.len() {
                    let rest = chunk.split_off(buf.len());
                    self.chunks.push_front(rest);
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => match self.read_error.take() {
                Some(kind) => Err(io::Error::from(kind)),
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            },
        }
    }
}

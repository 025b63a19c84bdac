//! Watch engine facade
//!
//! Owns the notification source, the watch table, pending rename state,
//! the set of paths written but not yet closed, and the output queue.
//!
//! The engine is single-threaded: `wait` checks readiness, `drain` reads
//! and dispatches everything available, and `drain_events` hands the
//! queued events to the caller. Confine an engine to one thread or
//! serialize those calls externally.

use crate::codec::{EventCodec, RawEvent};
use crate::correlate::{MoveResolution, RenameCorrelator};
use crate::install::{install_recursive, release, release_handle};
use crate::limits::InotifyLimits;
use crate::source::{InotifyMask, NotifySource, WatchHandle};
use crate::table::{normalize_path, WatchEntry, WatchTable};
use ahash::AHashSet;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use treewatch_core::{EngineConfig, EventKind, Result, WatchError, WatchEvent};

/// Outcome of [`WatchEngine::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Records are ready to be drained
    Ready,
    TimedOut,
}

/// Recursive watch engine over a [`NotifySource`]
pub struct WatchEngine<S: NotifySource> {
    config: EngineConfig,
    source: Option<S>,
    table: WatchTable,
    codec: EventCodec,
    correlator: RenameCorrelator,
    /// Paths with a modify record and no close-after-write yet
    modified: AHashSet<PathBuf>,
    queue: Vec<WatchEvent>,
    last_error: i32,
    read_buf: Vec<u8>,
}

impl<S: NotifySource> WatchEngine<S> {
    /// Create an engine without a source; call [`create_source`](Self::create_source) next
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let read_buf = vec![0u8; config.read_buffer_size];
        Ok(Self {
            config,
            source: None,
            table: WatchTable::new(),
            codec: EventCodec::new(),
            correlator: RenameCorrelator::new(),
            modified: AHashSet::new(),
            queue: Vec::new(),
            last_error: 0,
            read_buf,
        })
    }

    /// Create an engine and open its source
    pub fn open(config: EngineConfig) -> Result<Self> {
        let mut engine = Self::new(config)?;
        engine.create_source()?;
        Ok(engine)
    }

    /// Create an engine around an already opened source
    pub fn with_source(source: S, config: EngineConfig) -> Result<Self> {
        let mut engine = Self::new(config)?;
        engine.source = Some(source);
        Ok(engine)
    }

    /// Open the notification source
    pub fn create_source(&mut self) -> Result<()> {
        if self.source.is_some() {
            debug!("Notification source already open");
            return Ok(());
        }
        match S::open() {
            Ok(source) => {
                self.source = Some(source);
                Ok(())
            }
            Err(err) => {
                let err = WatchError::SourceOpen(err);
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Watch `path` using the configured default mask and recursion
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mask = self.config.default_mask;
        if self.config.recursive {
            self.watch_recursive(path, mask)
        } else {
            self.watch_path(path, mask)
        }
    }

    /// Watch a single file or directory (non-recursive)
    pub fn watch_path(&mut self, path: impl AsRef<Path>, mask: EventKind) -> Result<()> {
        self.watch_paths(&[path.as_ref()], mask)
    }

    /// Watch several paths (non-recursive)
    ///
    /// On failure, only the watches added by this call are rolled back.
    pub fn watch_paths<P: AsRef<Path>>(&mut self, paths: &[P], mask: EventKind) -> Result<()> {
        if self.source.is_none() {
            return Err(WatchError::NotInitialized);
        }
        let targets = self.validate_batch(paths, false)?;
        let kernel_mask = InotifyMask::for_request(mask, false);
        if kernel_mask.is_empty() {
            debug!("Nothing subscribable in {}, not registering", mask);
            return Ok(());
        }

        let mut added: Vec<WatchEntry> = Vec::new();
        for path in targets {
            let registered = match self.source.as_mut() {
                Some(source) => source.add_watch(&path, kernel_mask),
                None => return Err(WatchError::NotInitialized),
            };
            let handle = match registered {
                Ok(handle) => handle,
                Err(err) => {
                    self.rollback(&added);
                    let err = WatchError::operation(path, err);
                    self.record_failure(&err);
                    return Err(err);
                }
            };

            // Same object under another name: the kernel reused the handle.
            if self.table.contains_handle(handle) {
                self.restore_mask(handle);
                self.rollback(&added);
                return Err(WatchError::AlreadyExists(path));
            }
            if added.iter().any(|entry| entry.handle == handle) {
                self.rollback(&added);
                return Err(WatchError::AlreadyExists(path));
            }

            let entry = WatchEntry {
                handle,
                is_dir: path.is_dir(),
                path,
                mask,
                recursive: false,
            };
            added.extend(self.merge(vec![entry]));
        }

        for entry in &added {
            info!("Watching {}", entry.path.display());
        }
        Ok(())
    }

    /// Watch a directory and every directory below it
    pub fn watch_recursive(&mut self, path: impl AsRef<Path>, mask: EventKind) -> Result<()> {
        self.watch_recursive_paths(&[path.as_ref()], mask)
    }

    /// Watch several directory trees
    ///
    /// Each root must be an existing directory. On failure, only the
    /// watches added by this call are rolled back.
    pub fn watch_recursive_paths<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        mask: EventKind,
    ) -> Result<()> {
        if self.source.is_none() {
            return Err(WatchError::NotInitialized);
        }
        let roots = self.validate_batch(paths, true)?;
        if mask.subscribable().is_empty() {
            debug!("Nothing subscribable in {}, not registering", mask);
            return Ok(());
        }

        let mut added: Vec<WatchEntry> = Vec::new();
        for root in roots {
            // An earlier root in this batch may already cover it.
            if self.table.contains_path(&root) {
                self.rollback(&added);
                return Err(WatchError::AlreadyExists(root));
            }

            let staged = match self.source.as_mut() {
                Some(source) => install_recursive(source, &self.table, &root, mask),
                None => Err(WatchError::NotInitialized),
            };
            match staged {
                Ok(entries) => {
                    let merged = self.merge(entries);
                    info!(
                        "Watching {} recursively ({} directories)",
                        root.display(),
                        merged.len()
                    );
                    added.extend(merged);
                }
                Err(err) => {
                    self.rollback(&added);
                    self.record_failure(&err);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Stop watching exactly `path` (not the paths below it)
    pub fn remove_watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.source.is_none() {
            return Err(WatchError::NotInitialized);
        }
        let path = path.as_ref();
        let normalized =
            normalize_path(path).ok_or_else(|| WatchError::InvalidParam(path.to_path_buf()))?;
        let Some(entry) = self.table.get_by_path(&normalized).cloned() else {
            return Err(WatchError::InvalidParam(normalized));
        };

        self.table.remove(entry.handle);
        self.modified
            .retain(|p| p != &entry.path && p.parent() != Some(entry.path.as_path()));

        let released = match self.source.as_mut() {
            Some(source) => source.remove_watch(entry.handle),
            None => Ok(()),
        };
        if let Err(err) = released {
            let err = WatchError::operation(entry.path, err);
            self.record_failure(&err);
            return Err(err);
        }
        debug!("Stopped watching {}", normalized.display());
        Ok(())
    }

    /// Block until records are available; `0` waits indefinitely
    pub fn wait(&mut self, timeout_ms: u64) -> Result<WaitStatus> {
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        let source = self.source.as_mut().ok_or(WatchError::NotInitialized)?;
        match source.wait_readable(timeout) {
            Ok(true) => Ok(WaitStatus::Ready),
            Ok(false) => Ok(WaitStatus::TimedOut),
            Err(err) => {
                let err = WatchError::Stream(err);
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Read and dispatch everything currently available
    ///
    /// Returns the number of events queued by this call. A read error ends
    /// the cycle after dispatching what was already read; the engine stays
    /// usable.
    pub fn drain(&mut self) -> Result<usize> {
        if self.source.is_none() {
            return Err(WatchError::NotInitialized);
        }
        let queued_before = self.queue.len();
        let mut failure = None;

        loop {
            match self.read_chunk() {
                Ok(0) => break,
                Ok(_) => {
                    if let Err(err) = self.dispatch_buffered() {
                        failure = Some(err);
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    failure = Some(WatchError::Stream(err));
                    break;
                }
            }
        }

        // Departures left unpaired at the end of the batch left our scope.
        for resolution in self.correlator.finish() {
            self.apply_move(resolution, None);
        }

        if let Some(err) = failure {
            warn!("Drain aborted: {}", err);
            self.record_failure(&err);
            return Err(err);
        }
        Ok(self.queue.len() - queued_before)
    }

    /// Take every queued event
    pub fn drain_events(&mut self) -> Vec<WatchEvent> {
        mem::take(&mut self.queue)
    }

    /// Wait, drain, and take the resulting events in one call
    pub fn poll_events(&mut self, timeout_ms: u64) -> Result<Vec<WatchEvent>> {
        if self.wait(timeout_ms)? == WaitStatus::Ready {
            self.drain()?;
        }
        Ok(self.drain_events())
    }

    /// Most recent OS error number (0 if none)
    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    /// Human-readable text for an OS error number
    pub fn error_message(code: i32) -> String {
        io::Error::from_raw_os_error(code).to_string()
    }

    /// Close the source and forget all state
    ///
    /// Closing the source releases every handle at once.
    pub fn destroy(&mut self) {
        let watches = self.table.drain().len();
        if self.source.take().is_some() {
            debug!("Closed notification source ({} watches)", watches);
        }
        self.codec.clear();
        self.correlator.clear();
        self.modified.clear();
        self.queue.clear();
        self.last_error = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.source.as_mut()
    }

    /// Number of active watches
    pub fn watch_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.table.contains_path(path)
    }

    pub fn handle_of(&self, path: &Path) -> Option<WatchHandle> {
        self.table.get_by_path(path).map(|entry| entry.handle)
    }

    /// Sorted list of watched paths
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.table.paths()
    }

    fn validate_batch<P: AsRef<Path>>(&self, paths: &[P], require_dir: bool) -> Result<Vec<PathBuf>> {
        let mut targets: Vec<PathBuf> = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let normalized =
                normalize_path(path).ok_or_else(|| WatchError::InvalidParam(path.to_path_buf()))?;
            // Recursive roots must be real directories, not links to one.
            let is_real_dir = normalized
                .symlink_metadata()
                .is_ok_and(|meta| meta.file_type().is_dir());
            if require_dir && !is_real_dir {
                return Err(WatchError::InvalidParam(normalized));
            }
            if self.table.contains_path(&normalized) || targets.contains(&normalized) {
                return Err(WatchError::AlreadyExists(normalized));
            }
            targets.push(normalized);
        }
        Ok(targets)
    }

    fn merge(&mut self, entries: Vec<WatchEntry>) -> Vec<WatchEntry> {
        let mut merged = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.table.insert(entry.clone()) {
                Ok(()) => merged.push(entry),
                Err(err) => warn!("Dropping staged watch: {}", err),
            }
        }
        merged
    }

    fn rollback(&mut self, added: &[WatchEntry]) {
        for entry in added {
            self.table.remove(entry.handle);
        }
        if let Some(source) = self.source.as_mut() {
            release(source, added);
        }
        if !added.is_empty() {
            debug!("Rolled back {} watches", added.len());
        }
    }

    /// Re-register an existing entry after the kernel replaced its mask
    fn restore_mask(&mut self, handle: WatchHandle) {
        let Some(entry) = self.table.get(handle) else {
            return;
        };
        let mask = InotifyMask::for_request(entry.mask, entry.recursive);
        if let Some(source) = self.source.as_mut() {
            if let Err(err) = source.add_watch(&entry.path, mask) {
                warn!("Could not restore mask on {}: {}", entry.path.display(), err);
            }
        }
    }

    fn record_failure(&mut self, err: &WatchError) {
        let Some(errno) = err.raw_os_error() else {
            return;
        };
        self.last_error = errno;
        if errno == libc::ENOSPC {
            warn!(
                "Out of inotify watches ({}); raise fs.inotify.max_user_watches",
                InotifyLimits::read()
            );
        }
    }

    fn read_chunk(&mut self) -> io::Result<usize> {
        let Some(source) = self.source.as_mut() else {
            return Ok(0);
        };
        let n = source.read(&mut self.read_buf)?;
        self.codec.extend(&self.read_buf[..n]);
        Ok(n)
    }

    fn dispatch_buffered(&mut self) -> Result<()> {
        loop {
            match self.codec.decode_next() {
                Ok(Some(raw)) => self.dispatch(raw),
                Ok(None) => return Ok(()),
                Err(err) => {
                    self.codec.clear();
                    return Err(WatchError::Stream(io::Error::new(
                        io::ErrorKind::InvalidData,
                        err,
                    )));
                }
            }
        }
    }

    fn dispatch(&mut self, raw: RawEvent) {
        let mask = raw.mask;

        if mask.contains(InotifyMask::Q_OVERFLOW) {
            warn!("Notification queue overflowed, events were lost");
            self.queue.push(WatchEvent::overflow(raw.cookie));
            return;
        }

        // The kernel has dropped the handle, whether or not we still track it.
        if mask.contains(InotifyMask::IGNORED) {
            if let Some(source) = self.source.as_mut() {
                source.forget(raw.handle);
            }
        }

        let Some(entry) = self.table.get(raw.handle).cloned() else {
            debug!("Dropping record for unknown handle {} ({:?})", raw.handle, mask);
            return;
        };

        if mask.contains(InotifyMask::IGNORED) {
            self.table.remove(raw.handle);
            debug!("Watch on {} invalidated", entry.path.display());
            return;
        }

        if mask.contains(InotifyMask::UNMOUNT) {
            let path = entry.path.clone();
            self.emit(&entry, EventKind::DELETED | EventKind::UNMOUNTED, 0, path, entry.is_dir);
            self.table.remove(raw.handle);
            if let Some(source) = self.source.as_mut() {
                release_handle(source, raw.handle);
            }
            return;
        }

        if mask.contains(InotifyMask::DELETE_SELF) {
            // The kernel drops the handle itself.
            self.table.remove(raw.handle);
            let parent_watched = entry
                .path
                .parent()
                .is_some_and(|parent| self.table.contains_path(parent));
            if !parent_watched {
                let path = entry.path.clone();
                self.emit(&entry, EventKind::WATCH_INVALIDATED, 0, path, entry.is_dir);
            }
            return;
        }

        let is_dir = mask.contains(InotifyMask::ISDIR);
        let path = match &raw.name {
            Some(name) => entry.path.join(name),
            None if !entry.is_dir => entry.path.clone(),
            None => {
                debug!("Discarding name-less {:?} on {}", mask, entry.path.display());
                return;
            }
        };

        if mask.contains(InotifyMask::CREATE) {
            let mut kind = EventKind::CREATED;
            if is_dir && entry.recursive && self.extend_coverage(&path, entry.mask).is_err() {
                kind |= EventKind::ERROR;
            }
            self.emit(&entry, kind, raw.cookie, path.clone(), is_dir);
        }

        if mask.contains(InotifyMask::MODIFY) {
            self.modified.insert(path.clone());
        }

        if mask.contains(InotifyMask::CLOSE_WRITE) && self.modified.remove(&path) {
            self.emit(&entry, EventKind::MODIFIED_AND_CLOSED, raw.cookie, path.clone(), is_dir);
        }

        if mask.contains(InotifyMask::MOVED_FROM) {
            for resolution in self.correlator.depart(raw.cookie, path.clone(), is_dir) {
                self.apply_move(resolution, None);
            }
            self.emit(&entry, EventKind::MOVED_OUT, raw.cookie, path.clone(), is_dir);
        }

        if mask.contains(InotifyMask::MOVED_TO) {
            let resolution = self.correlator.arrive(raw.cookie, path.clone(), is_dir);
            let mut kind = EventKind::MOVED_IN;
            if !self.apply_move(resolution, Some(&entry)) {
                kind |= EventKind::ERROR;
            }
            self.emit(&entry, kind, raw.cookie, path.clone(), is_dir);
        }

        if mask.contains(InotifyMask::DELETE) {
            self.modified.remove(&path);
            self.emit(&entry, EventKind::DELETED, raw.cookie, path, is_dir);
        }
    }

    /// Update the table for a resolved move
    ///
    /// `destination` is the watch the item arrived under, if any. Returns
    /// false when coverage of an arriving directory could not be extended.
    fn apply_move(&mut self, resolution: MoveResolution, destination: Option<&WatchEntry>) -> bool {
        match resolution {
            MoveResolution::Renamed { from, to, is_dir } => {
                let relabelled = self.table.rewrite_prefix(&from, &to);
                self.rekey_modified(&from, &to);
                debug!(
                    "Renamed {} -> {} ({} watches relabelled)",
                    from.display(),
                    to.display(),
                    relabelled
                );
                // Arrived from a part of the tree we were not covering.
                match destination {
                    Some(dest) if is_dir && dest.recursive && !self.table.contains_path(&to) => {
                        self.extend_coverage(&to, dest.mask).is_ok()
                    }
                    _ => true,
                }
            }
            MoveResolution::MovedIntoScope { to, is_dir } => match destination {
                Some(dest) if is_dir && dest.recursive => self.extend_coverage(&to, dest.mask).is_ok(),
                _ => true,
            },
            MoveResolution::MovedOutOfScope { from, .. } => {
                let removed = self.table.remove_prefix(&from);
                if !removed.is_empty() {
                    debug!(
                        "{} left the watched tree, dropping {} watches",
                        from.display(),
                        removed.len()
                    );
                    if let Some(source) = self.source.as_mut() {
                        release(source, &removed);
                    }
                }
                self.modified.retain(|p| !p.starts_with(&from));
                true
            }
        }
    }

    /// Install recursive watches on a directory that just appeared
    fn extend_coverage(&mut self, path: &Path, mask: EventKind) -> Result<usize> {
        if self.table.contains_path(path) {
            return Ok(0);
        }
        let staged = match self.source.as_mut() {
            Some(source) => install_recursive(source, &self.table, path, mask),
            None => Err(WatchError::NotInitialized),
        };
        match staged {
            Ok(entries) => Ok(self.merge(entries).len()),
            Err(err) => {
                warn!("Could not watch new directory {}: {}", path.display(), err);
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    fn rekey_modified(&mut self, from: &Path, to: &Path) {
        let moved: Vec<PathBuf> = self
            .modified
            .iter()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            self.modified.remove(&old);
            if let Ok(rest) = old.strip_prefix(from) {
                let new = if rest.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rest)
                };
                self.modified.insert(new);
            }
        }
    }

    /// Queue an event if the watch that saw it subscribed to its kind
    fn emit(&mut self, scope: &WatchEntry, mut kind: EventKind, cookie: u32, path: PathBuf, is_dir: bool) {
        let wanted = kind.subscribable().intersects(scope.mask)
            || kind.intersects(EventKind::always_delivered());
        if !wanted {
            return;
        }
        if is_dir {
            kind |= EventKind::IS_DIRECTORY;
        }
        self.queue.push(WatchEvent::new(kind, cookie, path));
    }
}

impl<S: NotifySource> Drop for WatchEngine<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

//! Recursive watch installation
//!
//! Walks a directory tree depth-first and registers one watch per
//! directory. New entries are staged and only handed back once the whole
//! walk succeeds; on failure every staged handle is released again so the
//! caller never sees a partially covered subtree.

use crate::source::{InotifyMask, NotifySource, WatchHandle};
use crate::table::{WatchEntry, WatchTable};
use std::io;
use std::path::Path;
use tracing::{debug, error, warn};
use treewatch_core::{EventKind, Result, WatchError};
use walkdir::WalkDir;

/// Register every directory under `root` (inclusive)
///
/// Directories already present in `table` are descended into but not
/// registered again. Returns the staged entries; the caller merges them.
pub fn install_recursive<S: NotifySource>(
    source: &mut S,
    table: &WatchTable,
    root: &Path,
    mask: EventKind,
) -> Result<Vec<WatchEntry>> {
    let kernel_mask = InotifyMask::for_request(mask, true);
    let mut staged: Vec<WatchEntry> = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                let depth = err.depth();
                let path = err.path().unwrap_or(root).to_path_buf();
                let skippable = depth > 0 && (err.loop_ancestor().is_some() || is_skippable(err.io_error()));
                if skippable {
                    warn!("Skipping {} during recursive walk: {}", path.display(), err);
                    continue;
                }
                error!("Recursive walk of {} aborted: {}", root.display(), err);
                release(source, &staged);
                return Err(WatchError::operation(path, io::Error::from(err)));
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        if table.contains_path(path) {
            debug!("{} already watched, descending only", path.display());
            continue;
        }

        let handle = match source.add_watch(path, kernel_mask) {
            Ok(handle) => handle,
            Err(err) if entry.depth() > 0 && is_skippable(Some(&err)) => {
                warn!("Skipping {}: {}", path.display(), err);
                walker.skip_current_dir();
                continue;
            }
            Err(err) => {
                error!("Recursive walk of {} aborted at {}: {}", root.display(), path.display(), err);
                release(source, &staged);
                return Err(WatchError::operation(path, err));
            }
        };

        // Bind mounts can hand back a handle we already hold. The kernel
        // replaced its mask, so put the owner's back and skip the alias.
        let owner = table
            .get(handle)
            .or_else(|| staged.iter().find(|e| e.handle == handle));
        if let Some(owner) = owner {
            warn!(
                "{} is another name for {} (handle {}), skipping",
                path.display(),
                owner.path.display(),
                handle
            );
            let owner_mask = InotifyMask::for_request(owner.mask, owner.recursive);
            let owner_path = owner.path.clone();
            if let Err(err) = source.add_watch(&owner_path, owner_mask) {
                warn!("Could not restore mask on {}: {}", owner_path.display(), err);
            }
            walker.skip_current_dir();
            continue;
        }

        staged.push(WatchEntry::directory(handle, path.to_path_buf(), mask, true));
    }

    debug!(
        "Installed {} watches under {}",
        staged.len(),
        root.display()
    );
    Ok(staged)
}

/// Release every handle in `entries`, ignoring failures
pub(crate) fn release<S: NotifySource>(source: &mut S, entries: &[WatchEntry]) {
    for entry in entries {
        release_handle(source, entry.handle);
    }
}

pub(crate) fn release_handle<S: NotifySource>(source: &mut S, handle: WatchHandle) {
    if let Err(err) = source.remove_watch(handle) {
        debug!("Releasing handle {} failed: {}", handle, err);
    }
}

/// Per-child failures that skip the child instead of aborting the walk
fn is_skippable(err: Option<&io::Error>) -> bool {
    let Some(err) = err else {
        return false;
    };
    match err.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound => true,
        _ => err.raw_os_error() == Some(libc::ELOOP),
    }
}

//! Bidirectional handle <-> path table
//!
//! Handles refer to filesystem objects, not names, so a directory rename
//! leaves every handle below it valid. The table is therefore re-labelled
//! on rename instead of re-registered.
//!
//! Paths are compared component-wise (`Path::starts_with`), so `/data/a`
//! is never treated as a prefix of `/data/ab`.

use crate::source::WatchHandle;
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use treewatch_core::EventKind;

/// One registered path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub handle: WatchHandle,
    /// Absolute, normalized path
    pub path: PathBuf,
    /// Kinds the caller asked to see
    pub mask: EventKind,
    /// Whether new subdirectories get watched automatically
    pub recursive: bool,
    pub is_dir: bool,
}

impl WatchEntry {
    /// Entry for a directory registered as part of a recursive watch
    pub fn directory(handle: WatchHandle, path: PathBuf, mask: EventKind, recursive: bool) -> Self {
        Self {
            handle,
            path,
            mask,
            recursive,
            is_dir: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("handle {0} is already in the table")]
    DuplicateHandle(WatchHandle),
    #[error("path {} is already in the table", .0.display())]
    DuplicatePath(PathBuf),
}

/// Normalize a caller-supplied path
///
/// Returns `None` for empty or relative paths. Repeated and trailing
/// separators are dropped.
pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }
    Some(path.components().collect())
}

/// Watch table with O(1) lookup in both directions
#[derive(Debug, Default)]
pub struct WatchTable {
    by_handle: AHashMap<WatchHandle, WatchEntry>,
    by_path: AHashMap<PathBuf, WatchHandle>,
}

impl WatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Insert a new entry
    pub fn insert(&mut self, entry: WatchEntry) -> Result<(), TableError> {
        if self.by_handle.contains_key(&entry.handle) {
            return Err(TableError::DuplicateHandle(entry.handle));
        }
        if self.by_path.contains_key(&entry.path) {
            return Err(TableError::DuplicatePath(entry.path));
        }
        self.by_path.insert(entry.path.clone(), entry.handle);
        self.by_handle.insert(entry.handle, entry);
        Ok(())
    }

    pub fn get(&self, handle: WatchHandle) -> Option<&WatchEntry> {
        self.by_handle.get(&handle)
    }

    pub fn get_by_path(&self, path: &Path) -> Option<&WatchEntry> {
        self.by_path
            .get(path)
            .and_then(|handle| self.by_handle.get(handle))
    }

    pub fn contains_handle(&self, handle: WatchHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    /// Remove an entry by handle
    pub fn remove(&mut self, handle: WatchHandle) -> Option<WatchEntry> {
        let entry = self.by_handle.remove(&handle)?;
        // A rename onto this path may already have re-pointed the label.
        if self.by_path.get(&entry.path) == Some(&handle) {
            self.by_path.remove(&entry.path);
        }
        Some(entry)
    }

    /// Replace `old_prefix` with `new_prefix` on every entry rooted at it
    ///
    /// Handles are preserved. Returns the number of entries relabelled; a
    /// second call with the same arguments relabels nothing.
    pub fn rewrite_prefix(&mut self, old_prefix: &Path, new_prefix: &Path) -> usize {
        if old_prefix == new_prefix {
            return 0;
        }

        let moves: Vec<(WatchHandle, PathBuf, PathBuf)> = self
            .by_handle
            .values()
            .filter_map(|entry| {
                let rest = entry.path.strip_prefix(old_prefix).ok()?;
                let new_path = if rest.as_os_str().is_empty() {
                    new_prefix.to_path_buf()
                } else {
                    new_prefix.join(rest)
                };
                Some((entry.handle, entry.path.clone(), new_path))
            })
            .collect();

        for (handle, old_path, _) in &moves {
            if self.by_path.get(old_path) == Some(handle) {
                self.by_path.remove(old_path);
            }
        }
        for (handle, _, new_path) in &moves {
            if let Some(stale) = self.by_path.insert(new_path.clone(), *handle) {
                // The destination was replaced; its own invalidation record
                // will remove the stale entry.
                debug!("Rename displaced handle {} at {}", stale, new_path.display());
            }
            if let Some(entry) = self.by_handle.get_mut(handle) {
                entry.path = new_path.clone();
            }
        }

        moves.len()
    }

    /// Remove every entry rooted at `root` (including `root` itself)
    pub fn remove_prefix(&mut self, root: &Path) -> Vec<WatchEntry> {
        let handles: Vec<WatchHandle> = self
            .by_handle
            .values()
            .filter(|entry| entry.path.starts_with(root))
            .map(|entry| entry.handle)
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| self.remove(handle))
            .collect()
    }

    /// Sorted list of watched paths
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Remove everything, returning the removed entries
    pub fn drain(&mut self) -> Vec<WatchEntry> {
        self.by_path.clear();
        self.by_handle.drain().map(|(_, entry)| entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(handle: WatchHandle, path: &str) -> WatchEntry {
        WatchEntry::directory(handle, PathBuf::from(path), EventKind::ALL, true)
    }

    fn table_with(entries: &[(WatchHandle, &str)]) -> WatchTable {
        let mut table = WatchTable::new();
        for (handle, path) in entries {
            table.insert(dir(*handle, path)).unwrap();
        }
        table
    }

    #[test]
    fn test_lookup_both_directions() {
        let table = table_with(&[(1, "/data"), (2, "/data/a")]);
        assert_eq!(table.get(2).unwrap().path, PathBuf::from("/data/a"));
        assert_eq!(table.get_by_path(Path::new("/data")).unwrap().handle, 1);
        assert!(table.get(3).is_none());
        assert!(table.get_by_path(Path::new("/data/b")).is_none());
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let mut table = table_with(&[(1, "/data")]);
        assert_eq!(
            table.insert(dir(1, "/other")),
            Err(TableError::DuplicateHandle(1))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut table = table_with(&[(1, "/data")]);
        assert_eq!(
            table.insert(dir(2, "/data")),
            Err(TableError::DuplicatePath(PathBuf::from("/data")))
        );
    }

    #[test]
    fn test_remove_clears_both_maps() {
        let mut table = table_with(&[(1, "/data"), (2, "/data/a")]);
        let removed = table.remove(2).unwrap();
        assert_eq!(removed.path, PathBuf::from("/data/a"));
        assert!(!table.contains_path(Path::new("/data/a")));
        assert!(!table.contains_handle(2));
        assert!(table.remove(2).is_none());
    }

    #[test]
    fn test_rewrite_prefix_preserves_handles() {
        let mut table = table_with(&[
            (1, "/data"),
            (2, "/data/a"),
            (3, "/data/a/x"),
            (4, "/data/a/x/y"),
        ]);

        let count = table.rewrite_prefix(Path::new("/data/a"), Path::new("/data/c"));

        assert_eq!(count, 3);
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(2).unwrap().path, PathBuf::from("/data/c"));
        assert_eq!(table.get(3).unwrap().path, PathBuf::from("/data/c/x"));
        assert_eq!(table.get_by_path(Path::new("/data/c/x/y")).unwrap().handle, 4);
        assert!(!table.contains_path(Path::new("/data/a")));
        assert_eq!(table.get(1).unwrap().path, PathBuf::from("/data"));
    }

    #[test]
    fn test_rewrite_prefix_is_idempotent() {
        let mut table = table_with(&[(1, "/data"), (2, "/data/a"), (3, "/data/a/x")]);
        table.rewrite_prefix(Path::new("/data/a"), Path::new("/data/c"));
        let before = table.paths();

        assert_eq!(
            table.rewrite_prefix(Path::new("/data/a"), Path::new("/data/c")),
            0
        );
        assert_eq!(table.paths(), before);
    }

    #[test]
    fn test_rewrite_prefix_ignores_name_prefix_siblings() {
        let mut table = table_with(&[(1, "/data/a"), (2, "/data/ab"), (3, "/data/ab/z")]);

        table.rewrite_prefix(Path::new("/data/a"), Path::new("/data/q"));

        assert_eq!(table.get(1).unwrap().path, PathBuf::from("/data/q"));
        assert_eq!(table.get(2).unwrap().path, PathBuf::from("/data/ab"));
        assert_eq!(table.get(3).unwrap().path, PathBuf::from("/data/ab/z"));
    }

    #[test]
    fn test_rename_over_existing_keeps_stale_handle_until_removed() {
        let mut table = table_with(&[(1, "/data/a"), (2, "/data/b")]);

        table.rewrite_prefix(Path::new("/data/a"), Path::new("/data/b"));
        assert_eq!(table.get_by_path(Path::new("/data/b")).unwrap().handle, 1);

        // The displaced entry's removal must not drop the new label.
        table.remove(2);
        assert_eq!(table.get_by_path(Path::new("/data/b")).unwrap().handle, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_prefix_takes_subtree_only() {
        let mut table = table_with(&[
            (1, "/data"),
            (2, "/data/a"),
            (3, "/data/a/x"),
            (4, "/data/ab"),
        ]);

        let mut removed: Vec<WatchHandle> = table
            .remove_prefix(Path::new("/data/a"))
            .into_iter()
            .map(|e| e.handle)
            .collect();
        removed.sort();

        assert_eq!(removed, vec![2, 3]);
        assert_eq!(table.paths(), vec![PathBuf::from("/data"), PathBuf::from("/data/ab")]);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/data//a/")),
            Some(PathBuf::from("/data/a"))
        );
        assert_eq!(normalize_path(Path::new("data/a")), None);
        assert_eq!(normalize_path(Path::new("")), None);
    }
}

//! Rename correlation
//!
//! A move shows up as two records sharing a cookie: a departure in the
//! source directory and an arrival in the destination. Pending departures
//! are keyed by cookie so unrelated records between the two halves do not
//! break the pairing.
//!
//! A departure is abandoned (treated as a move out of scope) when a
//! different departure arrives after it, or when the batch that produced
//! it has been fully dispatched.

use ahash::AHashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingRename {
    path: PathBuf,
    is_dir: bool,
}

/// Outcome of correlating one half of a move
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResolution {
    /// Both halves seen: the item moved within the watched tree
    Renamed {
        from: PathBuf,
        to: PathBuf,
        is_dir: bool,
    },
    /// Arrival with no matching departure: the item came from outside
    MovedIntoScope { to: PathBuf, is_dir: bool },
    /// Departure never matched: the item left the watched tree
    MovedOutOfScope { from: PathBuf, is_dir: bool },
}

#[derive(Debug, Default)]
pub struct RenameCorrelator {
    pending: AHashMap<u32, PendingRename>,
}

impl RenameCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unresolved departures
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record a departure
    ///
    /// Any departure pending under a different cookie is resolved as moved
    /// out of scope and returned. A repeated departure for the same cookie
    /// replaces the earlier one.
    pub fn depart(&mut self, cookie: u32, path: PathBuf, is_dir: bool) -> Vec<MoveResolution> {
        let evicted = self.evict(|pending_cookie| pending_cookie != cookie);
        self.pending.insert(cookie, PendingRename { path, is_dir });
        evicted
    }

    /// Resolve an arrival against the pending departures
    ///
    /// Only a departure with the same cookie is consumed.
    pub fn arrive(&mut self, cookie: u32, to: PathBuf, is_dir: bool) -> MoveResolution {
        // The kernel never pairs on a zero cookie.
        let pending = if cookie == 0 {
            None
        } else {
            self.pending.remove(&cookie)
        };

        match pending {
            Some(pending) => MoveResolution::Renamed {
                from: pending.path,
                to,
                is_dir: pending.is_dir,
            },
            None => MoveResolution::MovedIntoScope { to, is_dir },
        }
    }

    /// Resolve everything still pending as moved out of scope
    pub fn finish(&mut self) -> Vec<MoveResolution> {
        self.evict(|_| true)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn evict(&mut self, mut pred: impl FnMut(u32) -> bool) -> Vec<MoveResolution> {
        let cookies: Vec<u32> = self
            .pending
            .keys()
            .copied()
            .filter(|&cookie| pred(cookie))
            .collect();

        let mut evicted: Vec<MoveResolution> = cookies
            .into_iter()
            .filter_map(|cookie| self.pending.remove(&cookie))
            .map(|pending| MoveResolution::MovedOutOfScope {
                from: pending.path,
                is_dir: pending.is_dir,
            })
            .collect();
        // Map order is arbitrary; keep the output stable.
        evicted.sort_by(|a, b| resolution_path(a).cmp(resolution_path(b)));
        evicted
    }
}

fn resolution_path(resolution: &MoveResolution) -> &PathBuf {
    match resolution {
        MoveResolution::Renamed { from, .. } => from,
        MoveResolution::MovedIntoScope { to, .. } => to,
        MoveResolution::MovedOutOfScope { from, .. } => from,
    }
}

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::types::Csn;

/// Tracks snapshots of catalog readers so vacuum keeps the versions they
/// can still see.
///
/// Readers register the commit sequence number they read at; several
/// readers may share one csn. [`oldest_active`](Self::oldest_active) is the
/// horizon [`IndexCatalog::vacuum`](crate::catalog::IndexCatalog::vacuum)
/// passes to [`InMemoryOrderedMap::vacuum`](super::InMemoryOrderedMap::vacuum).
pub struct SnapshotTracker {
    /// Reader count per csn.
    active: Mutex<BTreeMap<Csn, usize>>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a reader at `csn`. The returned guard deregisters it on drop.
    pub fn register(&self, csn: Csn) -> SnapshotGuard<'_> {
        *self.active.lock().entry(csn).or_insert(0) += 1;
        SnapshotGuard { tracker: self, csn }
    }

    /// Oldest registered snapshot, or `None` if there are no readers.
    pub fn oldest_active(&self) -> Option<Csn> {
        self.active.lock().keys().next().copied()
    }

    /// Number of registered readers.
    pub fn active_count(&self) -> usize {
        self.active.lock().values().sum()
    }

    fn release(&self, csn: Csn) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&csn) {
            *count -= 1;
            if *count == 0 {
                active.remove(&csn);
            }
        }
    }
}

impl Default for SnapshotTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a registered snapshot.
pub struct SnapshotGuard<'a> {
    tracker: &'a SnapshotTracker,
    csn: Csn,
}

impl SnapshotGuard<'_> {
    pub fn csn(&self) -> Csn {
        self.csn
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release(self.csn);
    }
}

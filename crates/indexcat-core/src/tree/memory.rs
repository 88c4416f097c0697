//! MVCC ordered map kept in memory.
//!
//! Each key holds its version history, oldest first. A version is visible to
//! a snapshot at `csn` if it was created at or before `csn` and is either not
//! deleted or deleted after `csn`.

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::debug;

use crate::error::StorageError;
use crate::types::{Csn, Xid};

use super::{KeyValuePair, MapIter, OrderedMap, RawTuple, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Version {
    created: Csn,
    deleted: Option<Csn>,
    value: Vec<u8>,
}

impl Version {
    fn is_visible(&self, snapshot: Snapshot) -> bool {
        match snapshot {
            Snapshot::AsOf(csn) => self.created <= csn && self.deleted.is_none_or(|d| d > csn),
            Snapshot::NonDeleted => self.deleted.is_none(),
        }
    }
}

fn visible(versions: &[Version], snapshot: Snapshot) -> Option<&Version> {
    match snapshot {
        Snapshot::NonDeleted => versions.last().filter(|v| v.is_visible(snapshot)),
        Snapshot::AsOf(_) => versions.iter().rev().find(|v| v.is_visible(snapshot)),
    }
}

/// A logged change. Deletions carry the full removed tuple so replay can
/// undo them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    Insert {
        key: Vec<u8>,
        value: Vec<u8>,
        xid: Xid,
        csn: Csn,
    },
    Update {
        key: Vec<u8>,
        value: Vec<u8>,
        xid: Xid,
        csn: Csn,
    },
    Delete {
        key: Vec<u8>,
        value: Vec<u8>,
        xid: Xid,
        csn: Csn,
    },
}

/// Records emitted as one unit: a modify window, or a single write made
/// outside any window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalBatch {
    pub records: Vec<WalRecord>,
}

/// In-memory [`OrderedMap`] backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct InMemoryOrderedMap {
    records: BTreeMap<Vec<u8>, Vec<Version>>,
    wal: Vec<WalBatch>,
    window: Option<WalBatch>,
    window_depth: usize,
}

impl InMemoryOrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// WAL batches emitted so far.
    pub fn wal(&self) -> &[WalBatch] {
        &self.wal
    }

    /// Number of physical keys, live or dead.
    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    /// Drop versions deleted at or before `oldest_active`. With no active
    /// snapshot every deleted version is reclaimable. Returns the number of
    /// versions removed.
    pub fn vacuum(&mut self, oldest_active: Option<Csn>) -> usize {
        let mut removed = 0;
        self.records.retain(|_, versions| {
            let before = versions.len();
            versions.retain(|v| match (v.deleted, oldest_active) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(d), Some(horizon)) => d > horizon,
            });
            removed += before - versions.len();
            !versions.is_empty()
        });
        debug!(removed, ?oldest_active, "vacuumed ordered map");
        removed
    }

    fn live_mut(&mut self, key: &[u8]) -> Option<&mut Version> {
        self.records
            .get_mut(key)
            .and_then(|versions| versions.last_mut())
            .filter(|v| v.deleted.is_none())
    }

    fn log(&mut self, record: WalRecord, wal: bool) {
        if !wal {
            return;
        }
        match self.window.as_mut() {
            Some(batch) => batch.records.push(record),
            None => self.wal.push(WalBatch {
                records: vec![record],
            }),
        }
    }
}

impl OrderedMap for InMemoryOrderedMap {
    fn insert(
        &mut self,
        key: &[u8],
        value: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool, StorageError> {
        if self.live_mut(key).is_some() {
            return Ok(false);
        }
        self.records.entry(key.to_vec()).or_default().push(Version {
            created: csn,
            deleted: None,
            value: value.to_vec(),
        });
        self.log(
            WalRecord::Insert {
                key: key.to_vec(),
                value: value.to_vec(),
                xid,
                csn,
            },
            wal,
        );
        Ok(true)
    }

    fn update(
        &mut self,
        key: &[u8],
        value: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool, StorageError> {
        let Some(current) = self.live_mut(key) else {
            return Ok(false);
        };
        current.deleted = Some(csn);
        if let Some(versions) = self.records.get_mut(key) {
            versions.push(Version {
                created: csn,
                deleted: None,
                value: value.to_vec(),
            });
        }
        self.log(
            WalRecord::Update {
                key: key.to_vec(),
                value: value.to_vec(),
                xid,
                csn,
            },
            wal,
        );
        Ok(true)
    }

    fn delete(
        &mut self,
        key: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool, StorageError> {
        let Some(current) = self.live_mut(key) else {
            return Ok(false);
        };
        current.deleted = Some(csn);
        let value = current.value.clone();
        self.log(
            WalRecord::Delete {
                key: key.to_vec(),
                value,
                xid,
                csn,
            },
            wal,
        );
        Ok(true)
    }

    fn get(&self, key: &[u8], snapshot: Snapshot) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .records
            .get(key)
            .and_then(|versions| visible(versions, snapshot))
            .map(|v| v.value.clone()))
    }

    fn iter_from(&self, start: &[u8], snapshot: Snapshot) -> Result<MapIter<'_>, StorageError> {
        let iter = self
            .records
            .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .filter_map(move |(key, versions)| {
                visible(versions, snapshot).map(|v| -> KeyValuePair { (key.clone(), v.value.clone()) })
            });
        Ok(Box::new(iter))
    }

    fn iter_raw(&self) -> Result<Box<dyn Iterator<Item = RawTuple> + '_>, StorageError> {
        let iter = self.records.iter().filter_map(|(key, versions)| {
            versions.last().map(|v| RawTuple {
                key: key.clone(),
                value: v.deleted.is_none().then(|| v.value.clone()),
            })
        });
        Ok(Box::new(iter))
    }

    fn modify_start(&mut self) {
        if self.window_depth == 0 {
            self.window = Some(WalBatch::default());
        }
        self.window_depth += 1;
    }

    fn modify_end(&mut self, wal: bool) -> Result<(), StorageError> {
        if self.window_depth == 0 {
            return Err(StorageError::NoModifyWindow);
        }
        self.window_depth -= 1;
        if self.window_depth > 0 {
            return Ok(());
        }
        if let Some(batch) = self.window.take() {
            if wal && !batch.records.is_empty() {
                self.wal.push(batch);
            }
        }
        Ok(())
    }
}

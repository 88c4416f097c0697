//! Ordered map abstraction the catalog is stored in.
//!
//! The catalog never touches pages directly. It talks to an [`OrderedMap`]:
//! a key-ordered, snapshot-aware store with atomic single-key writes. An
//! MVCC in-memory implementation is provided in [`memory`].

pub mod memory;
pub mod snapshot;

pub use memory::InMemoryOrderedMap;
pub use snapshot::{SnapshotGuard, SnapshotTracker};

use crate::error::StorageError;
use crate::types::{Csn, Xid};

/// Read view used for lookups and scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    /// Everything committed at or before the given commit sequence number
    /// and not deleted by then.
    AsOf(Csn),
    /// The latest version of every key, unless that version is deleted.
    NonDeleted,
}

/// Key-value pair returned by scans.
pub type KeyValuePair = (Vec<u8>, Vec<u8>);

/// Forward iterator over visible records.
pub type MapIter<'a> = Box<dyn Iterator<Item = KeyValuePair> + 'a>;

/// A record as physically present in the map, including deleted ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTuple {
    pub key: Vec<u8>,
    /// `None` for a tombstoned record.
    pub value: Option<Vec<u8>>,
}

/// Key-ordered store with MVCC reads.
///
/// Each write is atomic. Writers bracket multi-record changes with
/// [`modify_start`](Self::modify_start) / [`modify_end`](Self::modify_end)
/// so their WAL records are emitted as one unit.
pub trait OrderedMap {
    /// Insert a new record. Returns `false` if a live record exists.
    fn insert(
        &mut self,
        key: &[u8],
        value: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool, StorageError>;

    /// Replace a live record. Returns `false` if none exists.
    fn update(
        &mut self,
        key: &[u8],
        value: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool, StorageError>;

    /// Delete a live record. Returns `false` if none exists.
    fn delete(&mut self, key: &[u8], xid: Xid, csn: Csn, wal: bool)
    -> Result<bool, StorageError>;

    fn get(&self, key: &[u8], snapshot: Snapshot) -> Result<Option<Vec<u8>>, StorageError>;

    /// Records visible under `snapshot` with keys `>= start`, ascending.
    fn iter_from(&self, start: &[u8], snapshot: Snapshot) -> Result<MapIter<'_>, StorageError>;

    /// Every physical record, live or dead, in key order.
    fn iter_raw(&self) -> Result<Box<dyn Iterator<Item = RawTuple> + '_>, StorageError>;

    fn modify_start(&mut self);

    fn modify_end(&mut self, wal: bool) -> Result<(), StorageError>;
}

//! Index descriptor catalog over an ordered map.

pub mod ops;

use std::collections::HashMap;

use tracing::info;

use crate::chunk::ChunkCodec;
use crate::config::CatalogConfig;
use crate::descr::{IndexDescriptor, RealizeContext, realize};
use crate::error::Result;
use crate::layout::IndexLayout;
use crate::schema::Table;
use crate::tree::{InMemoryOrderedMap, OrderedMap, Snapshot, SnapshotTracker};
use crate::types::{Csn, IndexKind, IndexSlot, RelOids, Xid};

/// Host lookup of table definitions by oids.
pub trait TableSource {
    fn get_table(&self, oids: RelOids) -> Option<&Table>;
}

impl TableSource for HashMap<RelOids, Table> {
    fn get_table(&self, oids: RelOids) -> Option<&Table> {
        self.get(&oids)
    }
}

impl TableSource for [Table] {
    fn get_table(&self, oids: RelOids) -> Option<&Table> {
        self.iter().find(|t| t.oids == oids)
    }
}

/// Index descriptors of every table, persisted in `M`.
#[derive(Debug)]
pub struct IndexCatalog<M> {
    map: M,
    codec: ChunkCodec,
}

impl<M: OrderedMap> IndexCatalog<M> {
    pub fn new(map: M, config: &CatalogConfig) -> Result<Self> {
        Ok(Self {
            map,
            codec: ChunkCodec::new(config)?,
        })
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn into_map(self) -> M {
        self.map
    }

    pub fn codec(&self) -> &ChunkCodec {
        &self.codec
    }

    pub fn add(&mut self, table: &Table, slot: IndexSlot, xid: Xid, csn: Csn) -> Result<bool> {
        ops::add_index(&mut self.map, &self.codec, table, slot, xid, csn)
    }

    pub fn update(&mut self, table: &Table, slot: IndexSlot, xid: Xid, csn: Csn) -> Result<bool> {
        ops::update_index(&mut self.map, &self.codec, table, slot, xid, csn)
    }

    pub fn delete(&mut self, table: &Table, slot: IndexSlot, xid: Xid, csn: Csn) -> Result<bool> {
        ops::delete_index(&mut self.map, &self.codec, table, slot, xid, csn)
    }

    pub fn get(&self, oids: RelOids, kind: IndexKind, snapshot: Snapshot) -> Result<Option<IndexLayout>> {
        ops::get_layout(&self.map, &self.codec, oids, kind, snapshot)
    }

    pub fn find_table_oids(
        &self,
        oids: RelOids,
        kind: IndexKind,
        snapshot: Snapshot,
    ) -> Result<Option<RelOids>> {
        ops::find_table_oids(&self.map, &self.codec, oids, kind, snapshot)
    }

    /// See [`ops::foreach_oids`]. Returns the number of descriptors visited.
    pub fn foreach_oids(&self, callback: impl FnMut(IndexKind, RelOids, RelOids)) -> Result<usize> {
        ops::foreach_oids(&self.map, &self.codec, callback)
    }

    /// Load the layout under `(oids, kind)` and realize it.
    pub fn realize(
        &self,
        oids: RelOids,
        kind: IndexKind,
        snapshot: Snapshot,
        ctx: &RealizeContext<'_>,
    ) -> Result<Option<IndexDescriptor>> {
        match self.get(oids, kind, snapshot)? {
            Some(layout) => realize(&layout, None, ctx).map(Some),
            None => Ok(None),
        }
    }

    /// Add the primary, large-value and every secondary descriptor of
    /// `table`. Returns how many were newly added.
    pub fn add_table(&mut self, table: &Table, xid: Xid, csn: Csn) -> Result<usize> {
        let mut added = 0;
        for slot in table_slots(table) {
            if self.add(table, slot, xid, csn)? {
                added += 1;
            }
        }
        info!(table = %table.oids, added, "registered table indexes");
        Ok(added)
    }

    /// Delete every descriptor of `table`. Returns how many existed.
    pub fn delete_table(&mut self, table: &Table, xid: Xid, csn: Csn) -> Result<usize> {
        let mut deleted = 0;
        for slot in table_slots(table) {
            if self.delete(table, slot, xid, csn)? {
                deleted += 1;
            }
        }
        info!(table = %table.oids, deleted, "dropped table indexes");
        Ok(deleted)
    }
}

impl IndexCatalog<InMemoryOrderedMap> {
    /// Reclaim descriptor chunks deleted before every reader registered in
    /// `snapshots`. Returns the number of versions removed.
    pub fn vacuum(&mut self, snapshots: &SnapshotTracker) -> usize {
        let horizon = snapshots.oldest_active();
        let removed = self.map.vacuum(horizon);
        info!(removed, ?horizon, "vacuumed index catalog");
        removed
    }
}

/// Primary, large-value, then secondaries in declaration order.
fn table_slots(table: &Table) -> impl Iterator<Item = IndexSlot> {
    let secondaries = (1..table.nslots()).map_while(|i| u16::try_from(i).ok().map(IndexSlot));
    [IndexSlot::PRIMARY, IndexSlot::LARGE_VALUE]
        .into_iter()
        .chain(secondaries)
}

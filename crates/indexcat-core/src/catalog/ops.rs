//! Catalog operations: add, update, delete, get and enumerate index layouts.
//!
//! Layouts are stored in an [`OrderedMap`] as chunk runs keyed by
//! `(oids, kind, chunknum)`. Every operation here is a thin composition of
//! the layout builder, the serializer and the chunk codec.

use tracing::{debug, trace, warn};

use crate::chunk::ChunkCodec;
use crate::encoding::key::ChunkKey;
use crate::error::{CatalogError, EncodingError, Error, Result};
use crate::layout::{IndexLayout, decode_layout, encode_layout, layout_identity, make_layout, peek_table_oids};
use crate::schema::Table;
use crate::tree::{OrderedMap, Snapshot};
use crate::types::{Csn, IndexKind, IndexSlot, RelOids, Xid};

fn corrupt(oids: RelOids, kind: IndexKind, source: EncodingError) -> Error {
    warn!(%oids, %kind, error = %source, "corrupted index descriptor");
    CatalogError::Corrupt { oids, kind, source }.into()
}

fn corrupt_on_decode(oids: RelOids, kind: IndexKind) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::Encoding(source) => corrupt(oids, kind, source),
        other => other,
    }
}

/// Build the layout of `slot` and store it. Returns `false` if a descriptor
/// with the same identity already exists.
pub fn add_index(
    map: &mut impl OrderedMap,
    codec: &ChunkCodec,
    table: &Table,
    slot: IndexSlot,
    xid: Xid,
    csn: Csn,
) -> Result<bool> {
    let mut layout = make_layout(table, slot)?;
    layout.create_xid = xid;
    let blob = encode_layout(&layout)?;
    let key = ChunkKey::first(layout.oids, layout.kind);
    let wal = layout.persistence.wal_logged();

    let added = codec.insert(map, key, &blob, xid, csn, wal)?;
    debug!(
        index = %layout.oids,
        kind = %layout.kind,
        table = %table.oids,
        len = blob.len(),
        added,
        "add index descriptor"
    );
    Ok(added)
}

/// Rebuild the layout of `slot` and replace the stored one, keeping the
/// stored `create_xid`. Returns `false` if no descriptor exists.
pub fn update_index(
    map: &mut impl OrderedMap,
    codec: &ChunkCodec,
    table: &Table,
    slot: IndexSlot,
    xid: Xid,
    csn: Csn,
) -> Result<bool> {
    let mut layout = make_layout(table, slot)?;
    match get_layout(map, codec, layout.oids, layout.kind, Snapshot::NonDeleted)? {
        Some(existing) => layout.create_xid = existing.create_xid,
        None => return Ok(false),
    }
    let blob = encode_layout(&layout)?;
    let key = ChunkKey::first(layout.oids, layout.kind);
    let wal = layout.persistence.wal_logged();

    let updated = codec.update(map, key, &blob, xid, csn, wal)?;
    debug!(
        index = %layout.oids,
        kind = %layout.kind,
        len = blob.len(),
        updated,
        "update index descriptor"
    );
    Ok(updated)
}

/// Delete the stored layout of `slot`. Returns `false` if none exists.
pub fn delete_index(
    map: &mut impl OrderedMap,
    codec: &ChunkCodec,
    table: &Table,
    slot: IndexSlot,
    xid: Xid,
    csn: Csn,
) -> Result<bool> {
    let (oids, kind) = layout_identity(table, slot)?;
    let wal = table.persistence.wal_logged();
    let deleted = codec.delete(map, ChunkKey::first(oids, kind), xid, csn, wal)?;
    debug!(index = %oids, %kind, deleted, "delete index descriptor");
    Ok(deleted)
}

/// Fetch and decode the layout stored under `(oids, kind)`.
pub fn get_layout(
    map: &impl OrderedMap,
    codec: &ChunkCodec,
    oids: RelOids,
    kind: IndexKind,
    snapshot: Snapshot,
) -> Result<Option<IndexLayout>> {
    let key = ChunkKey::first(oids, kind);
    let Some(blob) = codec
        .get(map, key, snapshot)
        .map_err(corrupt_on_decode(oids, kind))?
    else {
        return Ok(None);
    };
    decode_layout(&key, &blob)
        .map(Some)
        .map_err(|source| corrupt(oids, kind, source))
}

/// Table a descriptor belongs to, read from the head of its first chunk.
pub fn find_table_oids(
    map: &impl OrderedMap,
    codec: &ChunkCodec,
    oids: RelOids,
    kind: IndexKind,
    snapshot: Snapshot,
) -> Result<Option<RelOids>> {
    let key = ChunkKey::first(oids, kind);
    let first = codec
        .iterate(map, key, snapshot)?
        .next()
        .transpose()
        .map_err(|source| corrupt(oids, kind, source))?;
    match first {
        Some(chunk) if chunk.key == key => peek_table_oids(&chunk.data)
            .map(Some)
            .map_err(|source| corrupt(oids, kind, source)),
        _ => Ok(None),
    }
}

/// Visit every stored descriptor once, in key order, as
/// `callback(kind, oids, table_oids)`.
///
/// After each descriptor the scan reopens past its last possible chunk, so
/// multi-chunk descriptors cost one seek rather than a walk over their
/// chunks.
pub fn foreach_oids(
    map: &impl OrderedMap,
    codec: &ChunkCodec,
    mut callback: impl FnMut(IndexKind, RelOids, RelOids),
) -> Result<usize> {
    let mut from = ChunkKey::first(RelOids::default(), IndexKind::ALL[0]);
    let mut visited = 0;
    loop {
        let chunk = match codec.iterate(map, from, Snapshot::NonDeleted)?.next() {
            Some(chunk) => chunk?,
            None => break,
        };
        let ChunkKey {
            oids,
            kind,
            chunknum,
        } = chunk.key;
        if chunknum != 0 {
            warn!(%oids, %kind, chunknum, "descriptor does not start at chunk 0");
            return Err(CatalogError::OrphanChunk {
                oids,
                kind,
                chunknum,
            }
            .into());
        }
        let table_oids = peek_table_oids(&chunk.data).map_err(|source| corrupt(oids, kind, source))?;
        callback(kind, oids, table_oids);
        visited += 1;

        match chunk.key.next_descriptor() {
            Some(next) => {
                trace!(%oids, %kind, "skipping to next descriptor");
                from = next;
            }
            None => break,
        }
    }
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{INT4_BTREE_OPS, INT4_OID, TEXT_BTREE_OPS, TEXT_OID};
    use crate::config::CatalogConfig;
    use crate::schema::{TableField, TableIndex, TableIndexField};
    use crate::tree::InMemoryOrderedMap;
    use crate::types::{AttNum, Persistence};

    fn codec() -> ChunkCodec {
        ChunkCodec::new(&CatalogConfig::default()).unwrap()
    }

    fn small_codec() -> ChunkCodec {
        ChunkCodec::new(&CatalogConfig {
            max_tuple_size: 128,
            max_align: 8,
        })
        .unwrap()
    }

    fn table(reloid: u32) -> Table {
        Table::new(
            RelOids::new(1, reloid, reloid),
            RelOids::new(1, reloid + 1, reloid + 1),
            vec![
                TableField::new("id", INT4_OID).not_null(),
                TableField::new("val", TEXT_OID),
            ],
        )
        .with_index(TableIndex::new(
            RelOids::new(1, reloid + 2, reloid + 2),
            IndexKind::Primary,
            "pk",
            vec![TableIndexField::new(AttNum::User(0), INT4_BTREE_OPS)],
        ))
        .with_index(TableIndex::new(
            RelOids::new(1, reloid + 3, reloid + 3),
            IndexKind::Regular,
            "val_idx",
            vec![TableIndexField::new(AttNum::User(1), TEXT_BTREE_OPS)],
        ))
    }

    #[test]
    fn test_add_and_get() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let t = table(100);
        assert!(add_index(&mut map, &codec, &t, IndexSlot(1), 7, 1).unwrap());

        let layout = get_layout(&map, &codec, t.indices[1].oids, IndexKind::Regular, Snapshot::NonDeleted)
            .unwrap()
            .unwrap();
        assert_eq!(layout.name, "val_idx");
        assert_eq!(layout.create_xid, 7);
        assert_eq!(layout, {
            let mut expected = make_layout(&t, IndexSlot(1)).unwrap();
            expected.create_xid = 7;
            expected
        });
    }

    #[test]
    fn test_add_twice_returns_false() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let t = table(100);
        assert!(add_index(&mut map, &codec, &t, IndexSlot::PRIMARY, 1, 1).unwrap());
        assert!(!add_index(&mut map, &codec, &t, IndexSlot::PRIMARY, 2, 2).unwrap());
    }

    #[test]
    fn test_get_missing_and_snapshot() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let t = table(100);
        let oids = t.indices[0].oids;
        assert!(get_layout(&map, &codec, oids, IndexKind::Primary, Snapshot::NonDeleted)
            .unwrap()
            .is_none());

        add_index(&mut map, &codec, &t, IndexSlot::PRIMARY, 1, 10).unwrap();
        assert!(get_layout(&map, &codec, oids, IndexKind::Primary, Snapshot::AsOf(9))
            .unwrap()
            .is_none());
        assert!(get_layout(&map, &codec, oids, IndexKind::Primary, Snapshot::AsOf(10))
            .unwrap()
            .is_some());
        // Same oids under another kind is a different descriptor.
        assert!(get_layout(&map, &codec, oids, IndexKind::Unique, Snapshot::NonDeleted)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_keeps_create_xid() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let mut t = table(100);
        add_index(&mut map, &codec, &t, IndexSlot(1), 5, 1).unwrap();

        t.indices[1].name = "renamed".to_string();
        assert!(update_index(&mut map, &codec, &t, IndexSlot(1), 6, 2).unwrap());
        let layout = get_layout(&map, &codec, t.indices[1].oids, IndexKind::Regular, Snapshot::NonDeleted)
            .unwrap()
            .unwrap();
        assert_eq!(layout.name, "renamed");
        assert_eq!(layout.create_xid, 5);

        let old = get_layout(&map, &codec, t.indices[1].oids, IndexKind::Regular, Snapshot::AsOf(1))
            .unwrap()
            .unwrap();
        assert_eq!(old.name, "val_idx");
    }

    #[test]
    fn test_update_missing_returns_false() {
        let mut map = InMemoryOrderedMap::new();
        let t = table(100);
        assert!(!update_index(&mut map, &codec(), &t, IndexSlot(1), 1, 1).unwrap());
    }

    #[test]
    fn test_delete() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let t = table(100);
        add_index(&mut map, &codec, &t, IndexSlot::LARGE_VALUE, 1, 1).unwrap();
        assert!(delete_index(&mut map, &codec, &t, IndexSlot::LARGE_VALUE, 2, 2).unwrap());
        assert!(!delete_index(&mut map, &codec, &t, IndexSlot::LARGE_VALUE, 3, 3).unwrap());
        assert!(
            get_layout(&map, &codec, t.large_value_oids, IndexKind::LargeValue, Snapshot::NonDeleted)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_temporary_tables_skip_wal() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let mut t = table(100);
        t.persistence = Persistence::Temporary;
        add_index(&mut map, &codec, &t, IndexSlot::PRIMARY, 1, 1).unwrap();
        assert!(map.wal().is_empty());

        t.persistence = Persistence::Permanent;
        add_index(&mut map, &codec, &t, IndexSlot(1), 1, 1).unwrap();
        assert_eq!(map.wal().len(), 1);
    }

    #[test]
    fn test_find_table_oids() {
        let mut map = InMemoryOrderedMap::new();
        let codec = small_codec();
        let t = table(100);
        add_index(&mut map, &codec, &t, IndexSlot(1), 1, 1).unwrap();
        assert_eq!(
            find_table_oids(&map, &codec, t.indices[1].oids, IndexKind::Regular, Snapshot::NonDeleted)
                .unwrap(),
            Some(t.oids)
        );
        assert_eq!(
            find_table_oids(&map, &codec, t.indices[1].oids, IndexKind::Unique, Snapshot::NonDeleted)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_foreach_visits_each_descriptor_once() {
        let mut map = InMemoryOrderedMap::new();
        let codec = small_codec();
        let tables = [table(100), table(200)];
        for t in &tables {
            for slot in [IndexSlot::PRIMARY, IndexSlot(1), IndexSlot::LARGE_VALUE] {
                add_index(&mut map, &codec, t, slot, 1, 1).unwrap();
            }
        }
        assert!(map.key_count() > 6, "layouts should span several chunks");

        let mut seen = Vec::new();
        let visited = foreach_oids(&map, &codec, |kind, oids, table_oids| {
            seen.push((oids, kind, table_oids));
        })
        .unwrap();
        assert_eq!(visited, 6);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        for t in &tables {
            assert!(seen.contains(&(t.indices[0].oids, IndexKind::Primary, t.oids)));
            assert!(seen.contains(&(t.indices[1].oids, IndexKind::Regular, t.oids)));
            assert!(seen.contains(&(t.large_value_oids, IndexKind::LargeValue, t.oids)));
        }
    }

    #[test]
    fn test_foreach_skips_deleted() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let t = table(100);
        add_index(&mut map, &codec, &t, IndexSlot::PRIMARY, 1, 1).unwrap();
        add_index(&mut map, &codec, &t, IndexSlot(1), 1, 1).unwrap();
        delete_index(&mut map, &codec, &t, IndexSlot::PRIMARY, 2, 2).unwrap();
        let mut kinds = Vec::new();
        foreach_oids(&map, &codec, |kind, _, _| kinds.push(kind)).unwrap();
        assert_eq!(kinds, [IndexKind::Regular]);
    }

    #[test]
    fn test_foreach_detects_orphan_chunk() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let key = ChunkKey::first(RelOids::new(1, 5, 5), IndexKind::Unique).with_chunk(1);
        let mut value = 3u32.to_le_bytes().to_vec();
        value.extend_from_slice(b"abc");
        map.insert(&key.encode(), &value, 1, 1, false).unwrap();

        let err = foreach_oids(&map, &codec, |_, _, _| {}).unwrap_err();
        assert!(matches!(
            err,
            Error::Catalog(CatalogError::OrphanChunk { chunknum: 1, .. })
        ));
    }

    #[test]
    fn test_corrupt_layout_is_reported() {
        let mut map = InMemoryOrderedMap::new();
        let codec = codec();
        let oids = RelOids::new(1, 5, 5);
        let key = ChunkKey::first(oids, IndexKind::Regular);
        codec.insert(&mut map, key, &[1, 2, 3], 1, 1, false).unwrap();

        let err = get_layout(&map, &codec, oids, IndexKind::Regular, Snapshot::NonDeleted).unwrap_err();
        assert!(matches!(
            err,
            Error::Catalog(CatalogError::Corrupt {
                kind: IndexKind::Regular,
                ..
            })
        ));
        let err = foreach_oids(&map, &codec, |_, _, _| {}).unwrap_err();
        assert!(matches!(err, Error::Catalog(CatalogError::Corrupt { .. })));
    }
}

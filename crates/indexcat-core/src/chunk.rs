//! Splitting of serialized layouts into ordered-map chunks.
//!
//! ## Chunk value layout
//!
//! ```text
//! [0..4]   data_length: u32 LE
//! [4..]    data_length payload bytes
//! ```
//!
//! A blob of `n` bytes occupies chunks `0..ceil(n / max_chunk_size)` under
//! the same `(oids, kind)`. An empty blob still writes chunk 0 so that the
//! descriptor exists.

use tracing::{debug, trace};

use crate::config::CatalogConfig;
use crate::encoding::key::ChunkKey;
use crate::error::{EncodingError, Result, StorageError};
use crate::tree::{OrderedMap, Snapshot};
use crate::types::{Csn, Xid};

/// Length prefix of a chunk value.
pub const CHUNK_LENGTH_SIZE: usize = 4;

/// One decoded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub key: ChunkKey,
    pub data: Vec<u8>,
}

fn encode_value(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHUNK_LENGTH_SIZE + data.len());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

fn decode_value(value: &[u8]) -> std::result::Result<&[u8], EncodingError> {
    let Some((len, payload)) = value.split_first_chunk::<CHUNK_LENGTH_SIZE>() else {
        return Err(EncodingError::Truncated {
            what: "chunk length",
            needed: CHUNK_LENGTH_SIZE,
            remaining: value.len(),
        });
    };
    let len = u32::from_le_bytes(*len) as usize;
    if payload.len() != len {
        return Err(EncodingError::Inconsistent(format!(
            "chunk declares {len} bytes but carries {}",
            payload.len()
        )));
    }
    Ok(payload)
}

/// Run `f` inside one modify window, closing it even if `f` fails.
fn in_window<M, T>(map: &mut M, wal: bool, f: impl FnOnce(&mut M) -> Result<T>) -> Result<T>
where
    M: OrderedMap + ?Sized,
{
    map.modify_start();
    let result = f(map);
    map.modify_end(wal)?;
    result
}

/// Stores blobs larger than one tuple as runs of consecutive chunks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkCodec {
    max_chunk_size: usize,
}

impl ChunkCodec {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_chunk_size: config.max_chunk_size(),
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Number of chunks a blob of `len` bytes occupies.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_chunk_size).max(1)
    }

    /// Store `blob` under `key`. Returns `false` without writing if the
    /// descriptor already exists.
    pub fn insert<M: OrderedMap + ?Sized>(
        &self,
        map: &mut M,
        key: ChunkKey,
        blob: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool> {
        let first = key.with_chunk(0);
        if map.get(&first.encode(), Snapshot::NonDeleted)?.is_some() {
            return Ok(false);
        }
        in_window(map, wal, |map| {
            self.write_chunks(map, first, blob, xid, csn, wal)?;
            Ok(true)
        })
    }

    /// Replace the blob under `key`. Returns `false` if it does not exist.
    pub fn update<M: OrderedMap + ?Sized>(
        &self,
        map: &mut M,
        key: ChunkKey,
        blob: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool> {
        let first = key.with_chunk(0);
        let existing = live_chunks(map, first)?;
        if existing.is_empty() {
            return Ok(false);
        }
        in_window(map, wal, |map| {
            remove_chunks(map, &existing, xid, csn, wal)?;
            self.write_chunks(map, first, blob, xid, csn, wal)?;
            Ok(true)
        })
    }

    /// Delete every chunk under `key`. Returns `false` if none exists.
    pub fn delete<M: OrderedMap + ?Sized>(
        &self,
        map: &mut M,
        key: ChunkKey,
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<bool> {
        let existing = live_chunks(map, key.with_chunk(0))?;
        if existing.is_empty() {
            return Ok(false);
        }
        in_window(map, wal, |map| {
            remove_chunks(map, &existing, xid, csn, wal)?;
            Ok(true)
        })
    }

    /// Reassemble the blob under `key` as seen by `snapshot`. Chunks are
    /// gathered in ascending order until a gap or another descriptor.
    pub fn get<M: OrderedMap + ?Sized>(
        &self,
        map: &M,
        key: ChunkKey,
        snapshot: Snapshot,
    ) -> Result<Option<Vec<u8>>> {
        let first = key.with_chunk(0);
        let mut blob = Vec::new();
        let mut expected = 0u32;
        for chunk in self.iterate(map, first, snapshot)? {
            let chunk = chunk?;
            if !chunk.key.same_descriptor(&first) || chunk.key.chunknum != expected {
                break;
            }
            blob.extend_from_slice(&chunk.data);
            expected += 1;
        }
        if expected == 0 {
            return Ok(None);
        }
        trace!(oids = %key.oids, kind = %key.kind, chunks = expected, "assembled blob");
        Ok(Some(blob))
    }

    /// Decoded chunks visible under `snapshot`, starting at `from`.
    pub fn iterate<'a, M: OrderedMap + ?Sized>(
        &self,
        map: &'a M,
        from: ChunkKey,
        snapshot: Snapshot,
    ) -> Result<impl Iterator<Item = std::result::Result<Chunk, EncodingError>> + 'a> {
        let iter = map.iter_from(&from.encode(), snapshot)?;
        Ok(iter.map(|(key, value)| {
            Ok(Chunk {
                key: ChunkKey::decode(&key)?,
                data: decode_value(&value)?.to_vec(),
            })
        }))
    }

    fn write_chunks<M: OrderedMap + ?Sized>(
        &self,
        map: &mut M,
        first: ChunkKey,
        blob: &[u8],
        xid: Xid,
        csn: Csn,
        wal: bool,
    ) -> Result<()> {
        let pieces: Vec<&[u8]> = if blob.is_empty() {
            vec![blob]
        } else {
            blob.chunks(self.max_chunk_size).collect()
        };
        if pieces.len() > 1 {
            debug!(
                oids = %first.oids,
                kind = %first.kind,
                len = blob.len(),
                chunks = pieces.len(),
                "splitting blob into chunks"
            );
        }
        for (chunknum, piece) in pieces.into_iter().enumerate() {
            let key = first.with_chunk(chunknum as u32);
            if !map.insert(&key.encode(), &encode_value(piece), xid, csn, wal)? {
                return Err(StorageError::CorruptedRecord(format!(
                    "chunk {chunknum} of {} ({}) already present",
                    first.oids, first.kind
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Keys of the consecutive live chunks starting at `first`.
fn live_chunks<M: OrderedMap + ?Sized>(map: &M, first: ChunkKey) -> Result<Vec<ChunkKey>> {
    let mut keys = Vec::new();
    for (raw, _) in map.iter_from(&first.encode(), Snapshot::NonDeleted)? {
        let key = ChunkKey::decode(&raw)?;
        if !key.same_descriptor(&first) || key.chunknum as usize != keys.len() {
            break;
        }
        keys.push(key);
    }
    Ok(keys)
}

fn remove_chunks<M: OrderedMap + ?Sized>(
    map: &mut M,
    keys: &[ChunkKey],
    xid: Xid,
    csn: Csn,
    wal: bool,
) -> Result<()> {
    for key in keys {
        if !map.delete(&key.encode(), xid, csn, wal)? {
            return Err(StorageError::CorruptedRecord(format!(
                "chunk {} of {} ({}) vanished during delete",
                key.chunknum, key.oids, key.kind
            ))
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::InMemoryOrderedMap;
    use crate::tree::memory::WalRecord;
    use crate::types::{IndexKind, RelOids};

    fn small_codec() -> ChunkCodec {
        ChunkCodec::new(&CatalogConfig {
            max_tuple_size: 128,
            max_align: 8,
        })
        .unwrap()
    }

    fn key(relnode: u32) -> ChunkKey {
        ChunkKey::first(RelOids::new(1, 100, relnode), IndexKind::Regular)
    }

    fn blob(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_small_blob_single_chunk() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        assert!(codec.insert(&mut map, key(1), b"abc", 1, 10, true).unwrap());
        assert_eq!(map.key_count(), 1);
        assert_eq!(
            codec.get(&map, key(1), Snapshot::AsOf(10)).unwrap(),
            Some(b"abc".to_vec())
        );
    }

    #[test]
    fn test_large_blob_spans_chunks() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        let data = blob(codec.max_chunk_size() * 2 + 7);
        assert!(codec.insert(&mut map, key(1), &data, 1, 10, true).unwrap());
        assert_eq!(map.key_count(), 3);
        assert_eq!(
            codec.get(&map, key(1), Snapshot::NonDeleted).unwrap(),
            Some(data)
        );
        // One WAL batch for the whole insert.
        assert_eq!(map.wal().len(), 1);
        assert_eq!(map.wal()[0].records.len(), 3);
    }

    #[test]
    fn test_exact_multiple_does_not_add_empty_chunk() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        let data = blob(codec.max_chunk_size() * 2);
        codec.insert(&mut map, key(1), &data, 1, 10, false).unwrap();
        assert_eq!(map.key_count(), 2);
        assert_eq!(codec.chunk_count(data.len()), 2);
    }

    #[test]
    fn test_empty_blob_writes_chunk_zero() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        assert!(codec.insert(&mut map, key(1), b"", 1, 10, false).unwrap());
        assert_eq!(
            codec.get(&map, key(1), Snapshot::NonDeleted).unwrap(),
            Some(Vec::new())
        );
    }

    #[test]
    fn test_insert_existing_returns_false() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        codec.insert(&mut map, key(1), b"one", 1, 10, false).unwrap();
        assert!(!codec.insert(&mut map, key(1), b"two", 2, 20, false).unwrap());
        assert_eq!(
            codec.get(&map, key(1), Snapshot::NonDeleted).unwrap(),
            Some(b"one".to_vec())
        );
    }

    #[test]
    fn test_update_shrinks_chunk_run() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        let big = blob(codec.max_chunk_size() * 3);
        codec.insert(&mut map, key(1), &big, 1, 10, true).unwrap();
        assert!(codec.update(&mut map, key(1), b"tiny", 2, 20, true).unwrap());

        assert_eq!(
            codec.get(&map, key(1), Snapshot::NonDeleted).unwrap(),
            Some(b"tiny".to_vec())
        );
        // Old snapshot still sees the old blob.
        assert_eq!(
            codec.get(&map, key(1), Snapshot::AsOf(15)).unwrap(),
            Some(big)
        );
        let batch = &map.wal()[1];
        assert_eq!(batch.records.len(), 4);
        assert!(matches!(batch.records[0], WalRecord::Delete { .. }));
        assert!(matches!(batch.records[3], WalRecord::Insert { .. }));
    }

    #[test]
    fn test_update_missing_returns_false() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        assert!(!codec.update(&mut map, key(1), b"x", 1, 10, true).unwrap());
        assert!(map.wal().is_empty());
    }

    #[test]
    fn test_delete_removes_every_chunk() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        let data = blob(codec.max_chunk_size() + 1);
        codec.insert(&mut map, key(1), &data, 1, 10, true).unwrap();
        codec.insert(&mut map, key(2), b"neighbour", 1, 10, true).unwrap();

        assert!(codec.delete(&mut map, key(1), 2, 20, true).unwrap());
        assert!(!codec.delete(&mut map, key(1), 3, 30, true).unwrap());
        assert_eq!(codec.get(&map, key(1), Snapshot::NonDeleted).unwrap(), None);
        assert_eq!(
            codec.get(&map, key(2), Snapshot::NonDeleted).unwrap(),
            Some(b"neighbour".to_vec())
        );

        let deletes = &map.wal().last().unwrap().records;
        assert_eq!(deletes.len(), 2);
        assert!(deletes.iter().all(|r| matches!(
            r,
            WalRecord::Delete { value, .. } if value.len() >= CHUNK_LENGTH_SIZE
        )));
    }

    #[test]
    fn test_get_stops_at_next_descriptor() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        codec.insert(&mut map, key(1), b"first", 1, 10, false).unwrap();
        codec.insert(&mut map, key(2), b"second", 1, 10, false).unwrap();
        assert_eq!(
            codec.get(&map, key(1), Snapshot::NonDeleted).unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[test]
    fn test_get_stops_at_gap() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        map.insert(&key(1).encode(), &encode_value(b"a"), 1, 10, false)
            .unwrap();
        map.insert(
            &key(1).with_chunk(2).encode(),
            &encode_value(b"c"),
            1,
            10,
            false,
        )
        .unwrap();
        assert_eq!(
            codec.get(&map, key(1), Snapshot::NonDeleted).unwrap(),
            Some(b"a".to_vec())
        );
    }

    #[test]
    fn test_iterate_decodes_chunks() {
        let codec = small_codec();
        let mut map = InMemoryOrderedMap::new();
        codec.insert(&mut map, key(1), b"a", 1, 10, false).unwrap();
        codec.insert(&mut map, key(2), b"b", 1, 10, false).unwrap();
        let chunks: Vec<Chunk> = codec
            .iterate(&map, key(2), Snapshot::NonDeleted)
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(
            chunks,
            vec![Chunk {
                key: key(2),
                data: b"b".to_vec()
            }]
        );
    }

    #[test]
    fn test_corrupt_chunk_value() {
        assert!(decode_value(&[1, 0]).is_err());
        assert!(decode_value(&[5, 0, 0, 0, 1]).is_err());
        assert_eq!(decode_value(&[1, 0, 0, 0, 9]).unwrap(), &[9]);
    }
}

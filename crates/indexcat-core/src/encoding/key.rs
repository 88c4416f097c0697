//! Catalog chunk keys.
//!
//! ## Key layout (17 bytes, big-endian)
//!
//! ```text
//! [0..4]    datoid
//! [4..8]    reloid
//! [8..12]   relnode
//! [12..13]  kind tag
//! [13..17]  chunknum
//! ```
//!
//! Big-endian packing makes `memcmp` order equal the logical
//! `(oids, kind, chunknum)` order, so ordered-map seeks land on the first
//! chunk of a descriptor.

use crate::error::EncodingError;
use crate::types::{IndexKind, RelOids};

/// Identity of one chunk of a serialized index layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey {
    pub oids: RelOids,
    pub kind: IndexKind,
    pub chunknum: u32,
}

impl ChunkKey {
    pub const SIZE: usize = 17;

    /// Key of the first chunk of a descriptor.
    pub fn first(oids: RelOids, kind: IndexKind) -> Self {
        Self {
            oids,
            kind,
            chunknum: 0,
        }
    }

    pub fn with_chunk(self, chunknum: u32) -> Self {
        Self { chunknum, ..self }
    }

    /// Whether `other` belongs to the same descriptor.
    pub fn same_descriptor(&self, other: &ChunkKey) -> bool {
        self.oids == other.oids && self.kind == other.kind
    }

    /// First chunk of the smallest descriptor identity strictly greater than
    /// this one's `(oids, kind)`. Seeking there skips every remaining chunk
    /// of this descriptor.
    pub fn next_descriptor(&self) -> Option<ChunkKey> {
        match self.kind.successor() {
            Some(kind) => Some(ChunkKey::first(self.oids, kind)),
            None => self
                .oids
                .successor()
                .map(|oids| ChunkKey::first(oids, IndexKind::ALL[0])),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.oids.datoid.to_be_bytes());
        out[4..8].copy_from_slice(&self.oids.reloid.to_be_bytes());
        out[8..12].copy_from_slice(&self.oids.relnode.to_be_bytes());
        out[12] = self.kind.tag();
        out[13..17].copy_from_slice(&self.chunknum.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, EncodingError> {
        let bytes: &[u8; Self::SIZE] = data
            .try_into()
            .map_err(|_| EncodingError::MalformedKey(data.len()))?;
        let be32 = |at: usize| u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Ok(Self {
            oids: RelOids::new(be32(0), be32(4), be32(8)),
            kind: IndexKind::from_tag(bytes[12])?,
            chunknum: be32(13),
        })
    }
}

//! Catalog configuration.

use serde::{Deserialize, Serialize};

use crate::encoding::key::ChunkKey;
use crate::error::Error;
use crate::types::RelOids;

/// Default maximum size of a single ordered-map tuple.
pub const DEFAULT_MAX_TUPLE_SIZE: usize = 2048;

/// Default maximum alignment of the host platform.
pub const DEFAULT_MAX_ALIGN: usize = 8;

/// Size of the per-chunk header: the packed key plus the data length.
pub const CHUNK_HEADER_SIZE: usize = ChunkKey::SIZE + 4;

/// Tunables shared by every catalog operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Largest tuple the ordered map accepts, in bytes.
    pub max_tuple_size: usize,
    /// Alignment used when sizing chunks.
    pub max_align: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_tuple_size: DEFAULT_MAX_TUPLE_SIZE,
            max_align: DEFAULT_MAX_ALIGN,
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.max_align.is_power_of_two() {
            return Err(Error::Config(format!(
                "max_align must be a power of two, got {}",
                self.max_align
            )));
        }
        // Chunk 0 alone must hold the table oids prefix.
        if self.raw_chunk_size() < CHUNK_HEADER_SIZE + RelOids::SIZE {
            return Err(Error::Config(format!(
                "max_tuple_size {} leaves {} bytes per chunk, need at least {}",
                self.max_tuple_size,
                self.max_chunk_size(),
                RelOids::SIZE
            )));
        }
        Ok(())
    }

    /// Payload bytes that fit in one chunk record:
    /// `align_down((max_tuple * 3 - align(key)) / 3) - header`.
    pub fn max_chunk_size(&self) -> usize {
        self.raw_chunk_size().saturating_sub(CHUNK_HEADER_SIZE)
    }

    fn raw_chunk_size(&self) -> usize {
        let key = self.align_up(ChunkKey::SIZE);
        let raw = (self.max_tuple_size * 3).saturating_sub(key) / 3;
        self.align_down(raw)
    }

    fn align_up(&self, len: usize) -> usize {
        len.div_ceil(self.max_align) * self.max_align
    }

    fn align_down(&self, len: usize) -> usize {
        len / self.max_align * self.max_align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunk_size() {
        let config = CatalogConfig::default();
        config.validate().unwrap();
        // (2048 * 3 - 24) / 3 = 2040, already aligned.
        assert_eq!(config.max_chunk_size(), 2040 - CHUNK_HEADER_SIZE);
    }

    #[test]
    fn test_small_tuple_chunk_size() {
        let config = CatalogConfig {
            max_tuple_size: 128,
            max_align: 8,
        };
        config.validate().unwrap();
        // (384 - 24) / 3 = 120
        assert_eq!(config.max_chunk_size(), 120 - CHUNK_HEADER_SIZE);
    }

    #[test]
    fn test_rejects_tiny_tuples() {
        let config = CatalogConfig {
            max_tuple_size: 16,
            max_align: 8,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_smallest_chunk_holds_table_oids() {
        // (48 * 3 - 24) / 3 = 40, leaving 19 payload bytes.
        let smallest = CatalogConfig {
            max_tuple_size: 48,
            max_align: 8,
        };
        smallest.validate().unwrap();
        assert!(smallest.max_chunk_size() >= RelOids::SIZE);

        // (47 * 3 - 24) / 3 = 39, aligned down to 32: 11 payload bytes.
        for max_tuple_size in [47, 32] {
            let config = CatalogConfig {
                max_tuple_size,
                max_align: 8,
            };
            assert!(config.validate().is_err(), "accepted {max_tuple_size}");
        }
    }

    #[test]
    fn test_rejects_odd_alignment() {
        let config = CatalogConfig {
            max_tuple_size: 2048,
            max_align: 6,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CatalogConfig = serde_json::from_str(r#"{"max_tuple_size": 512}"#).unwrap();
        assert_eq!(config.max_tuple_size, 512);
        assert_eq!(config.max_align, DEFAULT_MAX_ALIGN);
    }
}

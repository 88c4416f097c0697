//! Builds an in-memory catalog from table definitions on disk.

use std::fs;
use std::path::{Path, PathBuf};

use indexcat_core::catalog::IndexCatalog;
use indexcat_core::config::CatalogConfig;
use indexcat_core::schema::Table;
use indexcat_core::tree::{InMemoryOrderedMap, SnapshotTracker};
use indexcat_core::types::{Csn, Oid, Xid};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Transaction that registers the loaded tables.
const LOAD_XID: Xid = 1;
const LOAD_CSN: Csn = 1;
/// Transaction that drops tables named with `--drop`.
const DROP_XID: Xid = 2;
const DROP_CSN: Csn = 2;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no loaded table has reloid {0}")]
    UnknownTable(Oid),

    #[error(transparent)]
    Catalog(#[from] indexcat_core::error::Error),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a JSON array of table definitions.
pub fn load_tables(path: &Path) -> Result<Vec<Table>, LoadError> {
    read_json(path)
}

/// Read catalog tunables; missing fields keep their defaults.
pub fn load_config(path: Option<&Path>) -> Result<CatalogConfig, LoadError> {
    match path {
        Some(path) => read_json(path),
        None => Ok(CatalogConfig::default()),
    }
}

/// Register every descriptor of `tables`, then delete the descriptors of the
/// tables whose reloid is listed in `drops`. With `vacuum`, the deleted
/// chunks are reclaimed afterwards.
pub fn build_catalog(
    tables: &[Table],
    config: &CatalogConfig,
    drops: &[Oid],
    vacuum: bool,
) -> Result<IndexCatalog<InMemoryOrderedMap>, LoadError> {
    let mut catalog = IndexCatalog::new(InMemoryOrderedMap::new(), config)?;
    for table in tables {
        catalog.add_table(table, LOAD_XID, LOAD_CSN)?;
    }
    for &reloid in drops {
        let table = tables
            .iter()
            .find(|t| t.oids.reloid == reloid)
            .ok_or(LoadError::UnknownTable(reloid))?;
        catalog.delete_table(table, DROP_XID, DROP_CSN)?;
    }
    if vacuum {
        catalog.vacuum(&SnapshotTracker::new());
    }
    debug!(
        tables = tables.len(),
        dropped = drops.len(),
        records = catalog.map().key_count(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Load tables and config from disk and build the catalog.
pub fn load_catalog(
    tables_path: &Path,
    config_path: Option<&Path>,
    drops: &[Oid],
    vacuum: bool,
) -> Result<IndexCatalog<InMemoryOrderedMap>, LoadError> {
    let config = load_config(config_path)?;
    let tables = load_tables(tables_path)?;
    build_catalog(&tables, &config, drops, vacuum)
}

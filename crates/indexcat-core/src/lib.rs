//! # indexcat
//!
//! Persistent catalog of index descriptors for an ordered-map storage
//! engine.
//!
//! Every tree of a table (its primary index, a side tree for oversized
//! values, and each secondary index) is described by an [`IndexLayout`]
//! derived from the table definition. Layouts are serialized, split into
//! chunks and stored in an [`OrderedMap`] under `(oids, kind, chunknum)`
//! keys. A stored layout is turned back into a runtime [`IndexDescriptor`]
//! with bound comparators and compiled expressions.
//!
//! ## Quick Start
//!
//! ```
//! use indexcat_core::builtin::{BuiltinTypes, INT4_BTREE_OPS, INT4_OID, TEXT_OID};
//! use indexcat_core::catalog::IndexCatalog;
//! use indexcat_core::config::CatalogConfig;
//! use indexcat_core::report::describe_index;
//! use indexcat_core::schema::{Table, TableField, TableIndex, TableIndexField};
//! use indexcat_core::tree::{InMemoryOrderedMap, Snapshot};
//! use indexcat_core::types::{AttNum, IndexKind, RelOids};
//!
//! let table = Table::new(
//!     RelOids::new(1, 100, 100),
//!     RelOids::new(1, 101, 101),
//!     vec![
//!         TableField::new("id", INT4_OID).not_null(),
//!         TableField::new("val", TEXT_OID),
//!     ],
//! )
//! .with_index(TableIndex::new(
//!     RelOids::new(1, 102, 102),
//!     IndexKind::Primary,
//!     "t_pkey",
//!     vec![TableIndexField::new(AttNum::User(0), INT4_BTREE_OPS)],
//! ));
//!
//! let mut catalog = IndexCatalog::new(InMemoryOrderedMap::new(), &CatalogConfig::default())?;
//! catalog.add_table(&table, 1, 1)?;
//!
//! let layout = catalog
//!     .get(RelOids::new(1, 102, 102), IndexKind::Primary, Snapshot::NonDeleted)?
//!     .expect("primary layout");
//! assert_eq!(layout.n_key_fields, 1);
//!
//! let descr = describe_index(&catalog, RelOids::new(1, 102, 102), "primary", &BuiltinTypes)?;
//! assert!(descr.text.ends_with("Key fields: (id)\n"));
//! # Ok::<(), indexcat_core::error::Error>(())
//! ```
//!
//! [`IndexLayout`]: layout::IndexLayout
//! [`OrderedMap`]: tree::OrderedMap
//! [`IndexDescriptor`]: descr::IndexDescriptor

pub mod builtin;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod descr;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod layout;
pub mod report;
pub mod schema;
pub mod tree;
pub mod types;

//! Error types for all index catalog operations.

use thiserror::Error;

use crate::types::{IndexKind, RelOids};

/// Top-level error type for index catalog operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Descr(#[from] DescrError),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures reported by the ordered map underneath the catalog.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("corrupted record: {0}")]
    CorruptedRecord(String),

    #[error("modify window not open")]
    NoModifyWindow,

    #[error("ordered map unavailable: {0}")]
    Unavailable(String),
}

/// Byte-level decoding failures of chunk keys, chunk values and layouts.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("truncated {what}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("{0} trailing bytes after encoded layout")]
    TrailingBytes(usize),

    #[error("invalid {what} tag: {tag}")]
    InvalidTag { what: &'static str, tag: i64 },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("{0} is not NUL-terminated")]
    MissingTerminator(&'static str),

    #[error("malformed chunk key of {0} bytes")]
    MalformedKey(usize),

    #[error("{what} {value} does not fit its encoded width")]
    OutOfRange { what: &'static str, value: usize },

    #[error("inconsistent layout: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Node(#[from] ExprError),
}

/// Failures while deriving a layout from a table definition.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("index slot {slot} is out of range for a table with {nindices} indices")]
    InvalidSlot { slot: u16, nindices: usize },

    #[error("index slot {slot} refers to the primary index, not a secondary")]
    NotSecondary { slot: u16 },

    #[error("index '{index}' has no expression for expression field {position}")]
    MissingExpression { index: String, position: usize },

    #[error("index '{index}' references column {attnum} beyond {nfields} table fields")]
    UnknownColumn {
        index: String,
        attnum: u16,
        nfields: usize,
    },

    #[error("index '{index}' declares {nkeyfields} key fields but has only {nfields} fields")]
    KeyFieldsOutOfRange {
        index: String,
        nkeyfields: u16,
        nfields: usize,
    },

    #[error("'{name}' has {nfields} fields, more than the supported {max}")]
    TooManyFields {
        name: String,
        nfields: usize,
        max: usize,
    },

    #[error("inconsistent layout: {0}")]
    Inconsistent(String),
}

/// Failures while realizing a runtime descriptor from a layout.
#[derive(Debug, Error)]
pub enum DescrError {
    #[error("no comparator for opclass {opclass} in database {datoid}")]
    UnknownOpclass { datoid: u32, opclass: u32 },

    #[error("schema shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// Failures of the expression host.
#[derive(Debug, Error)]
pub enum ExprError {
    #[error("malformed expression text: {0}")]
    Parse(String),

    #[error("cannot compile expression: {0}")]
    Compile(String),

    #[error("evaluation failed: {0}")]
    Eval(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("index descriptor {oids} ({kind}) not found")]
    NotFound { oids: RelOids, kind: String },

    #[error("corrupted index descriptor {oids} ({kind}): {source}")]
    Corrupt {
        oids: RelOids,
        kind: IndexKind,
        #[source]
        source: EncodingError,
    },

    #[error("unexpected chunk {chunknum} at start of descriptor {oids} ({kind})")]
    OrphanChunk {
        oids: RelOids,
        kind: IndexKind,
        chunknum: u32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

//! Core types: object ids, index kinds, attribute references, orderings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// Host object identifier.
pub type Oid = u32;

/// Transaction identifier (opaque to this subsystem).
pub type Xid = u64;

/// Commit sequence number (opaque to this subsystem).
pub type Csn = u64;

/// The invalid object id.
pub const INVALID_OID: Oid = 0;

/// Raw attribute number of the synthetic row-id column.
pub const ROW_ID_ATTNUM: i16 = -1;

/// Raw attribute number of engine-private columns (large-value column id,
/// chunk number, value).
pub const SYSTEM_ATTNUM: i16 = -7;

/// Raw attribute number of a column computed by an index expression.
pub const EXPR_ATTNUM: i16 = -8;

/// Identity of a logical relation and its physical fork.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RelOids {
    pub datoid: Oid,
    pub reloid: Oid,
    /// Physical id; orders siblings within the same database and relation.
    pub relnode: Oid,
}

impl RelOids {
    /// Encoded size of a `RelOids` triple.
    pub const SIZE: usize = 12;

    pub const fn new(datoid: Oid, reloid: Oid, relnode: Oid) -> Self {
        Self {
            datoid,
            reloid,
            relnode,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.datoid != INVALID_OID && self.reloid != INVALID_OID && self.relnode != INVALID_OID
    }

    /// The next triple in component-wise order, carrying into `reloid` and
    /// `datoid` when `relnode` wraps. `None` past the last triple.
    pub fn successor(&self) -> Option<Self> {
        if let Some(relnode) = self.relnode.checked_add(1) {
            return Some(Self { relnode, ..*self });
        }
        if let Some(reloid) = self.reloid.checked_add(1) {
            return Some(Self::new(self.datoid, reloid, 0));
        }
        self.datoid.checked_add(1).map(|datoid| Self::new(datoid, 0, 0))
    }
}

impl fmt::Display for RelOids {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.datoid, self.reloid, self.relnode)
    }
}

/// Kind of an index descriptor as persisted in the catalog key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum IndexKind {
    /// Side tree holding chunks of oversized column values.
    LargeValue,
    Primary,
    Unique,
    Regular,
}

impl IndexKind {
    pub const ALL: [IndexKind; 4] = [
        IndexKind::LargeValue,
        IndexKind::Primary,
        IndexKind::Unique,
        IndexKind::Regular,
    ];

    pub fn tag(self) -> u8 {
        match self {
            IndexKind::LargeValue => 1,
            IndexKind::Primary => 2,
            IndexKind::Unique => 3,
            IndexKind::Regular => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            1 => Ok(IndexKind::LargeValue),
            2 => Ok(IndexKind::Primary),
            3 => Ok(IndexKind::Unique),
            4 => Ok(IndexKind::Regular),
            _ => Err(EncodingError::InvalidTag {
                what: "index kind",
                tag: tag.into(),
            }),
        }
    }

    /// The next kind in key order, if any.
    pub fn successor(self) -> Option<Self> {
        match self {
            IndexKind::LargeValue => Some(IndexKind::Primary),
            IndexKind::Primary => Some(IndexKind::Unique),
            IndexKind::Unique => Some(IndexKind::Regular),
            IndexKind::Regular => None,
        }
    }

    /// External name used by the reporting functions.
    pub fn name(self) -> &'static str {
        match self {
            IndexKind::LargeValue => "toast",
            IndexKind::Primary => "primary",
            IndexKind::Unique => "unique",
            IndexKind::Regular => "regular",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        IndexKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// External name of a raw kind tag; unknown tags read as `"invalid"`.
pub fn kind_name(tag: u8) -> &'static str {
    IndexKind::from_tag(tag).map_or("invalid", IndexKind::name)
}

/// The five layout shapes the builder knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVariant {
    Primary,
    /// Engine-synthesized primary for tables that declare none.
    RowIdPrimary,
    Unique,
    Regular,
    LargeValue,
}

impl LayoutVariant {
    /// Kind under which this variant is persisted.
    pub fn kind(self) -> IndexKind {
        match self {
            LayoutVariant::Primary | LayoutVariant::RowIdPrimary => IndexKind::Primary,
            LayoutVariant::Unique => IndexKind::Unique,
            LayoutVariant::Regular => IndexKind::Regular,
            LayoutVariant::LargeValue => IndexKind::LargeValue,
        }
    }
}

/// Position of an index within a table's descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexSlot(pub u16);

impl IndexSlot {
    pub const PRIMARY: IndexSlot = IndexSlot(0);
    pub const LARGE_VALUE: IndexSlot = IndexSlot(u16::MAX);
}

impl fmt::Display for IndexSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            IndexSlot::PRIMARY => f.write_str("primary"),
            IndexSlot::LARGE_VALUE => f.write_str("large-value"),
            IndexSlot(n) => write!(f, "secondary {n}"),
        }
    }
}

/// Reference to the column an index field is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttNum {
    /// 0-based position in the table's field list.
    User(u16),
    /// Physical row pointer used as the primary key when none is declared.
    RowId,
    /// Engine-private column.
    System,
    /// Output of an index expression, taken positionally from the
    /// expression list.
    Expr,
}

impl AttNum {
    /// Signed on-disk attnum. User positions above `i16::MAX` have no
    /// encoding.
    pub fn to_raw(self) -> Result<i16, EncodingError> {
        match self {
            AttNum::User(n) => i16::try_from(n).map_err(|_| EncodingError::OutOfRange {
                what: "attnum",
                value: usize::from(n),
            }),
            AttNum::RowId => Ok(ROW_ID_ATTNUM),
            AttNum::System => Ok(SYSTEM_ATTNUM),
            AttNum::Expr => Ok(EXPR_ATTNUM),
        }
    }

    pub fn from_raw(raw: i16) -> Result<Self, EncodingError> {
        match raw {
            n if n >= 0 => Ok(AttNum::User(n as u16)),
            ROW_ID_ATTNUM => Ok(AttNum::RowId),
            SYSTEM_ATTNUM => Ok(AttNum::System),
            EXPR_ATTNUM => Ok(AttNum::Expr),
            other => Err(EncodingError::InvalidTag {
                what: "attnum",
                tag: other.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsOrder {
    First,
    Last,
    /// Last for ascending columns, first for descending ones.
    #[default]
    Default,
}

impl NullsOrder {
    /// Whether nulls sort before non-null values under `order`.
    pub fn nulls_first(self, order: SortOrder) -> bool {
        match self {
            NullsOrder::First => true,
            NullsOrder::Last => false,
            NullsOrder::Default => order == SortOrder::Descending,
        }
    }
}

/// Storage alignment of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Align {
    #[default]
    Char,
    Short,
    Int,
    Double,
}

impl Align {
    pub fn bytes(self) -> usize {
        match self {
            Align::Char => 1,
            Align::Short => 2,
            Align::Int => 4,
            Align::Double => 8,
        }
    }

    pub fn align_up(self, len: usize) -> usize {
        let a = self.bytes();
        len.div_ceil(a) * a
    }

    pub fn code(self) -> u8 {
        match self {
            Align::Char => b'c',
            Align::Short => b's',
            Align::Int => b'i',
            Align::Double => b'd',
        }
    }

    pub fn from_code(code: u8) -> Result<Self, EncodingError> {
        match code {
            b'c' => Ok(Align::Char),
            b's' => Ok(Align::Short),
            b'i' => Ok(Align::Int),
            b'd' => Ok(Align::Double),
            _ => Err(EncodingError::InvalidTag {
                what: "alignment",
                tag: code.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persistence {
    #[default]
    Permanent,
    Unlogged,
    Temporary,
}

impl Persistence {
    /// Whether writes on behalf of this relation are WAL-logged.
    pub fn wal_logged(self) -> bool {
        self != Persistence::Temporary
    }

    pub fn code(self) -> u8 {
        match self {
            Persistence::Permanent => b'p',
            Persistence::Unlogged => b'u',
            Persistence::Temporary => b't',
        }
    }

    pub fn from_code(code: u8) -> Result<Self, EncodingError> {
        match code {
            b'p' => Ok(Persistence::Permanent),
            b'u' => Ok(Persistence::Unlogged),
            b't' => Ok(Persistence::Temporary),
            _ => Err(EncodingError::InvalidTag {
                what: "persistence",
                tag: code.into(),
            }),
        }
    }
}

/// Compression level; `None` selects the engine default.
pub type Compress = Option<u8>;

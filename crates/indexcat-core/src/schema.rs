//! Table and index definitions as handed over by the host catalog.

use serde::{Deserialize, Serialize};

use crate::builtin::{NO_TYPMOD, TID_BTREE_OPS, builtin_type};
use crate::expr::ExprNode;
use crate::types::{
    Align, AttNum, Compress, INVALID_OID, IndexKind, NullsOrder, Oid, Persistence, RelOids,
    SortOrder,
};

/// User-visible column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    pub name: String,
    pub type_oid: Oid,
    #[serde(default = "default_typmod")]
    pub typmod: i32,
    /// Fixed length in bytes, or a non-positive value for variable length.
    pub len: i16,
    pub align: Align,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub collation: Oid,
    #[serde(default)]
    pub dropped: bool,
}

fn default_typmod() -> i32 {
    NO_TYPMOD
}

impl TableField {
    /// A nullable column of a built-in type, with the type's length,
    /// alignment and default collation.
    pub fn new(name: &str, type_oid: Oid) -> Self {
        let (len, align, collation) = match builtin_type(type_oid) {
            Some(t) => (t.len, t.align, t.collation),
            None => (-1, Align::Int, INVALID_OID),
        };
        Self {
            name: name.to_string(),
            type_oid,
            typmod: NO_TYPMOD,
            len,
            align,
            not_null: false,
            collation,
            dropped: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// One key or included column of an index definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIndexField {
    pub attnum: AttNum,
    pub opclass: Oid,
    #[serde(default)]
    pub collation: Oid,
    #[serde(default)]
    pub ordering: SortOrder,
    #[serde(default)]
    pub nulls_ordering: NullsOrder,
}

impl TableIndexField {
    pub fn new(attnum: AttNum, opclass: Oid) -> Self {
        Self {
            attnum,
            opclass,
            collation: INVALID_OID,
            ordering: SortOrder::Ascending,
            nulls_ordering: NullsOrder::Default,
        }
    }

    pub fn descending(mut self) -> Self {
        self.ordering = SortOrder::Descending;
        self
    }

    /// Two fields are interchangeable when they read the same column with
    /// the same opclass. Expression fields never match.
    pub fn same_column(&self, other: &TableIndexField) -> bool {
        self.attnum != AttNum::Expr && self.attnum == other.attnum && self.opclass == other.opclass
    }
}

/// An index as declared on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIndex {
    pub oids: RelOids,
    pub kind: IndexKind,
    pub name: String,
    /// Key fields first, then included fields.
    pub fields: Vec<TableIndexField>,
    pub nkeyfields: u16,
    #[serde(default)]
    pub nulls_not_distinct: bool,
    #[serde(default)]
    pub compress: Compress,
    #[serde(default)]
    pub predicate: Option<ExprNode>,
    #[serde(default)]
    pub predicate_text: Option<String>,
    #[serde(default)]
    pub expressions: Vec<ExprNode>,
    /// Leaf-side field produced by `expressions[k]`.
    #[serde(default)]
    pub expr_fields: Vec<TableField>,
}

impl TableIndex {
    pub fn new(oids: RelOids, kind: IndexKind, name: &str, fields: Vec<TableIndexField>) -> Self {
        let nkeyfields = u16::try_from(fields.len()).unwrap_or(u16::MAX);
        Self {
            oids,
            kind,
            name: name.to_string(),
            fields,
            nkeyfields,
            nulls_not_distinct: false,
            compress: None,
            predicate: None,
            predicate_text: None,
            expressions: Vec::new(),
            expr_fields: Vec::new(),
        }
    }

    /// Mark the trailing `n` fields as included (non-key) columns.
    pub fn with_included(mut self, n: u16) -> Self {
        self.nkeyfields = u16::try_from(self.fields.len())
            .unwrap_or(u16::MAX)
            .saturating_sub(n);
        self
    }

    pub fn with_predicate(mut self, predicate: ExprNode, text: &str) -> Self {
        self.predicate = Some(predicate);
        self.predicate_text = Some(text.to_string());
        self
    }

    /// Append an expression key field producing `field`.
    pub fn with_expression(mut self, expr: ExprNode, field: TableField, opclass: Oid) -> Self {
        self.fields.insert(
            self.nkeyfields as usize,
            TableIndexField::new(AttNum::Expr, opclass),
        );
        self.nkeyfields += 1;
        self.expressions.push(expr);
        self.expr_fields.push(field);
        self
    }

    pub fn nfields(&self) -> usize {
        self.fields.len()
    }

    pub fn key_fields(&self) -> &[TableIndexField] {
        &self.fields[..(self.nkeyfields as usize).min(self.fields.len())]
    }
}

/// Default value expression attached to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefault {
    pub attnum: u16,
    pub expr_text: String,
}

/// A table together with all of its declared indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub oids: RelOids,
    #[serde(default)]
    pub persistence: Persistence,
    pub fields: Vec<TableField>,
    #[serde(default)]
    pub primary_compress: Compress,
    pub large_value_oids: RelOids,
    #[serde(default)]
    pub large_value_compress: Compress,
    #[serde(default = "default_tid_opclass")]
    pub tid_opclass: Oid,
    /// Number of columns present when the primary tree was created; later
    /// added columns do not extend its fixed-format prefix. `None` counts
    /// every current column.
    #[serde(default)]
    pub primary_init_nfields: Option<u16>,
    #[serde(default)]
    pub defaults: Vec<ColumnDefault>,
    /// `indices[0]`, when of kind `Primary`, is the declared primary key.
    #[serde(default)]
    pub indices: Vec<TableIndex>,
}

fn default_tid_opclass() -> Oid {
    TID_BTREE_OPS
}

impl Table {
    pub fn new(oids: RelOids, large_value_oids: RelOids, fields: Vec<TableField>) -> Self {
        let primary_init_nfields = Some(u16::try_from(fields.len()).unwrap_or(u16::MAX));
        Self {
            oids,
            persistence: Persistence::Permanent,
            fields,
            primary_compress: None,
            large_value_oids,
            large_value_compress: None,
            tid_opclass: TID_BTREE_OPS,
            primary_init_nfields,
            defaults: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: TableIndex) -> Self {
        self.indices.push(index);
        self
    }

    pub fn has_primary(&self) -> bool {
        self.indices
            .first()
            .is_some_and(|index| index.kind == IndexKind::Primary)
    }

    /// The declared primary key, if any.
    pub fn primary(&self) -> Option<&TableIndex> {
        if self.has_primary() {
            self.indices.first()
        } else {
            None
        }
    }

    pub fn primary_init_nfields(&self) -> usize {
        self.primary_init_nfields
            .map_or(self.fields.len(), usize::from)
    }

    /// Number of index slots a table occupies besides the large-value tree:
    /// the primary (declared or synthesized) plus every secondary.
    pub fn nslots(&self) -> usize {
        if self.has_primary() {
            self.indices.len()
        } else {
            self.indices.len() + 1
        }
    }
}

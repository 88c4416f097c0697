//! Canonical, storage-independent index layouts.
//!
//! A layout is derived from a [`Table`](crate::schema::Table) by
//! [`make_layout`], persisted by the catalog through [`codec`], and turned
//! into a runtime descriptor by [`crate::descr::realize`].

pub mod builder;
pub mod codec;

pub use builder::{layout_identity, layout_variant, make_layout};
pub use codec::{decode_layout, encode_layout, peek_table_oids};

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::expr::ExprNode;
use crate::schema::{TableField, TableIndexField};
use crate::types::{AttNum, Compress, IndexKind, LayoutVariant, Persistence, RelOids, Xid};

/// A declared index field that was elided because an equal column was
/// already accepted.
///
/// `position` is the field's slot in the virtual scan tuple (its declared
/// position); `source` is the `non_leaf_fields` position holding the equal
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duplicate {
    pub position: u16,
    pub source: u16,
}

/// Persisted shape of one index tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexLayout {
    pub oids: RelOids,
    pub table_oids: RelOids,
    pub kind: IndexKind,
    pub name: String,
    pub persistence: Persistence,
    pub compress: Compress,
    /// The table declares no primary key; rows are keyed by row id.
    pub primary_is_row_id: bool,
    pub nulls_not_distinct: bool,
    /// Value-side schema stored at leaves.
    pub leaf_fields: Vec<TableField>,
    /// Key-side schema.
    pub non_leaf_fields: Vec<TableIndexField>,
    pub n_key_fields: u16,
    pub n_included_fields: u16,
    pub n_unique_fields: u16,
    /// 1-based `non_leaf_fields` positions of the primary key columns.
    pub primary_fields_attnums: Vec<u16>,
    pub predicate: Option<ExprNode>,
    pub predicate_text: Option<String>,
    pub expressions: Vec<ExprNode>,
    pub duplicates: Vec<Duplicate>,
    pub create_xid: Xid,
}

impl IndexLayout {
    pub fn n_leaf_fields(&self) -> usize {
        self.leaf_fields.len()
    }

    pub fn n_non_leaf_fields(&self) -> usize {
        self.non_leaf_fields.len()
    }

    pub fn n_primary_fields(&self) -> usize {
        self.primary_fields_attnums.len()
    }

    pub fn variant(&self) -> LayoutVariant {
        match self.kind {
            IndexKind::Primary if self.primary_is_row_id => LayoutVariant::RowIdPrimary,
            IndexKind::Primary => LayoutVariant::Primary,
            IndexKind::Unique => LayoutVariant::Unique,
            IndexKind::Regular => LayoutVariant::Regular,
            IndexKind::LargeValue => LayoutVariant::LargeValue,
        }
    }

    /// Key columns that are engine-private rather than table columns.
    pub fn extra_system_fields(&self) -> usize {
        self.non_leaf_fields
            .iter()
            .filter(|f| f.attnum == AttNum::System)
            .count()
    }

    /// Verify the structural invariants every layout satisfies.
    pub fn check_invariants(&self) -> Result<(), LayoutError> {
        let n_non_leaf = self.n_non_leaf_fields();
        let n_key = usize::from(self.n_key_fields);
        let n_included = usize::from(self.n_included_fields);
        let n_unique = usize::from(self.n_unique_fields);
        let fail = |msg: String| Err(LayoutError::Inconsistent(msg));

        if n_key > n_non_leaf || n_key + n_included > n_non_leaf {
            return fail(format!(
                "{n_key} key and {n_included} included fields exceed {n_non_leaf} key-side fields"
            ));
        }
        if self.n_primary_fields() > n_non_leaf || n_unique > n_non_leaf {
            return fail(format!(
                "{} primary / {n_unique} unique fields exceed {n_non_leaf} key-side fields",
                self.n_primary_fields()
            ));
        }
        if self.n_leaf_fields() + self.extra_system_fields() < n_non_leaf {
            return fail(format!(
                "{} leaf fields cannot back {n_non_leaf} key-side fields",
                self.n_leaf_fields()
            ));
        }
        let expected_unique = match self.kind {
            IndexKind::Primary | IndexKind::Unique => n_key,
            IndexKind::Regular | IndexKind::LargeValue => n_non_leaf,
        };
        if n_unique != expected_unique {
            return fail(format!(
                "{} index has {n_unique} unique fields, expected {expected_unique}",
                self.kind
            ));
        }
        if self.kind == IndexKind::Primary
            && self.primary_is_row_id
            && (n_non_leaf != 1 || self.non_leaf_fields[0].attnum != AttNum::RowId)
        {
            return fail("row id primary must be keyed by the row id alone".to_string());
        }
        if let Some(&bad) = self
            .primary_fields_attnums
            .iter()
            .find(|&&p| p == 0 || usize::from(p) > n_non_leaf)
        {
            return fail(format!("primary field position {bad} out of range"));
        }
        let mut last = None;
        for dup in &self.duplicates {
            if last.is_some_and(|prev| dup.position <= prev) {
                return fail(format!("duplicate at {} is out of order", dup.position));
            }
            if dup.source >= dup.position || usize::from(dup.source) >= n_non_leaf {
                return fail(format!(
                    "duplicate at {} has invalid source {}",
                    dup.position, dup.source
                ));
            }
            last = Some(dup.position);
        }
        if self.predicate_text.is_some() && self.predicate.is_none() {
            return fail("predicate text without predicate".to_string());
        }
        let expr_fields = self
            .non_leaf_fields
            .iter()
            .filter(|f| f.attnum == AttNum::Expr)
            .count();
        if expr_fields > self.expressions.len() {
            return fail(format!(
                "{expr_fields} expression fields but {} expressions",
                self.expressions.len()
            ));
        }
        Ok(())
    }
}

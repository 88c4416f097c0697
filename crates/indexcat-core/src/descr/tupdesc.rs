//! Tuple schemas used by realized descriptors.

use crate::schema::{ColumnDefault, Table, TableField};

/// Constraints attached to the leaf schema of a primary index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleConstraints {
    pub has_not_null: bool,
    pub defaults: Vec<ColumnDefault>,
}

impl TupleConstraints {
    pub fn from_table(table: &Table) -> Self {
        Self {
            has_not_null: table.fields.iter().any(|f| f.not_null && !f.dropped),
            defaults: table.defaults.clone(),
        }
    }
}

/// Leading run of fixed-length columns: how many there are and their
/// aligned total size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedFormatSpec {
    pub natts: usize,
    pub len: usize,
}

/// Ordered list of column attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleDesc {
    attrs: Vec<TableField>,
    constraints: Option<TupleConstraints>,
}

impl TupleDesc {
    pub fn with_capacity(natts: usize) -> Self {
        Self {
            attrs: Vec::with_capacity(natts),
            constraints: None,
        }
    }

    pub fn from_fields(fields: &[TableField]) -> Self {
        Self {
            attrs: fields.to_vec(),
            constraints: None,
        }
    }

    pub fn natts(&self) -> usize {
        self.attrs.len()
    }

    pub fn attr(&self, i: usize) -> Option<&TableField> {
        self.attrs.get(i)
    }

    pub fn attrs(&self) -> &[TableField] {
        &self.attrs
    }

    pub fn push(&mut self, attr: TableField) {
        self.attrs.push(attr);
    }

    pub fn constraints(&self) -> Option<&TupleConstraints> {
        self.constraints.as_ref()
    }

    pub fn set_constraints(&mut self, constraints: TupleConstraints) {
        self.constraints = Some(constraints);
    }

    /// First `n` attributes, without constraints.
    pub fn prefix(&self, n: usize) -> Self {
        Self::from_fields(&self.attrs[..n.min(self.attrs.len())])
    }

    /// Sum the aligned sizes of the leading fixed-length columns, looking at
    /// no more than `limit` columns. Stops at the first column whose length
    /// is not positive.
    pub fn fixed_format(&self, limit: Option<usize>) -> FixedFormatSpec {
        let natts = limit.map_or(self.attrs.len(), |n| n.min(self.attrs.len()));
        let mut spec = FixedFormatSpec::default();
        for attr in &self.attrs[..natts] {
            if attr.len <= 0 {
                break;
            }
            spec.len = attr.align.align_up(spec.len) + attr.len as usize;
            spec.natts += 1;
        }
        spec
    }
}

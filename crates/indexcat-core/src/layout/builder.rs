//! Derivation of index layouts from table definitions.

use tracing::debug;

use crate::builtin::{
    BYTEA_OID, INT2_BTREE_OPS, INT2_OID, INT4_BTREE_OPS, INT4_OID, TID_OID, builtin_field,
};
use crate::error::LayoutError;
use crate::schema::{Table, TableField, TableIndex, TableIndexField};
use crate::types::{AttNum, IndexKind, IndexSlot, LayoutVariant, RelOids};

use super::{Duplicate, IndexLayout};

pub const ROW_ID_PRIMARY_NAME: &str = "rowid_primary";
pub const LARGE_VALUE_NAME: &str = "toast";

pub const ROW_ID_COLUMN: &str = "rowid";
pub const COLUMN_ID_COLUMN: &str = "column_id";
pub const CHUNK_NUM_COLUMN: &str = "chunk_num";
pub const DATA_COLUMN: &str = "data";

/// Most fields a table or index may declare. User attnums must fit the
/// signed on-disk attnum and every layout count a `u16`.
pub const MAX_FIELDS: usize = i16::MAX as usize;

/// Which builder handles `slot` of `table`.
pub fn layout_variant(table: &Table, slot: IndexSlot) -> Result<LayoutVariant, LayoutError> {
    match slot {
        IndexSlot::PRIMARY if table.has_primary() => Ok(LayoutVariant::Primary),
        IndexSlot::PRIMARY => Ok(LayoutVariant::RowIdPrimary),
        IndexSlot::LARGE_VALUE => Ok(LayoutVariant::LargeValue),
        _ => match secondary(table, slot)?.kind {
            IndexKind::Unique => Ok(LayoutVariant::Unique),
            IndexKind::Regular => Ok(LayoutVariant::Regular),
            IndexKind::Primary | IndexKind::LargeValue => {
                Err(LayoutError::NotSecondary { slot: slot.0 })
            }
        },
    }
}

/// Catalog identity `(oids, kind)` of index `slot` of `table`, without
/// building its layout.
pub fn layout_identity(table: &Table, slot: IndexSlot) -> Result<(RelOids, IndexKind), LayoutError> {
    Ok(match layout_variant(table, slot)? {
        LayoutVariant::RowIdPrimary => (table.oids, IndexKind::Primary),
        LayoutVariant::LargeValue => (table.large_value_oids, IndexKind::LargeValue),
        LayoutVariant::Primary => {
            let index = table
                .primary()
                .ok_or(LayoutError::NotSecondary { slot: slot.0 })?;
            (index.oids, IndexKind::Primary)
        }
        LayoutVariant::Unique | LayoutVariant::Regular => {
            let index = secondary(table, slot)?;
            (index.oids, index.kind)
        }
    })
}

/// Build the layout of index `slot` of `table`.
pub fn make_layout(table: &Table, slot: IndexSlot) -> Result<IndexLayout, LayoutError> {
    if table.fields.len() > MAX_FIELDS {
        return Err(LayoutError::TooManyFields {
            name: table.oids.to_string(),
            nfields: table.fields.len(),
            max: MAX_FIELDS,
        });
    }
    if let Some(index) = table.primary() {
        check_declared(index)?;
    }
    let layout = match layout_variant(table, slot)? {
        LayoutVariant::RowIdPrimary => row_id_primary(table),
        LayoutVariant::Primary => {
            let index = table
                .primary()
                .ok_or(LayoutError::NotSecondary { slot: slot.0 })?;
            primary(table, index)?
        }
        LayoutVariant::LargeValue => large_value(table)?,
        LayoutVariant::Unique | LayoutVariant::Regular => {
            let index = secondary(table, slot)?;
            check_declared(index)?;
            secondary_layout(table, index)?
        }
    };
    debug!(
        table = %table.oids,
        index = %layout.oids,
        kind = %layout.kind,
        %slot,
        key_fields = layout.n_key_fields,
        fields = layout.non_leaf_fields.len(),
        "built index layout"
    );
    Ok(layout)
}

/// Reject declarations whose counts cannot describe their field list.
fn check_declared(index: &TableIndex) -> Result<(), LayoutError> {
    if index.fields.len() > MAX_FIELDS {
        return Err(LayoutError::TooManyFields {
            name: index.name.clone(),
            nfields: index.fields.len(),
            max: MAX_FIELDS,
        });
    }
    if usize::from(index.nkeyfields) > index.fields.len() {
        return Err(LayoutError::KeyFieldsOutOfRange {
            index: index.name.clone(),
            nkeyfields: index.nkeyfields,
            nfields: index.fields.len(),
        });
    }
    Ok(())
}

/// `n` as a layout count.
fn count(n: usize) -> Result<u16, LayoutError> {
    u16::try_from(n).map_err(|_| LayoutError::TooManyFields {
        name: "layout".to_string(),
        nfields: n,
        max: usize::from(u16::MAX),
    })
}

fn secondary(table: &Table, slot: IndexSlot) -> Result<&TableIndex, LayoutError> {
    let shift = if table.has_primary() { 0 } else { 1 };
    usize::from(slot.0)
        .checked_sub(shift)
        .and_then(|i| table.indices.get(i))
        .ok_or(LayoutError::InvalidSlot {
            slot: slot.0,
            nindices: table.indices.len(),
        })
}

fn row_id_field(table: &Table) -> TableIndexField {
    TableIndexField::new(AttNum::RowId, table.tid_opclass)
}

fn system_field(opclass: u32) -> TableIndexField {
    TableIndexField::new(AttNum::System, opclass)
}

/// Fields accepted so far, kept in lockstep on the leaf and key sides.
#[derive(Default)]
struct Accumulator {
    leaf: Vec<TableField>,
    non_leaf: Vec<TableIndexField>,
}

impl Accumulator {
    fn find(&self, field: &TableIndexField) -> Option<usize> {
        self.non_leaf.iter().position(|f| field.same_column(f))
    }

    fn push(&mut self, leaf: TableField, field: TableIndexField) -> Result<u16, LayoutError> {
        self.leaf.push(leaf);
        self.non_leaf.push(field);
        count(self.non_leaf.len())
    }
}

/// Resolves the leaf-side field of declared index fields, consuming
/// expression outputs in declaration order.
struct LeafSource<'a> {
    table: &'a Table,
    index: Option<&'a TableIndex>,
    next_expr: usize,
}

impl<'a> LeafSource<'a> {
    fn new(table: &'a Table, index: Option<&'a TableIndex>) -> Self {
        Self {
            table,
            index,
            next_expr: 0,
        }
    }

    fn name(&self) -> String {
        self.index
            .map_or_else(|| self.table.oids.to_string(), |index| index.name.clone())
    }

    fn resolve(&mut self, field: &TableIndexField, position: usize) -> Result<TableField, LayoutError> {
        match field.attnum {
            AttNum::User(attnum) => self.table.fields.get(usize::from(attnum)).cloned().ok_or_else(
                || LayoutError::UnknownColumn {
                    index: self.name(),
                    attnum,
                    nfields: self.table.fields.len(),
                },
            ),
            AttNum::RowId => Ok(builtin_field(TID_OID, ROW_ID_COLUMN)),
            AttNum::Expr => {
                let k = self.next_expr;
                let leaf = self.index.and_then(|index| {
                    index.expressions.get(k)?;
                    index.expr_fields.get(k).cloned()
                });
                self.next_expr += 1;
                leaf.ok_or_else(|| LayoutError::MissingExpression {
                    index: self.name(),
                    position,
                })
            }
            AttNum::System => Err(LayoutError::Inconsistent(format!(
                "index '{}' declares a system column at {position}",
                self.name()
            ))),
        }
    }
}

fn row_id_primary(table: &Table) -> IndexLayout {
    let mut leaf_fields = Vec::with_capacity(table.fields.len() + 1);
    leaf_fields.push(builtin_field(TID_OID, ROW_ID_COLUMN));
    leaf_fields.extend(table.fields.iter().cloned());
    IndexLayout {
        oids: table.oids,
        table_oids: table.oids,
        kind: IndexKind::Primary,
        name: ROW_ID_PRIMARY_NAME.to_string(),
        persistence: table.persistence,
        compress: table.primary_compress,
        primary_is_row_id: true,
        nulls_not_distinct: false,
        leaf_fields,
        non_leaf_fields: vec![row_id_field(table)],
        n_key_fields: 1,
        n_included_fields: 0,
        n_unique_fields: 1,
        primary_fields_attnums: Vec::new(),
        predicate: None,
        predicate_text: None,
        expressions: Vec::new(),
        duplicates: Vec::new(),
        create_xid: 0,
    }
}

fn primary(table: &Table, index: &TableIndex) -> Result<IndexLayout, LayoutError> {
    let mut n_key = index.nkeyfields;
    let mut n_included = count(index.fields.len())? - index.nkeyfields;
    let mut non_leaf_fields: Vec<TableIndexField> = Vec::with_capacity(index.fields.len());

    for (position, field) in index.fields.iter().enumerate() {
        if let AttNum::User(attnum) = field.attnum {
            if usize::from(attnum) >= table.fields.len() {
                return Err(LayoutError::UnknownColumn {
                    index: index.name.clone(),
                    attnum,
                    nfields: table.fields.len(),
                });
            }
        }
        if let Some(source) = non_leaf_fields.iter().position(|f| field.same_column(f)) {
            if position < usize::from(index.nkeyfields) {
                n_key -= 1;
            } else {
                n_included -= 1;
            }
            debug!(index = %index.name, position, source, "dropped duplicate primary key field");
            continue;
        }
        non_leaf_fields.push(*field);
    }

    Ok(IndexLayout {
        oids: index.oids,
        table_oids: table.oids,
        kind: IndexKind::Primary,
        name: index.name.clone(),
        persistence: table.persistence,
        compress: index.compress.or(table.primary_compress),
        primary_is_row_id: false,
        nulls_not_distinct: index.nulls_not_distinct,
        leaf_fields: table.fields.clone(),
        non_leaf_fields,
        n_key_fields: n_key,
        n_included_fields: n_included,
        n_unique_fields: n_key,
        primary_fields_attnums: Vec::new(),
        predicate: None,
        predicate_text: None,
        expressions: Vec::new(),
        duplicates: Vec::new(),
        create_xid: 0,
    })
}

/// Append the primary key columns (or the row id) unless already present,
/// returning their 1-based key-side positions.
fn append_primary(acc: &mut Accumulator, table: &Table) -> Result<Vec<u16>, LayoutError> {
    let pk = table.primary();
    let fields: Vec<TableIndexField> = match pk {
        Some(index) => index.key_fields().to_vec(),
        None => vec![row_id_field(table)],
    };
    let mut source = LeafSource::new(table, pk);
    let mut positions = Vec::with_capacity(fields.len());
    for (position, field) in fields.iter().enumerate() {
        match acc.find(field) {
            Some(found) => positions.push(count(found + 1)?),
            None => {
                let leaf = source.resolve(field, position)?;
                positions.push(acc.push(leaf, *field)?);
            }
        }
    }
    Ok(positions)
}

fn secondary_layout(table: &Table, index: &TableIndex) -> Result<IndexLayout, LayoutError> {
    let mut acc = Accumulator::default();
    let mut source = LeafSource::new(table, Some(index));
    let mut duplicates = Vec::new();
    let mut n_key = index.nkeyfields;
    let mut n_included = count(index.fields.len())? - index.nkeyfields;

    for (position, field) in index.fields.iter().enumerate() {
        if let Some(found) = acc.find(field) {
            if position < usize::from(index.nkeyfields) {
                n_key -= 1;
            } else {
                n_included -= 1;
            }
            debug!(index = %index.name, position, source = found, "field duplicated");
            duplicates.push(Duplicate {
                position: count(position)?,
                source: count(found)?,
            });
            continue;
        }
        let leaf = source.resolve(field, position)?;
        acc.push(leaf, *field)?;
    }
    if usize::from(index.nkeyfields) == index.fields.len() {
        n_key = count(acc.non_leaf.len())?;
    }

    let primary_fields_attnums = append_primary(&mut acc, table)?;
    let n_unique = match index.kind {
        IndexKind::Unique => n_key,
        _ => count(acc.non_leaf.len())?,
    };

    Ok(IndexLayout {
        oids: index.oids,
        table_oids: table.oids,
        kind: index.kind,
        name: index.name.clone(),
        persistence: table.persistence,
        compress: index.compress,
        primary_is_row_id: !table.has_primary(),
        nulls_not_distinct: index.nulls_not_distinct,
        leaf_fields: acc.leaf,
        non_leaf_fields: acc.non_leaf,
        n_key_fields: n_key,
        n_included_fields: n_included,
        n_unique_fields: n_unique,
        primary_fields_attnums,
        predicate: index.predicate.clone(),
        predicate_text: index
            .predicate
            .as_ref()
            .and(index.predicate_text.clone()),
        expressions: index.expressions.clone(),
        duplicates,
        create_xid: 0,
    })
}

fn large_value(table: &Table) -> Result<IndexLayout, LayoutError> {
    let mut acc = Accumulator::default();
    let primary_fields_attnums = append_primary(&mut acc, table)?;
    let n_key = count(acc.non_leaf.len())?;

    acc.push(
        builtin_field(INT2_OID, COLUMN_ID_COLUMN),
        system_field(INT2_BTREE_OPS),
    )?;
    let n_unique = acc.push(
        builtin_field(INT4_OID, CHUNK_NUM_COLUMN),
        system_field(INT4_BTREE_OPS),
    )?;
    acc.leaf.push(builtin_field(BYTEA_OID, DATA_COLUMN));

    Ok(IndexLayout {
        oids: table.large_value_oids,
        table_oids: table.oids,
        kind: IndexKind::LargeValue,
        name: LARGE_VALUE_NAME.to_string(),
        persistence: table.persistence,
        compress: table.large_value_compress,
        primary_is_row_id: !table.has_primary(),
        nulls_not_distinct: false,
        leaf_fields: acc.leaf,
        non_leaf_fields: acc.non_leaf,
        n_key_fields: n_key,
        n_included_fields: 0,
        n_unique_fields: n_unique,
        primary_fields_attnums,
        predicate: None,
        predicate_text: None,
        expressions: Vec::new(),
        duplicates: Vec::new(),
        create_xid: 0,
    })
}

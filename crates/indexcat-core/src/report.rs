//! Introspection over the catalog: descriptor listing, textual descriptions
//! and row counts of index trees.

use serde::Serialize;

use crate::builtin::TypeCatalog;
use crate::catalog::IndexCatalog;
use crate::error::{CatalogError, EncodingError, Result};
use crate::layout::IndexLayout;
use crate::schema::TableField;
use crate::tree::{OrderedMap, Snapshot};
use crate::types::{AttNum, IndexKind, Oid, RelOids};

/// One stored descriptor, with the table it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOidsRow {
    pub datoid: Oid,
    pub reloid: Oid,
    pub relnode: Oid,
    pub index_reloid: Oid,
    pub index_relnode: Oid,
    pub kind: String,
}

/// List every stored descriptor in key order.
pub fn index_oids<M: OrderedMap>(catalog: &IndexCatalog<M>) -> Result<Vec<IndexOidsRow>> {
    let mut rows = Vec::new();
    catalog.foreach_oids(|kind, oids, table_oids| {
        rows.push(IndexOidsRow {
            datoid: table_oids.datoid,
            reloid: table_oids.reloid,
            relnode: table_oids.relnode,
            index_reloid: oids.reloid,
            index_relnode: oids.relnode,
            kind: kind.name().to_string(),
        });
    })?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDescription {
    pub name: String,
    pub text: String,
}

/// Render the column table and key list of a stored descriptor.
///
/// `kind_name` is one of `toast`, `primary`, `unique`, `regular`.
pub fn describe_index<M: OrderedMap>(
    catalog: &IndexCatalog<M>,
    oids: RelOids,
    kind_name: &str,
    types: &dyn TypeCatalog,
) -> Result<IndexDescription> {
    let not_found = || CatalogError::NotFound {
        oids,
        kind: kind_name.to_string(),
    };
    let kind = IndexKind::from_name(kind_name).ok_or_else(not_found)?;
    let layout = catalog
        .get(oids, kind, Snapshot::NonDeleted)?
        .ok_or_else(not_found)?;

    let mut text = column_table(&layout.leaf_fields, types);
    text.push_str("\nKey fields: (");
    for (i, field) in layout.non_leaf_fields.iter().enumerate() {
        let leaf = key_leaf_field(&layout, i, field.attnum).ok_or_else(|| CatalogError::Corrupt {
            oids,
            kind,
            source: EncodingError::Inconsistent(format!("key field {i} has no leaf column")),
        })?;
        if i != 0 {
            text.push_str(", ");
        }
        text.push_str(&leaf.name);
        if i + 1 == usize::from(layout.n_unique_fields) {
            text.push(')');
        }
    }
    text.push('\n');

    Ok(IndexDescription {
        name: layout.name,
        text,
    })
}

fn key_leaf_field(layout: &IndexLayout, i: usize, attnum: AttNum) -> Option<&TableField> {
    if layout.kind != IndexKind::Primary {
        return layout.leaf_fields.get(i);
    }
    match attnum {
        AttNum::RowId => layout.leaf_fields.first(),
        AttNum::User(n) if layout.primary_is_row_id => layout.leaf_fields.get(usize::from(n) + 1),
        AttNum::User(n) => layout.leaf_fields.get(usize::from(n)),
        AttNum::System | AttNum::Expr => None,
    }
}

fn column_table(fields: &[TableField], types: &dyn TypeCatalog) -> String {
    const COLUMN: &str = "Column";
    const TYPE: &str = "Type";
    const COLLATION: &str = "Collation";

    let rows: Vec<(&str, String, String)> = fields
        .iter()
        .map(|f| {
            let collation = types
                .collation_name(f.collation)
                .unwrap_or_else(|| "(null)".to_string());
            (f.name.as_str(), types.type_name(f.type_oid, f.typmod), collation)
        })
        .collect();

    let wc = rows.iter().map(|r| r.0.len()).fold(COLUMN.len(), usize::max);
    let wt = rows.iter().map(|r| r.1.len()).fold(TYPE.len(), usize::max);
    let wl = rows.iter().map(|r| r.2.len()).fold(COLLATION.len(), usize::max);

    let mut out = format!(" {COLUMN:>wc$} | {TYPE:>wt$} | {COLLATION:>wl$} | Nullable | Dropped \n");
    for ((name, type_name, collation), field) in rows.iter().zip(fields) {
        out.push_str(&format!(
            " {name:>wc$} | {type_name:>wt$} | {collation:>wl$} | {:>8} | {:>7} \n",
            !field.not_null,
            field.dropped,
        ));
    }
    out
}

/// Record counts of an index tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub total: u64,
    pub dead: u64,
}

/// Count every physical record of `map`, and how many of them are dead.
pub fn index_rows(map: &impl OrderedMap) -> Result<RowCounts> {
    let mut counts = RowCounts::default();
    for tuple in map.iter_raw()? {
        counts.total += 1;
        if tuple.value.is_none() {
            counts.dead += 1;
        }
    }
    Ok(counts)
}

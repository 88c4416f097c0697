//! Runtime index descriptors realized from persisted layouts.
//!
//! [`realize`] turns an [`IndexLayout`] into an [`IndexDescriptor`]: leaf and
//! key-side tuple schemas, per-column comparators, compiled predicate and
//! expression evaluators, the scan tuple schema with elided duplicates
//! re-expanded, and the fixed-length prefix of each schema.

pub mod opclass;
pub mod tupdesc;

pub use opclass::{BuiltinOpclasses, Comparator, OpclassResolver};
pub use tupdesc::{FixedFormatSpec, TupleConstraints, TupleDesc};

use std::cmp::Ordering;
use std::fmt;

use tracing::debug;

use crate::catalog::TableSource;
use crate::error::{DescrError, ExprError, Result};
use crate::expr::{CompiledExpr, CompiledPredicate, Datum, ExpressionHost, HooksGuard};
use crate::layout::{Duplicate, IndexLayout};
use crate::schema::Table;
use crate::types::{AttNum, Compress, EXPR_ATTNUM, INVALID_OID, IndexKind, Oid, RelOids};

/// Host collaborators needed to realize a descriptor.
#[derive(Clone, Copy)]
pub struct RealizeContext<'a> {
    pub tables: &'a dyn TableSource,
    pub opclasses: &'a dyn OpclassResolver,
    pub expressions: &'a dyn ExpressionHost,
}

/// Maps a 0-based table column to its key-side position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttrNumberMap {
    pub key: i32,
    pub value: usize,
}

/// Runtime view of one key-side column.
#[derive(Clone)]
pub struct IndexField {
    /// 1-based column number in host tuples; `-1` for engine-private
    /// columns, `-8` for expression outputs.
    pub table_attnum: i32,
    pub opclass: Oid,
    pub collation: Oid,
    pub ascending: bool,
    pub nulls_first: bool,
    comparator: Option<Comparator>,
}

impl IndexField {
    pub fn has_comparator(&self) -> bool {
        self.comparator.is_some()
    }

    /// Compare two values of this column honouring direction and null
    /// placement. Columns without a comparator compare equal.
    pub fn compare(&self, a: &Datum, b: &Datum) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = self
                    .comparator
                    .as_ref()
                    .map_or(Ordering::Equal, |cmp| cmp(a, b));
                if self.ascending { ord } else { ord.reverse() }
            }
        }
    }
}

impl fmt::Debug for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexField")
            .field("table_attnum", &self.table_attnum)
            .field("opclass", &self.opclass)
            .field("collation", &self.collation)
            .field("ascending", &self.ascending)
            .field("nulls_first", &self.nulls_first)
            .field("comparator", &self.comparator.is_some())
            .finish()
    }
}

/// A realized index descriptor. Owns every compiled artefact.
pub struct IndexDescriptor {
    pub oids: RelOids,
    pub table_oids: RelOids,
    pub kind: IndexKind,
    pub name: String,
    pub primary_is_row_id: bool,
    pub unique: bool,
    pub nulls_not_distinct: bool,
    pub n_key_fields: usize,
    pub n_included_fields: usize,
    pub n_unique_fields: usize,
    pub primary_fields_attnums: Vec<u16>,
    pub compress: Compress,
    pub leaf_tupdesc: TupleDesc,
    pub non_leaf_tupdesc: TupleDesc,
    /// Shape of index-only scan tuples; absent for large-value and row id
    /// primary trees.
    pub scan_tupdesc: Option<TupleDesc>,
    pub fields: Vec<IndexField>,
    pub max_table_attnum: i32,
    pub leaf_spec: FixedFormatSpec,
    pub non_leaf_spec: FixedFormatSpec,
    /// Primary only: table columns sorted by number, with their key position.
    pub tbl_attnums: Vec<AttrNumberMap>,
    pub predicate_text: Option<String>,
    predicate: Option<CompiledPredicate>,
    expressions: Vec<CompiledExpr>,
}

impl IndexDescriptor {
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn n_expressions(&self) -> usize {
        self.expressions.len()
    }

    /// Whether `row` belongs in a partial index. Rows always qualify when
    /// there is no predicate.
    pub fn eval_predicate(&self, row: &[Datum]) -> std::result::Result<bool, ExprError> {
        match &self.predicate {
            Some(predicate) => predicate(row),
            None => Ok(true),
        }
    }

    /// Evaluate every index expression over `row`, in declaration order.
    pub fn eval_expressions(&self, row: &[Datum]) -> std::result::Result<Vec<Datum>, ExprError> {
        self.expressions.iter().map(|expr| expr(row)).collect()
    }

    /// Compare two key tuples column by column over the key fields.
    pub fn compare_keys(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        self.fields
            .iter()
            .take(self.n_key_fields)
            .zip(a.iter().zip(b))
            .map(|(field, (x, y))| field.compare(x, y))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Debug for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDescriptor")
            .field("oids", &self.oids)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("has_predicate", &self.predicate.is_some())
            .field("expressions", &self.expressions.len())
            .finish_non_exhaustive()
    }
}

fn shape_mismatch(layout: &IndexLayout, msg: String) -> DescrError {
    DescrError::ShapeMismatch(format!("{} ({}): {msg}", layout.oids, layout.kind))
}

fn non_leaf_tupdesc(layout: &IndexLayout, leaf: &TupleDesc) -> std::result::Result<TupleDesc, DescrError> {
    let n_non_leaf = layout.n_non_leaf_fields();
    match layout.kind {
        IndexKind::Primary if layout.primary_is_row_id => {
            if n_non_leaf != 1 || layout.non_leaf_fields[0].attnum != AttNum::RowId {
                return Err(shape_mismatch(
                    layout,
                    "row id primary must have a single row id key".to_string(),
                ));
            }
            Ok(leaf.prefix(1))
        }
        IndexKind::Primary => {
            let mut desc = TupleDesc::with_capacity(n_non_leaf);
            for field in &layout.non_leaf_fields {
                let attr = match field.attnum {
                    AttNum::User(attnum) => leaf.attr(usize::from(attnum)),
                    _ => None,
                };
                let attr = attr.ok_or_else(|| {
                    shape_mismatch(layout, format!("no leaf column for key {:?}", field.attnum))
                })?;
                desc.push(attr.clone());
            }
            Ok(desc)
        }
        IndexKind::Unique | IndexKind::Regular => {
            if leaf.natts() != n_non_leaf {
                return Err(shape_mismatch(
                    layout,
                    format!("{} leaf fields vs {n_non_leaf} key fields", leaf.natts()),
                ));
            }
            Ok(TupleDesc::from_fields(leaf.attrs()))
        }
        IndexKind::LargeValue => {
            if leaf.natts() < n_non_leaf {
                return Err(shape_mismatch(
                    layout,
                    format!("{} leaf fields vs {n_non_leaf} key fields", leaf.natts()),
                ));
            }
            Ok(leaf.prefix(n_non_leaf))
        }
    }
}

fn table_attnum(attnum: AttNum, primary_is_row_id: bool) -> i32 {
    match attnum {
        AttNum::RowId => 1,
        AttNum::System => -1,
        AttNum::Expr => i32::from(EXPR_ATTNUM),
        AttNum::User(n) => i32::from(n) + if primary_is_row_id { 2 } else { 1 },
    }
}

fn index_fields(
    layout: &IndexLayout,
    non_leaf: &TupleDesc,
    opclasses: &dyn OpclassResolver,
) -> std::result::Result<Vec<IndexField>, DescrError> {
    layout
        .non_leaf_fields
        .iter()
        .enumerate()
        .map(|(i, field)| -> std::result::Result<IndexField, DescrError> {
            let attr = non_leaf.attr(i);
            let mut collation = attr.map_or(INVALID_OID, |a| a.collation);
            if field.collation != INVALID_OID {
                collation = field.collation;
            }
            let ignored = attr.is_none_or(|a| a.dropped);
            let comparator = if ignored {
                None
            } else {
                Some(opclasses.resolve(layout.table_oids.datoid, field.opclass)?)
            };
            Ok(IndexField {
                table_attnum: table_attnum(field.attnum, layout.primary_is_row_id),
                opclass: field.opclass,
                collation,
                ascending: field.ordering == crate::types::SortOrder::Ascending,
                nulls_first: field.nulls_ordering.nulls_first(field.ordering),
                comparator,
            })
        })
        .collect()
}

/// Virtual tuple of an index-only scan: declared fields in declaration
/// order (duplicates included) followed by primary key columns that are not
/// already among them.
fn scan_tupdesc(
    layout: &IndexLayout,
    non_leaf: &TupleDesc,
) -> std::result::Result<TupleDesc, DescrError> {
    let pk_from = usize::from(layout.n_key_fields) + usize::from(layout.n_included_fields);
    let pk_nfields = if layout.primary_is_row_id {
        0
    } else {
        layout
            .primary_fields_attnums
            .iter()
            .filter(|&&p| usize::from(p) - 1 >= pk_from)
            .count()
    };
    let nfields = pk_from + layout.duplicates.len() + pk_nfields;

    let mut desc = TupleDesc::with_capacity(nfields);
    let mut duplicates = layout.duplicates.iter().peekable();
    let mut cursor = 0;
    for position in 0..nfields {
        let source = match duplicates.next_if(|d| usize::from(d.position) == position) {
            Some(&Duplicate { source, .. }) => usize::from(source),
            None => {
                cursor += 1;
                cursor - 1
            }
        };
        let attr = non_leaf.attr(source).ok_or_else(|| {
            shape_mismatch(
                layout,
                format!("scan position {position} has no key column {source}"),
            )
        })?;
        desc.push(attr.clone());
    }
    Ok(desc)
}

/// Realize the runtime descriptor of `layout`.
///
/// `table` is only consulted for primary layouts; when absent it is looked
/// up through `ctx.tables`.
pub fn realize(
    layout: &IndexLayout,
    table: Option<&Table>,
    ctx: &RealizeContext<'_>,
) -> Result<IndexDescriptor> {
    let mut leaf = TupleDesc::from_fields(&layout.leaf_fields);
    let mut primary_init_nfields = None;
    if layout.kind == IndexKind::Primary {
        match table.or_else(|| ctx.tables.get_table(layout.table_oids)) {
            Some(table) => {
                leaf.set_constraints(TupleConstraints::from_table(table));
                let shift = usize::from(layout.primary_is_row_id);
                primary_init_nfields = Some(table.primary_init_nfields() + shift);
            }
            None => debug!(table = %layout.table_oids, "realizing primary without table"),
        }
    }

    let non_leaf = non_leaf_tupdesc(layout, &leaf)?;
    let fields = index_fields(layout, &non_leaf, ctx.opclasses)?;
    let max_table_attnum = fields
        .iter()
        .map(|f| f.table_attnum)
        .max()
        .unwrap_or(0)
        .max(0);

    let (predicate, expressions) = {
        let _hooks = HooksGuard::install(ctx.expressions);
        let predicate = layout
            .predicate
            .as_ref()
            .map(|node| ctx.expressions.compile_predicate(node))
            .transpose()?;
        let expressions = layout
            .expressions
            .iter()
            .map(|node| ctx.expressions.compile_expr(node))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        (predicate, expressions)
    };

    let scan = match layout.kind {
        IndexKind::LargeValue => None,
        IndexKind::Primary if layout.primary_is_row_id => None,
        _ => Some(scan_tupdesc(layout, &non_leaf)?),
    };

    let mut tbl_attnums = Vec::new();
    if layout.kind == IndexKind::Primary {
        tbl_attnums = fields
            .iter()
            .enumerate()
            .map(|(value, f)| AttrNumberMap {
                key: f.table_attnum - 1,
                value,
            })
            .collect();
        tbl_attnums.sort();
    }

    let descr = IndexDescriptor {
        oids: layout.oids,
        table_oids: layout.table_oids,
        kind: layout.kind,
        name: layout.name.clone(),
        primary_is_row_id: layout.primary_is_row_id,
        unique: matches!(layout.kind, IndexKind::Primary | IndexKind::Unique),
        nulls_not_distinct: layout.nulls_not_distinct,
        n_key_fields: usize::from(layout.n_key_fields),
        n_included_fields: usize::from(layout.n_included_fields),
        n_unique_fields: usize::from(layout.n_unique_fields),
        primary_fields_attnums: layout.primary_fields_attnums.clone(),
        compress: layout.compress,
        leaf_spec: leaf.fixed_format(primary_init_nfields),
        non_leaf_spec: non_leaf.fixed_format(None),
        leaf_tupdesc: leaf,
        non_leaf_tupdesc: non_leaf,
        scan_tupdesc: scan,
        fields,
        max_table_attnum,
        tbl_attnums,
        predicate_text: layout.predicate_text.clone(),
        predicate,
        expressions,
    };
    debug!(
        index = %descr.oids,
        kind = %descr.kind,
        fields = descr.fields.len(),
        "realized index descriptor"
    );
    Ok(descr)
}

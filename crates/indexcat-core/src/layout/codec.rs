//! Byte image of an [`IndexLayout`].
//!
//! ## Layout (little-endian)
//!
//! ```text
//! table_oids         3 x u32        (first, so it can be peeked)
//! persistence        u8
//! compress           i16            (-1 = engine default)
//! primary_is_row_id  u8
//! nulls_not_distinct u8
//! create_xid         u64
//! name               u32 len + bytes
//! n_leaf .. n_primary 6 x u16
//! primary_fields_attnums [u16; n_primary]
//! leaf_fields[n_leaf]
//! non_leaf_fields[n_non_leaf]
//! predicate          node text
//! predicate_text     u32 size + NUL-terminated bytes, only with a predicate
//! expressions        u32 count + node texts
//! duplicates         u32 count + (u16 position, u16 source) pairs
//! ```
//!
//! Node texts are a `u32` size (0 when absent) followed by the
//! NUL-terminated [`ExprNode::to_text`] output. `oids` and `kind` are not
//! stored; they come from the chunk key.

use crate::encoding::key::ChunkKey;
use crate::encoding::{ByteReader, ByteWriter};
use crate::error::EncodingError;
use crate::expr::ExprNode;
use crate::schema::{TableField, TableIndexField};
use crate::types::{Align, AttNum, NullsOrder, Persistence, RelOids, SortOrder};

use super::{Duplicate, IndexLayout};

/// Smallest possible encoded leaf field: empty name plus fixed fields.
const MIN_LEAF_FIELD_SIZE: usize = 4 + 4 + 4 + 2 + 1 + 1 + 4 + 1;

fn put_oids(w: &mut ByteWriter, oids: RelOids) {
    w.put_u32(oids.datoid);
    w.put_u32(oids.reloid);
    w.put_u32(oids.relnode);
}

fn read_oids(r: &mut ByteReader<'_>, what: &'static str) -> Result<RelOids, EncodingError> {
    Ok(RelOids::new(r.u32(what)?, r.u32(what)?, r.u32(what)?))
}

fn put_node(w: &mut ByteWriter, node: Option<&ExprNode>) {
    w.put_cstring(node.map(ExprNode::to_text).as_deref());
}

fn read_node(r: &mut ByteReader<'_>, what: &'static str) -> Result<Option<ExprNode>, EncodingError> {
    match r.cstring(what)? {
        Some(text) => Ok(Some(ExprNode::from_text(&text)?)),
        None => Ok(None),
    }
}

fn put_leaf_field(w: &mut ByteWriter, field: &TableField) {
    w.put_str(&field.name);
    w.put_u32(field.type_oid);
    w.put_i32(field.typmod);
    w.put_i16(field.len);
    w.put_u8(field.align.code());
    w.put_bool(field.not_null);
    w.put_u32(field.collation);
    w.put_bool(field.dropped);
}

fn read_leaf_field(r: &mut ByteReader<'_>) -> Result<TableField, EncodingError> {
    Ok(TableField {
        name: r.str("leaf field name")?,
        type_oid: r.u32("leaf field type")?,
        typmod: r.i32("leaf field typmod")?,
        len: r.i16("leaf field length")?,
        align: Align::from_code(r.u8("leaf field alignment")?)?,
        not_null: r.bool("leaf field nullability")?,
        collation: r.u32("leaf field collation")?,
        dropped: r.bool("leaf field dropped flag")?,
    })
}

fn ordering_code(ordering: SortOrder) -> u8 {
    match ordering {
        SortOrder::Ascending => 0,
        SortOrder::Descending => 1,
    }
}

fn nulls_code(nulls: NullsOrder) -> u8 {
    match nulls {
        NullsOrder::Default => 0,
        NullsOrder::First => 1,
        NullsOrder::Last => 2,
    }
}

fn put_index_field(w: &mut ByteWriter, field: &TableIndexField) -> Result<(), EncodingError> {
    w.put_i16(field.attnum.to_raw()?);
    w.put_u32(field.opclass);
    w.put_u32(field.collation);
    w.put_u8(ordering_code(field.ordering));
    w.put_u8(nulls_code(field.nulls_ordering));
    Ok(())
}

fn put_count(w: &mut ByteWriter, what: &'static str, n: usize) -> Result<(), EncodingError> {
    let n = u16::try_from(n).map_err(|_| EncodingError::OutOfRange { what, value: n })?;
    w.put_u16(n);
    Ok(())
}

fn put_len(w: &mut ByteWriter, what: &'static str, n: usize) -> Result<(), EncodingError> {
    let n = u32::try_from(n).map_err(|_| EncodingError::OutOfRange { what, value: n })?;
    w.put_u32(n);
    Ok(())
}

fn read_index_field(r: &mut ByteReader<'_>) -> Result<TableIndexField, EncodingError> {
    let attnum = AttNum::from_raw(r.i16("key field attnum")?)?;
    let opclass = r.u32("key field opclass")?;
    let collation = r.u32("key field collation")?;
    let ordering = match r.u8("key field ordering")? {
        0 => SortOrder::Ascending,
        1 => SortOrder::Descending,
        tag => {
            return Err(EncodingError::InvalidTag {
                what: "ordering",
                tag: tag.into(),
            });
        }
    };
    let nulls_ordering = match r.u8("key field nulls ordering")? {
        0 => NullsOrder::Default,
        1 => NullsOrder::First,
        2 => NullsOrder::Last,
        tag => {
            return Err(EncodingError::InvalidTag {
                what: "nulls ordering",
                tag: tag.into(),
            });
        }
    };
    Ok(TableIndexField {
        attnum,
        opclass,
        collation,
        ordering,
        nulls_ordering,
    })
}

/// Serialize `layout` into its byte image. Fails only when a count or
/// attnum does not fit its encoded width.
pub fn encode_layout(layout: &IndexLayout) -> Result<Vec<u8>, EncodingError> {
    let mut w = ByteWriter::new();
    put_oids(&mut w, layout.table_oids);
    w.put_u8(layout.persistence.code());
    w.put_i16(layout.compress.map_or(-1, i16::from));
    w.put_bool(layout.primary_is_row_id);
    w.put_bool(layout.nulls_not_distinct);
    w.put_u64(layout.create_xid);
    w.put_str(&layout.name);

    put_count(&mut w, "leaf field count", layout.leaf_fields.len())?;
    put_count(&mut w, "key field count", layout.non_leaf_fields.len())?;
    w.put_u16(layout.n_key_fields);
    w.put_u16(layout.n_included_fields);
    w.put_u16(layout.n_unique_fields);
    put_count(&mut w, "primary field count", layout.primary_fields_attnums.len())?;
    for &position in &layout.primary_fields_attnums {
        w.put_u16(position);
    }

    for field in &layout.leaf_fields {
        put_leaf_field(&mut w, field);
    }
    for field in &layout.non_leaf_fields {
        put_index_field(&mut w, field)?;
    }

    put_node(&mut w, layout.predicate.as_ref());
    if layout.predicate.is_some() {
        w.put_cstring(layout.predicate_text.as_deref());
    }
    put_len(&mut w, "expression count", layout.expressions.len())?;
    for expr in &layout.expressions {
        put_node(&mut w, Some(expr));
    }
    put_len(&mut w, "duplicate count", layout.duplicates.len())?;
    for dup in &layout.duplicates {
        w.put_u16(dup.position);
        w.put_u16(dup.source);
    }
    Ok(w.into_bytes())
}

/// Rebuild a layout from its byte image. `oids` and `kind` are taken from
/// `key`. The whole input must be consumed and the result must satisfy
/// [`IndexLayout::check_invariants`].
pub fn decode_layout(key: &ChunkKey, data: &[u8]) -> Result<IndexLayout, EncodingError> {
    let mut r = ByteReader::new(data);
    let table_oids = read_oids(&mut r, "table oids")?;
    let persistence = Persistence::from_code(r.u8("persistence")?)?;
    let compress = match r.i16("compress")? {
        -1 => None,
        v => Some(u8::try_from(v).map_err(|_| EncodingError::InvalidTag {
            what: "compress",
            tag: v.into(),
        })?),
    };
    let primary_is_row_id = r.bool("primary_is_row_id")?;
    let nulls_not_distinct = r.bool("nulls_not_distinct")?;
    let create_xid = r.u64("create_xid")?;
    let name = r.str("name")?;

    let n_leaf = usize::from(r.u16("leaf field count")?);
    let n_non_leaf = usize::from(r.u16("key field count")?);
    let n_key_fields = r.u16("n_key_fields")?;
    let n_included_fields = r.u16("n_included_fields")?;
    let n_unique_fields = r.u16("n_unique_fields")?;
    let n_primary = usize::from(r.u16("primary field count")?);
    let primary_fields_attnums = (0..n_primary)
        .map(|_| r.u16("primary field position"))
        .collect::<Result<Vec<_>, _>>()?;

    if n_leaf * MIN_LEAF_FIELD_SIZE > r.remaining() {
        return Err(EncodingError::Truncated {
            what: "leaf fields",
            needed: n_leaf * MIN_LEAF_FIELD_SIZE,
            remaining: r.remaining(),
        });
    }
    let leaf_fields = (0..n_leaf)
        .map(|_| read_leaf_field(&mut r))
        .collect::<Result<Vec<_>, _>>()?;
    let non_leaf_fields = (0..n_non_leaf)
        .map(|_| read_index_field(&mut r))
        .collect::<Result<Vec<_>, _>>()?;

    let predicate = read_node(&mut r, "predicate")?;
    let predicate_text = match predicate {
        Some(_) => r.cstring("predicate text")?,
        None => None,
    };
    let n_expressions = r.u32("expression count")? as usize;
    let mut expressions = Vec::with_capacity(n_expressions.min(r.remaining() / 4));
    for _ in 0..n_expressions {
        let node = read_node(&mut r, "expression")?.ok_or_else(|| {
            EncodingError::Inconsistent("empty expression node".to_string())
        })?;
        expressions.push(node);
    }
    let n_duplicates = r.u32("duplicate count")? as usize;
    let mut duplicates = Vec::with_capacity(n_duplicates.min(r.remaining() / 4));
    for _ in 0..n_duplicates {
        duplicates.push(Duplicate {
            position: r.u16("duplicate position")?,
            source: r.u16("duplicate source")?,
        });
    }
    r.finish()?;

    let layout = IndexLayout {
        oids: key.oids,
        table_oids,
        kind: key.kind,
        name,
        persistence,
        compress,
        primary_is_row_id,
        nulls_not_distinct,
        leaf_fields,
        non_leaf_fields,
        n_key_fields,
        n_included_fields,
        n_unique_fields,
        primary_fields_attnums,
        predicate,
        predicate_text,
        expressions,
        duplicates,
        create_xid,
    };
    layout
        .check_invariants()
        .map_err(|e| EncodingError::Inconsistent(e.to_string()))?;
    Ok(layout)
}

/// Read only the `table_oids` prefix of an encoded layout.
pub fn peek_table_oids(data: &[u8]) -> Result<RelOids, EncodingError> {
    read_oids(&mut ByteReader::new(data), "table oids")
}

//! Built-in host types and btree opclasses known to the engine.
//!
//! Synthetic columns (row id, large-value column id / chunk number / data)
//! are described with these entries, and the reporting functions use them to
//! render type names.

use crate::schema::TableField;
use crate::types::{Align, INVALID_OID, Oid};

pub const BOOL_OID: Oid = 16;
pub const BYTEA_OID: Oid = 17;
pub const INT8_OID: Oid = 20;
pub const INT2_OID: Oid = 21;
pub const INT4_OID: Oid = 23;
pub const TEXT_OID: Oid = 25;
pub const OID_OID: Oid = 26;
pub const TID_OID: Oid = 27;
pub const FLOAT8_OID: Oid = 701;
pub const VARCHAR_OID: Oid = 1043;
pub const TIMESTAMP_OID: Oid = 1114;
pub const UUID_OID: Oid = 2950;

pub const BOOL_BTREE_OPS: Oid = 424;
pub const BYTEA_BTREE_OPS: Oid = 428;
pub const INT8_BTREE_OPS: Oid = 1980;
pub const INT2_BTREE_OPS: Oid = 1979;
pub const INT4_BTREE_OPS: Oid = 1978;
pub const TEXT_BTREE_OPS: Oid = 3126;
pub const OID_BTREE_OPS: Oid = 1989;
pub const TID_BTREE_OPS: Oid = 2789;
pub const FLOAT8_BTREE_OPS: Oid = 3123;
pub const VARCHAR_BTREE_OPS: Oid = 3128;
pub const TIMESTAMP_BTREE_OPS: Oid = 3152;
pub const UUID_BTREE_OPS: Oid = 2968;

pub const DEFAULT_COLLATION_OID: Oid = 100;
pub const C_COLLATION_OID: Oid = 950;

/// Typmod value meaning "no modifier".
pub const NO_TYPMOD: i32 = -1;

/// Static description of a built-in type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinType {
    pub oid: Oid,
    pub name: &'static str,
    /// Fixed length in bytes, or -1 for variable length.
    pub len: i16,
    pub align: Align,
    /// Default collation, `INVALID_OID` for non-collatable types.
    pub collation: Oid,
    pub btree_opclass: Oid,
}

const BUILTIN_TYPES: &[BuiltinType] = &[
    BuiltinType {
        oid: BOOL_OID,
        name: "boolean",
        len: 1,
        align: Align::Char,
        collation: INVALID_OID,
        btree_opclass: BOOL_BTREE_OPS,
    },
    BuiltinType {
        oid: BYTEA_OID,
        name: "bytea",
        len: -1,
        align: Align::Int,
        collation: INVALID_OID,
        btree_opclass: BYTEA_BTREE_OPS,
    },
    BuiltinType {
        oid: INT8_OID,
        name: "bigint",
        len: 8,
        align: Align::Double,
        collation: INVALID_OID,
        btree_opclass: INT8_BTREE_OPS,
    },
    BuiltinType {
        oid: INT2_OID,
        name: "smallint",
        len: 2,
        align: Align::Short,
        collation: INVALID_OID,
        btree_opclass: INT2_BTREE_OPS,
    },
    BuiltinType {
        oid: INT4_OID,
        name: "integer",
        len: 4,
        align: Align::Int,
        collation: INVALID_OID,
        btree_opclass: INT4_BTREE_OPS,
    },
    BuiltinType {
        oid: TEXT_OID,
        name: "text",
        len: -1,
        align: Align::Int,
        collation: DEFAULT_COLLATION_OID,
        btree_opclass: TEXT_BTREE_OPS,
    },
    BuiltinType {
        oid: OID_OID,
        name: "oid",
        len: 4,
        align: Align::Int,
        collation: INVALID_OID,
        btree_opclass: OID_BTREE_OPS,
    },
    BuiltinType {
        oid: TID_OID,
        name: "tid",
        len: 6,
        align: Align::Short,
        collation: INVALID_OID,
        btree_opclass: TID_BTREE_OPS,
    },
    BuiltinType {
        oid: FLOAT8_OID,
        name: "double precision",
        len: 8,
        align: Align::Double,
        collation: INVALID_OID,
        btree_opclass: FLOAT8_BTREE_OPS,
    },
    BuiltinType {
        oid: VARCHAR_OID,
        name: "character varying",
        len: -1,
        align: Align::Int,
        collation: DEFAULT_COLLATION_OID,
        btree_opclass: VARCHAR_BTREE_OPS,
    },
    BuiltinType {
        oid: TIMESTAMP_OID,
        name: "timestamp without time zone",
        len: 8,
        align: Align::Double,
        collation: INVALID_OID,
        btree_opclass: TIMESTAMP_BTREE_OPS,
    },
    BuiltinType {
        oid: UUID_OID,
        name: "uuid",
        len: 16,
        align: Align::Char,
        collation: INVALID_OID,
        btree_opclass: UUID_BTREE_OPS,
    },
];

/// Look up a built-in type by oid.
pub fn builtin_type(oid: Oid) -> Option<&'static BuiltinType> {
    BUILTIN_TYPES.iter().find(|t| t.oid == oid)
}

/// Look up the built-in type whose default btree opclass is `opclass`.
pub fn type_for_opclass(opclass: Oid) -> Option<&'static BuiltinType> {
    BUILTIN_TYPES.iter().find(|t| t.btree_opclass == opclass)
}

/// Build a leaf field for a synthetic column of a built-in type.
///
/// Unknown types yield a variable-length, int-aligned field.
pub fn builtin_field(type_oid: Oid, name: &str) -> TableField {
    let (len, align, collation) = match builtin_type(type_oid) {
        Some(t) => (t.len, t.align, t.collation),
        None => (-1, Align::Int, INVALID_OID),
    };
    TableField {
        name: name.to_string(),
        type_oid,
        typmod: NO_TYPMOD,
        len,
        align,
        not_null: true,
        collation,
        dropped: false,
    }
}

/// Host catalog of type and collation names, used when describing indexes.
pub trait TypeCatalog {
    fn type_name(&self, type_oid: Oid, typmod: i32) -> String;
    fn collation_name(&self, collation: Oid) -> Option<String>;
}

/// [`TypeCatalog`] over the built-in type table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTypes;

impl TypeCatalog for BuiltinTypes {
    fn type_name(&self, type_oid: Oid, typmod: i32) -> String {
        match builtin_type(type_oid) {
            Some(t) if t.oid == VARCHAR_OID && typmod >= 4 => {
                // Varlena typmods include the 4-byte header.
                format!("{}({})", t.name, typmod - 4)
            }
            Some(t) => t.name.to_string(),
            None => format!("oid:{type_oid}"),
        }
    }

    fn collation_name(&self, collation: Oid) -> Option<String> {
        match collation {
            DEFAULT_COLLATION_OID => Some("default".to_string()),
            C_COLLATION_OID => Some("C".to_string()),
            INVALID_OID => None,
            other => Some(format!("oid:{other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_field_shapes() {
        let tid = builtin_field(TID_OID, "rowid");
        assert_eq!(tid.len, 6);
        assert_eq!(tid.align, Align::Short);
        assert_eq!(tid.name, "rowid");

        let data = builtin_field(BYTEA_OID, "data");
        assert_eq!(data.len, -1);
        assert_eq!(data.collation, INVALID_OID);
    }

    #[test]
    fn test_type_for_opclass() {
        assert_eq!(type_for_opclass(INT2_BTREE_OPS).unwrap().oid, INT2_OID);
        assert_eq!(type_for_opclass(INT4_BTREE_OPS).unwrap().oid, INT4_OID);
        assert!(type_for_opclass(1).is_none());
    }

    #[test]
    fn test_type_names() {
        let types = BuiltinTypes;
        assert_eq!(types.type_name(INT4_OID, NO_TYPMOD), "integer");
        assert_eq!(types.type_name(VARCHAR_OID, 36), "character varying(32)");
        assert_eq!(types.type_name(99999, NO_TYPMOD), "oid:99999");
        assert_eq!(types.collation_name(DEFAULT_COLLATION_OID).unwrap(), "default");
        assert!(types.collation_name(INVALID_OID).is_none());
    }
}

//! End-to-end catalog scenarios: layout derivation for each tree shape and
//! a multi-chunk catalog round trip.

use std::collections::HashMap;

use indexcat_core::builtin::{
    BYTEA_OID, BuiltinTypes, INT2_OID, INT4_BTREE_OPS, INT4_OID, TEXT_BTREE_OPS, TEXT_OID,
};
use indexcat_core::catalog::IndexCatalog;
use indexcat_core::config::CatalogConfig;
use indexcat_core::descr::{BuiltinOpclasses, RealizeContext};
use indexcat_core::expr::BasicExprHost;
use indexcat_core::layout::{IndexLayout, make_layout};
use indexcat_core::report::{describe_index, index_oids, index_rows};
use indexcat_core::schema::{Table, TableField, TableIndex, TableIndexField};
use indexcat_core::tree::{InMemoryOrderedMap, Snapshot};
use indexcat_core::types::{AttNum, IndexKind, IndexSlot, RelOids};

fn user(attnum: u16, opclass: u32) -> TableIndexField {
    TableIndexField::new(AttNum::User(attnum), opclass)
}

fn id_val_extra(reloid: u32) -> Table {
    Table::new(
        RelOids::new(1, reloid, reloid),
        RelOids::new(1, reloid + 1, reloid + 1),
        vec![
            TableField::new("id", INT4_OID).not_null(),
            TableField::new("val", TEXT_OID),
            TableField::new("extra", INT4_OID),
        ],
    )
}

fn with_primary(table: Table) -> Table {
    let oids = RelOids::new(table.oids.datoid, table.oids.reloid + 2, table.oids.relnode + 2);
    table.with_index(TableIndex::new(
        oids,
        IndexKind::Primary,
        "t_pkey",
        vec![user(0, INT4_BTREE_OPS)],
    ))
}

fn secondary(table: &Table, kind: IndexKind, name: &str, fields: Vec<TableIndexField>) -> TableIndex {
    let n = table.indices.len() as u32;
    TableIndex::new(
        RelOids::new(1, table.oids.reloid + 3 + n, table.oids.relnode + 3 + n),
        kind,
        name,
        fields,
    )
}

fn attnums(layout: &IndexLayout) -> Vec<AttNum> {
    layout.non_leaf_fields.iter().map(|f| f.attnum).collect()
}

#[test]
fn test_row_id_primary_without_secondaries() {
    let table = Table::new(
        RelOids::new(1, 100, 100),
        RelOids::new(1, 101, 101),
        vec![
            TableField::new("id", INT4_OID),
            TableField::new("val", TEXT_OID),
        ],
    );
    let layout = make_layout(&table, IndexSlot::PRIMARY).unwrap();
    assert_eq!(layout.kind, IndexKind::Primary);
    assert!(layout.primary_is_row_id);
    assert_eq!(layout.n_non_leaf_fields(), 1);
    assert_eq!(layout.non_leaf_fields[0].attnum, AttNum::RowId);
    let names: Vec<&str> = layout.leaf_fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["rowid", "id", "val"]);
}

#[test]
fn test_primary_and_unique_secondary() {
    let table = with_primary(id_val_extra(100));
    let index = secondary(&table, IndexKind::Unique, "val_key", vec![user(1, TEXT_BTREE_OPS)]);
    let table = table.with_index(index);

    let layout = make_layout(&table, IndexSlot(1)).unwrap();
    assert_eq!(attnums(&layout), [AttNum::User(1), AttNum::User(0)]);
    assert_eq!(layout.n_key_fields, 1);
    assert_eq!(layout.n_unique_fields, 1);
    assert_eq!(layout.n_primary_fields(), 1);
    assert_eq!(layout.primary_fields_attnums, [2]);
}

#[test]
fn test_secondary_reusing_primary_column() {
    let table = with_primary(id_val_extra(100));
    let index = secondary(
        &table,
        IndexKind::Unique,
        "id_val_key",
        vec![user(0, INT4_BTREE_OPS), user(1, TEXT_BTREE_OPS)],
    );
    let table = table.with_index(index);

    let layout = make_layout(&table, IndexSlot(1)).unwrap();
    // The primary key column is already the first key column; nothing is
    // appended and the declared key count stands.
    assert_eq!(attnums(&layout), [AttNum::User(0), AttNum::User(1)]);
    assert_eq!(layout.n_key_fields, 2);
    assert!(layout.duplicates.is_empty());
    assert_eq!(layout.primary_fields_attnums, [1]);
}

#[test]
fn test_secondary_with_included_primary_column() {
    let table = with_primary(id_val_extra(100));
    let index = secondary(
        &table,
        IndexKind::Regular,
        "val_cover",
        vec![
            user(1, TEXT_BTREE_OPS),
            user(0, INT4_BTREE_OPS),
            user(2, INT4_BTREE_OPS),
        ],
    )
    .with_included(2);
    let table = table.with_index(index);

    let layout = make_layout(&table, IndexSlot(1)).unwrap();
    assert_eq!(
        attnums(&layout),
        [AttNum::User(1), AttNum::User(0), AttNum::User(2)]
    );
    assert_eq!(layout.n_key_fields, 1);
    assert_eq!(layout.n_included_fields, 2);
    // The included id is reused as the primary key column.
    assert_eq!(layout.primary_fields_attnums, [2]);
    assert_eq!(
        layout.non_leaf_fields[usize::from(layout.primary_fields_attnums[0]) - 1].attnum,
        AttNum::User(0)
    );
}

#[test]
fn test_large_value_layout() {
    let table = with_primary(id_val_extra(100));
    let layout = make_layout(&table, IndexSlot::LARGE_VALUE).unwrap();
    assert_eq!(layout.name, "toast");
    assert_eq!(layout.kind, IndexKind::LargeValue);
    assert_eq!(
        attnums(&layout),
        [AttNum::User(0), AttNum::System, AttNum::System]
    );
    let types: Vec<u32> = layout.leaf_fields.iter().map(|f| f.type_oid).collect();
    assert_eq!(types, [INT4_OID, INT2_OID, INT4_OID, BYTEA_OID]);
    assert_eq!(layout.n_unique_fields, 3);
    assert_eq!(layout.n_leaf_fields(), layout.n_non_leaf_fields() + 1);
}

fn wide_table(reloid: u32) -> Table {
    let mut table = with_primary(id_val_extra(reloid));
    for i in 0..8 {
        table.fields.push(TableField::new(&format!("padding_column_{i}"), TEXT_OID));
    }
    table
}

#[test]
fn test_catalog_round_trip_and_iteration() {
    let config = CatalogConfig {
        max_tuple_size: 128,
        max_align: 8,
    };
    let mut catalog = IndexCatalog::new(InMemoryOrderedMap::new(), &config).unwrap();
    let tables = [wide_table(100), wide_table(200), wide_table(300)];
    for table in &tables {
        assert!(catalog.add(table, IndexSlot::PRIMARY, 10, 1).unwrap());
    }
    let per_layout = catalog.map().key_count() / tables.len();
    assert!(per_layout > 1, "each layout should span several chunks");

    let ids: Vec<RelOids> = tables.iter().map(|t| t.indices[0].oids).collect();
    let mut seen = Vec::new();
    catalog
        .foreach_oids(|kind, oids, _| seen.push((oids, kind)))
        .unwrap();
    assert_eq!(
        seen,
        ids.iter().map(|&oids| (oids, IndexKind::Primary)).collect::<Vec<_>>()
    );

    assert!(catalog.delete(&tables[1], IndexSlot::PRIMARY, 11, 2).unwrap());
    seen.clear();
    catalog
        .foreach_oids(|kind, oids, _| seen.push((oids, kind)))
        .unwrap();
    assert_eq!(seen, [(ids[0], IndexKind::Primary), (ids[2], IndexKind::Primary)]);

    assert!(catalog
        .get(ids[1], IndexKind::Primary, Snapshot::NonDeleted)
        .unwrap()
        .is_none());
    // Still visible to a snapshot taken before the delete.
    assert!(catalog
        .get(ids[1], IndexKind::Primary, Snapshot::AsOf(1))
        .unwrap()
        .is_some());

    let mut expected = make_layout(&tables[0], IndexSlot::PRIMARY).unwrap();
    expected.create_xid = 10;
    assert_eq!(
        catalog
            .get(ids[0], IndexKind::Primary, Snapshot::NonDeleted)
            .unwrap(),
        Some(expected)
    );

    let counts = index_rows(catalog.map()).unwrap();
    assert_eq!(counts.total as usize, per_layout * tables.len());
    assert_eq!(counts.dead as usize, per_layout);
}

#[test]
fn test_catalog_to_descriptor_and_reports() {
    let table = with_primary(id_val_extra(100));
    let index = secondary(
        &table,
        IndexKind::Regular,
        "val_extra",
        vec![user(1, TEXT_BTREE_OPS), user(2, INT4_BTREE_OPS)],
    );
    let table = table.with_index(index);
    let mut catalog = IndexCatalog::new(InMemoryOrderedMap::new(), &CatalogConfig::default()).unwrap();
    assert_eq!(catalog.add_table(&table, 1, 1).unwrap(), 3);

    let rows = index_oids(&catalog).unwrap();
    let kinds: Vec<&str> = rows.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(kinds, ["toast", "primary", "regular"]);

    let description = describe_index(&catalog, table.indices[1].oids, "regular", &BuiltinTypes).unwrap();
    assert!(description.text.ends_with("Key fields: (val, extra, id)\n"));

    let tables = HashMap::from([(table.oids, table.clone())]);
    let opclasses = BuiltinOpclasses::new();
    let ctx = RealizeContext {
        tables: &tables,
        opclasses: &opclasses,
        expressions: &BasicExprHost,
    };
    let descr = catalog
        .realize(table.indices[1].oids, IndexKind::Regular, Snapshot::NonDeleted, &ctx)
        .unwrap()
        .unwrap();
    let table_attnums: Vec<i32> = descr.fields.iter().map(|f| f.table_attnum).collect();
    assert_eq!(table_attnums, [2, 3, 1]);
    assert_eq!(descr.max_table_attnum, 3);

    let primary = catalog
        .realize(table.indices[0].oids, IndexKind::Primary, Snapshot::NonDeleted, &ctx)
        .unwrap()
        .unwrap();
    assert!(primary.leaf_tupdesc.constraints().unwrap().has_not_null);
    assert_eq!(primary.leaf_spec.natts, 1);
}

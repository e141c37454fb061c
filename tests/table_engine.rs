//! End-to-end tests for the table engine: DDL, DML, index-backed scans and
//! durability across reopen.

use std::path::Path;

use rand::seq::SliceRandom;
use tempfile::tempdir;

use strata::datum::{AttrType, CompOp, Value};
use strata::record::RowId;
use strata::table::{
    table_data_path, table_meta_path, AttrInfo, CompositeFilter, Condition, Table, TableError,
};

fn create_people(dir: &Path) -> Table {
    let attrs = [
        AttrInfo::new("id", AttrType::Int, 4, false),
        AttrInfo::new("name", AttrType::Chars, 8, true),
    ];
    Table::create(&table_meta_path(dir, "t"), "t", dir, &attrs).unwrap()
}

fn filter(table: &Table, conditions: &[Condition]) -> CompositeFilter {
    CompositeFilter::new(table.table_meta(), conditions).unwrap()
}

/// Collects `(RowId, id column)` for every row matching the conditions.
fn scan_ids(table: &Table, conditions: &[Condition]) -> Vec<(RowId, i32)> {
    let compiled;
    let compiled_ref = if conditions.is_empty() {
        None
    } else {
        compiled = filter(table, conditions);
        Some(&compiled)
    };
    let id_offset = table.table_meta().field("id").unwrap().offset;

    let mut out = Vec::new();
    table
        .scan_record(None, compiled_ref, -1, |rid, row| {
            let id = i32::from_le_bytes([
                row[id_offset],
                row[id_offset + 1],
                row[id_offset + 2],
                row[id_offset + 3],
            ]);
            out.push((rid, id));
            Ok(())
        })
        .unwrap();
    out
}

#[test]
fn full_scan_preserves_insertion_order_and_null_flags() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    table
        .insert_record(None, &[Value::int(1), Value::chars("abc")])
        .unwrap();
    table
        .insert_record(None, &[Value::int(2), Value::null()])
        .unwrap();
    table
        .insert_record(None, &[Value::int(3), Value::chars("xyz")])
        .unwrap();

    let meta = table.table_meta();
    let name_flag = meta.record_size() + 1;

    let mut rows = Vec::new();
    table
        .scan_record(None, None, -1, |rid, row| {
            rows.push((rid, row.to_vec()));
            Ok(())
        })
        .unwrap();

    assert_eq!(rows.len(), 3);
    // (page, slot) order matches insertion order
    assert_eq!(rows[0].0, RowId::new(1, 0));
    assert_eq!(rows[1].0, RowId::new(1, 1));
    assert_eq!(rows[2].0, RowId::new(1, 2));

    assert_eq!(rows[0].1[name_flag], 0);
    assert_eq!(rows[1].1[name_flag], 1);
    assert_eq!(rows[2].1[name_flag], 0);

    // The null slot holds the CHARS sentinel while the flag is set
    let name_offset = meta.field("name").unwrap().offset;
    assert_eq!(&rows[1].1[name_offset..name_offset + 4], b"NULL");
}

#[test]
fn index_range_scan_after_delete() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    for (id, name) in [(1, "abc"), (2, "def"), (3, "xyz")] {
        table
            .insert_record(None, &[Value::int(id), Value::chars(name)])
            .unwrap();
    }
    table.create_index(None, "i_id", "id").unwrap();

    let deleted = table
        .delete_record(None, &[Condition::attr_value("id", CompOp::Eq, Value::int(2))])
        .unwrap();
    assert_eq!(deleted, 1);

    let conditions = [
        Condition::attr_value("id", CompOp::Ge, Value::int(1)),
        Condition::attr_value("id", CompOp::Le, Value::int(3)),
    ];
    let hits = scan_ids(&table, &conditions);
    let ids: Vec<i32> = hits.iter().map(|(_, id)| *id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn duplicate_table_creation_leaves_catalog_untouched() {
    let dir = tempdir().unwrap();
    let _table = create_people(dir.path());

    let meta_path = table_meta_path(dir.path(), "t");
    let before = std::fs::metadata(&meta_path).unwrap();
    let before_mtime = before.modified().unwrap();

    let attrs = [AttrInfo::new("other", AttrType::Int, 4, false)];
    let result = Table::create(&meta_path, "t", dir.path(), &attrs);
    assert!(matches!(result, Err(TableError::TableExists(name)) if name == "t"));

    let after = std::fs::metadata(&meta_path).unwrap();
    assert_eq!(after.len(), before.len());
    assert_eq!(after.modified().unwrap(), before_mtime);
}

#[test]
fn rejected_insert_touches_neither_heap_nor_index() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    table
        .insert_record(None, &[Value::int(1), Value::chars("ok")])
        .unwrap();
    table.create_index(None, "i_id", "id").unwrap();

    // 9 bytes into CHAR(8)
    let result = table.insert_record(None, &[Value::int(3), Value::chars("abcdefghi")]);
    assert!(matches!(result, Err(TableError::FieldMissing(_))));

    assert_eq!(scan_ids(&table, &[]).len(), 1);
    let hits = scan_ids(
        &table,
        &[Condition::attr_value("id", CompOp::Eq, Value::int(3))],
    );
    assert!(hits.is_empty());
}

#[test]
fn update_moves_row_between_index_keys() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    table
        .insert_record(None, &[Value::int(1), Value::chars("abc")])
        .unwrap();
    table
        .insert_record(None, &[Value::int(2), Value::chars("def")])
        .unwrap();
    table.create_index(None, "i_name", "name").unwrap();

    let updated = table
        .update_record(
            None,
            "name",
            &Value::chars("NEW"),
            &[Condition::attr_value("id", CompOp::Eq, Value::int(1))],
        )
        .unwrap();
    assert_eq!(updated, 1);

    let hits = scan_ids(
        &table,
        &[Condition::attr_value(
            "name",
            CompOp::Eq,
            Value::chars("NEW"),
        )],
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1, 1);

    let hits = scan_ids(
        &table,
        &[Condition::attr_value(
            "name",
            CompOp::Eq,
            Value::chars("abc"),
        )],
    );
    assert!(hits.is_empty());
}

#[test]
fn bulk_load_create_index_then_reopen() {
    let dir = tempdir().unwrap();
    let attrs = [
        AttrInfo::new("id", AttrType::Int, 4, false),
        AttrInfo::new("grp", AttrType::Int, 4, false),
        AttrInfo::new("name", AttrType::Chars, 8, true),
        AttrInfo::new("score", AttrType::Float, 4, true),
    ];
    let n = 10_000i32;

    {
        let mut table =
            Table::create(&table_meta_path(dir.path(), "big"), "big", dir.path(), &attrs).unwrap();

        let mut ids: Vec<i32> = (0..n).collect();
        ids.shuffle(&mut rand::thread_rng());
        for id in &ids {
            table
                .insert_record(
                    None,
                    &[
                        Value::int(*id),
                        Value::int(id % 7),
                        Value::chars("row"),
                        Value::float(*id as f32 / 2.0),
                    ],
                )
                .unwrap();
        }
        table.create_index(None, "i_id", "id").unwrap();
        table.sync().unwrap();
    }

    let table = Table::open(&table_meta_path(dir.path(), "big"), dir.path()).unwrap();
    assert_eq!(table.index_names(), vec!["i_id"]);

    for id in 0..n {
        let hits = scan_ids(
            &table,
            &[Condition::attr_value("id", CompOp::Eq, Value::int(id))],
        );
        assert_eq!(hits.len(), 1, "id {} should match exactly one row", id);
        assert_eq!(hits[0].1, id);
    }
}

#[test]
fn index_scan_equals_full_scan_results() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    for id in 0..200 {
        table
            .insert_record(None, &[Value::int(id % 50), Value::chars("x")])
            .unwrap();
    }

    let conditions = [Condition::attr_value("id", CompOp::Eq, Value::int(7))];
    let before: Vec<i32> = scan_ids(&table, &conditions).iter().map(|h| h.1).collect();
    assert_eq!(before.len(), 4);

    table.create_index(None, "i_id", "id").unwrap();
    let after: Vec<i32> = scan_ids(&table, &conditions).iter().map(|h| h.1).collect();
    assert_eq!(before, after);
}

#[test]
fn delete_by_predicate_removes_only_matches() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    for id in 0..20 {
        table
            .insert_record(None, &[Value::int(id), Value::chars("x")])
            .unwrap();
    }
    table.create_index(None, "i_id", "id").unwrap();

    let conditions = [Condition::attr_value("id", CompOp::Lt, Value::int(10))];
    let deleted = table.delete_record(None, &conditions).unwrap();
    assert_eq!(deleted, 10);

    assert!(scan_ids(&table, &conditions).is_empty());
    let rest = scan_ids(&table, &[]);
    assert_eq!(rest.len(), 10);
    assert!(rest.iter().all(|(_, id)| *id >= 10));
}

#[test]
fn eq_probe_for_absent_value_is_empty() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    for id in [1, 2, 4, 5] {
        table
            .insert_record(None, &[Value::int(id), Value::chars("x")])
            .unwrap();
    }
    table.create_index(None, "i_id", "id").unwrap();

    let hits = scan_ids(
        &table,
        &[Condition::attr_value("id", CompOp::Eq, Value::int(3))],
    );
    assert!(hits.is_empty());
}

#[test]
fn reader_error_terminates_scan_early() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());
    for id in 0..5 {
        table
            .insert_record(None, &[Value::int(id), Value::chars("x")])
            .unwrap();
    }

    let mut calls = 0;
    let result = table.scan_record(None, None, -1, |_, _| {
        calls += 1;
        Err(TableError::InvalidArgument("stop".into()))
    });
    assert!(matches!(result, Err(TableError::InvalidArgument(_))));
    assert_eq!(calls, 1);
}

#[test]
fn sync_is_idempotent_and_byte_stable() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    for id in 0..100 {
        table
            .insert_record(None, &[Value::int(id), Value::chars("x")])
            .unwrap();
    }
    table.create_index(None, "i_id", "id").unwrap();

    table.sync().unwrap();
    let data_path = table_data_path(dir.path(), "t");
    let index_path = dir.path().join("t_i_id.bplustree");
    let data_before = std::fs::read(&data_path).unwrap();
    let index_before = std::fs::read(&index_path).unwrap();

    table.sync().unwrap();
    assert_eq!(std::fs::read(&data_path).unwrap(), data_before);
    assert_eq!(std::fs::read(&index_path).unwrap(), index_before);
}

#[test]
fn null_rows_are_invisible_to_comparison_scans() {
    let dir = tempdir().unwrap();
    let mut table = create_people(dir.path());

    table
        .insert_record(None, &[Value::int(1), Value::chars("a")])
        .unwrap();
    table
        .insert_record(None, &[Value::int(2), Value::null()])
        .unwrap();
    table.create_index(None, "i_name", "name").unwrap();

    // Comparison never matches the null row, with or without the index
    let hits = scan_ids(
        &table,
        &[Condition::attr_value(
            "name",
            CompOp::Ge,
            Value::chars(""),
        )],
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1, 1);

    // IS NULL finds it through the full-scan path
    let hits = scan_ids(
        &table,
        &[Condition::attr_value("name", CompOp::IsNull, Value::null())],
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1, 2);
}

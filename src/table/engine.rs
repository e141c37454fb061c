//! Table engine: DML orchestration across the record file and every
//! attached index.
//!
//! The outermost DML operation is the unit of atomicity. Index entries are
//! written after the heap mutation on insert/update and before it on
//! delete; on any error after a heap mutation the engine undoes the earlier
//! steps in reverse order, logs compensation failures, and returns the
//! original error.
//!
//! A table handle is single-threaded: a higher layer serializes mutating
//! calls on the same table.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::error::TableError;
use super::filter::CompositeFilter;
use super::filter::Condition;
use super::meta::{
    index_file_path, table_data_path, AttrInfo, FieldMeta, IndexMeta, TableMeta, SYS_FIELD_NUM,
};
use crate::datum::{write_null_sentinel, AttrType, CompOp, Value};
use crate::index::{BPlusTree, IndexError, IndexScanner};
use crate::record::{RecordFile, RowId};
use crate::storage::FileStorage;
use crate::tx::Transaction;

/// A handle to one table: schema, heap file, and attached indexes.
pub struct Table {
    base_dir: PathBuf,
    meta_path: PathBuf,
    meta: TableMeta,
    data: RecordFile<FileStorage>,
    indexes: Vec<BPlusTree<FileStorage>>,
}

impl Table {
    /// Creates a new table: catalog file at `path`, heap file under
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::TableExists`] if the catalog file is already
    /// present; the preexisting file is left untouched.
    pub fn create(
        path: &Path,
        name: &str,
        base_dir: &Path,
        attributes: &[AttrInfo],
    ) -> Result<Table, TableError> {
        let meta = TableMeta::new(name, attributes)?;
        meta.save_create(path)?;

        let data = RecordFile::create(table_data_path(base_dir, name))?;
        debug!(table = name, "created table");

        Ok(Table {
            base_dir: base_dir.to_path_buf(),
            meta_path: path.to_path_buf(),
            meta,
            data,
            indexes: Vec::new(),
        })
    }

    /// Opens an existing table from its catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::CorruptCatalog`] if the catalog is unreadable
    /// or an index references a field that no longer exists.
    pub fn open(meta_file: &Path, base_dir: &Path) -> Result<Table, TableError> {
        let meta = TableMeta::load(meta_file)?;
        let data = RecordFile::open(table_data_path(base_dir, meta.name()))?;

        let mut indexes = Vec::with_capacity(meta.indexes().len());
        for index_meta in meta.indexes() {
            let field = meta.field(&index_meta.field_name).ok_or_else(|| {
                TableError::CorruptCatalog(format!(
                    "index {} references missing field {}",
                    index_meta.name, index_meta.field_name
                ))
            })?;
            let tree = BPlusTree::open(
                index_file_path(base_dir, meta.name(), &index_meta.name),
                field.attr_type,
                field.len,
            )?;
            indexes.push(tree);
        }
        debug!(table = meta.name(), indexes = indexes.len(), "opened table");

        Ok(Table {
            base_dir: base_dir.to_path_buf(),
            meta_path: meta_file.to_path_buf(),
            meta,
            data,
            indexes,
        })
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Returns the table schema.
    pub fn table_meta(&self) -> &TableMeta {
        &self.meta
    }

    /// Returns the names of all attached indexes.
    pub fn index_names(&self) -> Vec<&str> {
        self.meta.indexes().iter().map(|i| i.name.as_str()).collect()
    }

    /// Inserts a row built from `values` (one per user field, in
    /// declaration order) and returns its identifier.
    pub fn insert_record(
        &mut self,
        txn: Option<&dyn Transaction>,
        values: &[Value],
    ) -> Result<RowId, TableError> {
        let mut row = self.make_record(values)?;
        if let Some(txn) = txn {
            txn.init_row_info(&self.meta, &mut row);
        }

        let rid = self.data.insert(&row)?;

        if let Some(txn) = txn {
            if let Err(e) = txn.insert_record(&self.meta, rid, &row) {
                if let Err(undo) = self.data.delete(rid) {
                    error!(
                        table = self.meta.name(),
                        rid = %rid,
                        error = %undo,
                        "failed to roll back heap insert after transaction refusal"
                    );
                }
                return Err(e.into());
            }
        }

        if let Err(e) = self.insert_entry_of_indexes(&row, rid) {
            if let Err(undo) = self.delete_entry_of_indexes(&row, rid, false) {
                error!(
                    table = self.meta.name(),
                    rid = %rid,
                    error = %undo,
                    "failed to roll back index entries after insert failure"
                );
            }
            if let Err(undo) = self.data.delete(rid) {
                error!(
                    table = self.meta.name(),
                    rid = %rid,
                    error = %undo,
                    "failed to roll back heap row after insert failure"
                );
            }
            return Err(e);
        }
        Ok(rid)
    }

    /// Updates one field of every row matching the predicate. Returns the
    /// number of rows updated.
    pub fn update_record(
        &mut self,
        txn: Option<&dyn Transaction>,
        attribute_name: &str,
        value: &Value,
        conditions: &[Condition],
    ) -> Result<usize, TableError> {
        let (position, field) = self
            .meta
            .field_with_position(attribute_name)
            .ok_or_else(|| TableError::FieldMissing(attribute_name.to_string()))?;
        validate_value(value, field)?;
        let field = field.clone();
        let flag_index = self.meta.null_flag_index(position);
        let index_no = self.meta.index_position_on_field(attribute_name);

        let filter = self.compile_conditions(conditions)?;
        let targets = self.collect_matching(txn, filter.as_ref())?;

        let mut updated = 0;
        for (rid, row) in targets {
            self.update_row(txn, rid, row, &field, flag_index, index_no, value)?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Deletes every row matching the predicate. Returns the number of
    /// rows deleted.
    ///
    /// With a transaction present the rows are only marked through
    /// [`Transaction::delete_record`]; the physical removal happens in
    /// [`commit_delete`](Self::commit_delete).
    pub fn delete_record(
        &mut self,
        txn: Option<&dyn Transaction>,
        conditions: &[Condition],
    ) -> Result<usize, TableError> {
        let filter = self.compile_conditions(conditions)?;
        let targets = self.collect_matching(txn, filter.as_ref())?;

        let mut deleted = 0;
        for (rid, mut row) in targets {
            if let Some(txn) = txn {
                txn.delete_record(&self.meta, rid, &mut row)?;
                self.data.update(rid, &row)?;
            } else {
                self.delete_entry_of_indexes(&row, rid, false)?;
                self.data.delete(rid)?;
            }
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Scans rows matching the predicate, invoking `reader` for each
    /// visible match in `(page, slot)` order (index order when an index
    /// scan applies).
    ///
    /// A negative `limit` means unlimited; `0` returns immediately. The
    /// reader's error terminates the scan and is returned; end of file is
    /// not an error.
    pub fn scan_record<F>(
        &self,
        txn: Option<&dyn Transaction>,
        filter: Option<&CompositeFilter>,
        limit: i32,
        mut reader: F,
    ) -> Result<(), TableError>
    where
        F: FnMut(RowId, &[u8]) -> Result<(), TableError>,
    {
        if limit == 0 {
            return Ok(());
        }
        let limit = if limit < 0 { usize::MAX } else { limit as usize };

        if let Some(mut scanner) = self.find_index_for_scan(filter)? {
            let mut count = 0;
            while count < limit {
                let rid = match scanner.next_entry()? {
                    Some(rid) => rid,
                    None => break,
                };
                let view = self.data.get(rid)?;
                let visible = txn.map_or(true, |t| t.is_visible(&self.meta, view.data()));
                // The scanner over-selects on multi-atom predicates, so the
                // full filter runs again on the fetched row.
                if visible && filter.map_or(true, |f| f.evaluate(view.data())) {
                    reader(rid, view.data())?;
                    count += 1;
                }
            }
            return Ok(());
        }

        let mut count = 0;
        let mut scanner = self.data.scan_from_start();
        while count < limit {
            let view = match scanner.next_row()? {
                Some(view) => view,
                None => break,
            };
            let visible = txn.map_or(true, |t| t.is_visible(&self.meta, view.data()));
            if visible && filter.map_or(true, |f| f.evaluate(view.data())) {
                reader(view.rid(), view.data())?;
                count += 1;
            }
        }
        Ok(())
    }

    /// Creates a new index over `attribute_name`, backfilling it from every
    /// row visible under `txn`, then atomically rewrites the catalog.
    pub fn create_index(
        &mut self,
        txn: Option<&dyn Transaction>,
        index_name: &str,
        attribute_name: &str,
    ) -> Result<(), TableError> {
        if index_name.trim().is_empty() || attribute_name.trim().is_empty() {
            return Err(TableError::InvalidArgument(
                "index and attribute names must not be blank".into(),
            ));
        }
        if self.meta.index(index_name).is_some() {
            return Err(TableError::IndexExists(index_name.to_string()));
        }
        if self.meta.index_on_field(attribute_name).is_some() {
            return Err(TableError::IndexExists(format!(
                "field {} is already indexed",
                attribute_name
            )));
        }
        let (position, field) = self
            .meta
            .field_with_position(attribute_name)
            .ok_or_else(|| TableError::FieldMissing(attribute_name.to_string()))?;
        let field = field.clone();
        let flag_index = self.meta.null_flag_index(position);

        let path = index_file_path(&self.base_dir, self.meta.name(), index_name);
        let mut tree = BPlusTree::create(&path, field.attr_type, field.len)?;

        self.scan_record(txn, None, -1, |rid, row| {
            let payload = &row[field.offset..field.offset + field.len];
            let is_null = flag_index.map(|i| row[i] != 0).unwrap_or(false);
            tree.insert_entry(payload, is_null, rid)?;
            Ok(())
        })?;

        let mut new_meta = self.meta.clone();
        new_meta.add_index(IndexMeta {
            name: index_name.to_string(),
            field_name: attribute_name.to_string(),
        })?;
        new_meta.save_atomic(&self.meta_path)?;

        // The in-memory schema swaps only once the rename has succeeded
        self.meta = new_meta;
        self.indexes.push(tree);
        debug!(
            table = self.meta.name(),
            index = index_name,
            "created index"
        );
        Ok(())
    }

    /// Flushes the heap file and every index file. The first error
    /// encountered is returned.
    pub fn sync(&self) -> Result<(), TableError> {
        self.data.sync()?;
        for tree in &self.indexes {
            tree.sync()?;
        }
        Ok(())
    }

    /// Finalizes an insert on behalf of the transaction manager.
    ///
    /// The slot is re-fetched and re-validated before acting.
    pub fn commit_insert(
        &mut self,
        txn: &dyn Transaction,
        rid: RowId,
    ) -> Result<(), TableError> {
        let mut row = self.fetch_row(rid)?;
        txn.commit_insert(&self.meta, rid, &mut row)?;
        self.data.update(rid, &row)?;
        Ok(())
    }

    /// Undoes an insert: removes every index entry (missing entries are
    /// tolerated) and frees the heap slot.
    pub fn rollback_insert(&mut self, rid: RowId) -> Result<(), TableError> {
        let row = self.fetch_row(rid)?;
        self.delete_entry_of_indexes(&row, rid, false)?;
        self.data.delete(rid)?;
        Ok(())
    }

    /// Physically removes a row whose delete is being committed.
    pub fn commit_delete(
        &mut self,
        txn: &dyn Transaction,
        rid: RowId,
    ) -> Result<(), TableError> {
        let row = self.fetch_row(rid)?;
        txn.commit_delete(&self.meta, rid, &row)?;
        if let Err(e) = self.delete_entry_of_indexes(&row, rid, false) {
            warn!(
                table = self.meta.name(),
                rid = %rid,
                error = %e,
                "removing index entries during delete commit"
            );
        }
        self.data.delete(rid)?;
        Ok(())
    }

    /// Restores a row whose delete is rolled back.
    pub fn rollback_delete(
        &mut self,
        txn: &dyn Transaction,
        rid: RowId,
    ) -> Result<(), TableError> {
        let mut row = self.fetch_row(rid)?;
        txn.rollback_delete(&self.meta, rid, &mut row)?;
        self.data.update(rid, &row)?;
        Ok(())
    }

    /// Applies a committed update: swaps the heap row for `new_row` and
    /// re-keys every index.
    pub fn commit_update(
        &mut self,
        txn: Option<&dyn Transaction>,
        rid: RowId,
        new_row: &[u8],
    ) -> Result<(), TableError> {
        if new_row.len() != self.meta.row_width() {
            return Err(TableError::InvalidArgument(format!(
                "row buffer of {} bytes, expected {}",
                new_row.len(),
                self.meta.row_width()
            )));
        }
        let old_row = self.fetch_row(rid)?;
        if let Some(txn) = txn {
            txn.commit_update(&self.meta, rid, &old_row, new_row)?;
        }

        self.delete_entry_of_indexes(&old_row, rid, false)?;
        self.data.update(rid, new_row)?;
        if let Err(e) = self.insert_entry_of_indexes(new_row, rid) {
            if let Err(undo) = self.delete_entry_of_indexes(new_row, rid, false) {
                error!(
                    table = self.meta.name(),
                    rid = %rid,
                    error = %undo,
                    "failed to roll back index entries after update failure"
                );
            }
            if let Err(undo) = self.data.delete(rid) {
                error!(
                    table = self.meta.name(),
                    rid = %rid,
                    error = %undo,
                    "failed to roll back heap row after update failure"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Picks an index scan for the predicate, preferring equality atoms.
    ///
    /// Only a `field op literal` atom with `op` in `{=, <, <=, >, >=}` over
    /// an indexed field qualifies.
    fn find_index_for_scan(
        &self,
        filter: Option<&CompositeFilter>,
    ) -> Result<Option<IndexScanner<'_, FileStorage>>, TableError> {
        let filter = match filter {
            Some(f) if !f.is_empty() => f,
            _ => return Ok(None),
        };

        for equality_pass in [true, false] {
            for atom in filter.filters() {
                let (field_name, op, bytes, is_null) = match atom.index_probe() {
                    Some(probe) => probe,
                    None => continue,
                };
                if (op == CompOp::Eq) != equality_pass {
                    continue;
                }
                if !matches!(
                    op,
                    CompOp::Eq | CompOp::Lt | CompOp::Le | CompOp::Gt | CompOp::Ge
                ) {
                    continue;
                }
                let index_no = match self.meta.index_position_on_field(field_name) {
                    Some(no) => no,
                    None => continue,
                };
                let field = match self.meta.field(field_name) {
                    Some(f) => f,
                    None => continue,
                };
                let (op, probe) = normalize_probe(op, bytes, field.len);
                let scanner = self.indexes[index_no].scan(op, &probe, is_null)?;
                return Ok(Some(scanner));
            }
        }
        Ok(None)
    }

    /// Materializes a row buffer from user values, checking nullability,
    /// types and lengths.
    fn make_record(&self, values: &[Value]) -> Result<Vec<u8>, TableError> {
        if values.len() != self.meta.user_field_num() {
            return Err(TableError::FieldMissing(format!(
                "expected {} values, got {}",
                self.meta.user_field_num(),
                values.len()
            )));
        }
        for (i, value) in values.iter().enumerate() {
            let field = &self.meta.fields()[SYS_FIELD_NUM + i];
            validate_value(value, field)?;
        }

        let mut row = vec![0u8; self.meta.row_width()];
        for (i, value) in values.iter().enumerate() {
            let position = SYS_FIELD_NUM + i;
            let field = self.meta.fields()[position].clone();
            let flag_index = self.meta.null_flag_index(position);
            write_value(&mut row, &field, flag_index, value);
        }
        Ok(row)
    }

    /// Updates one row in place, re-keying the field's index if present.
    #[allow(clippy::too_many_arguments)]
    fn update_row(
        &mut self,
        txn: Option<&dyn Transaction>,
        rid: RowId,
        row: Vec<u8>,
        field: &FieldMeta,
        flag_index: Option<usize>,
        index_no: Option<usize>,
        value: &Value,
    ) -> Result<(), TableError> {
        let mut new_row = row.clone();
        write_value(&mut new_row, field, flag_index, value);

        if let Some(txn) = txn {
            txn.update_record(&self.meta, rid, &row, &new_row)?;
        }

        if let Some(no) = index_no {
            let payload = &row[field.offset..field.offset + field.len];
            let is_null = flag_index.map(|i| row[i] != 0).unwrap_or(false);
            self.indexes[no].delete_entry(payload, is_null, rid)?;
        }

        self.data.update(rid, &new_row)?;

        if let Some(no) = index_no {
            let payload = &new_row[field.offset..field.offset + field.len];
            if let Err(e) = self.indexes[no].insert_entry(payload, value.is_null, rid) {
                if let Err(undo) = self.delete_entry_of_indexes(&new_row, rid, false) {
                    error!(
                        table = self.meta.name(),
                        rid = %rid,
                        error = %undo,
                        "failed to roll back index entries after update failure"
                    );
                }
                if let Err(undo) = self.data.delete(rid) {
                    error!(
                        table = self.meta.name(),
                        rid = %rid,
                        error = %undo,
                        "failed to roll back heap row after update failure"
                    );
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Inserts `(key, rid)` into every attached index.
    fn insert_entry_of_indexes(&mut self, row: &[u8], rid: RowId) -> Result<(), TableError> {
        let meta = &self.meta;
        for (index_meta, tree) in meta.indexes().iter().zip(self.indexes.iter_mut()) {
            let (position, field) =
                meta.field_with_position(&index_meta.field_name)
                    .ok_or_else(|| {
                        TableError::CorruptCatalog(format!(
                            "index {} references missing field {}",
                            index_meta.name, index_meta.field_name
                        ))
                    })?;
            let payload = &row[field.offset..field.offset + field.len];
            let is_null = meta
                .null_flag_index(position)
                .map(|i| row[i] != 0)
                .unwrap_or(false);
            tree.insert_entry(payload, is_null, rid)?;
        }
        Ok(())
    }

    /// Removes `(key, rid)` from every attached index.
    ///
    /// Unless `error_on_not_exists` is set, a missing entry is downgraded
    /// to a warning so compensating cleanup never masks the triggering
    /// error.
    fn delete_entry_of_indexes(
        &mut self,
        row: &[u8],
        rid: RowId,
        error_on_not_exists: bool,
    ) -> Result<(), TableError> {
        let meta = &self.meta;
        for (index_meta, tree) in meta.indexes().iter().zip(self.indexes.iter_mut()) {
            let (position, field) =
                meta.field_with_position(&index_meta.field_name)
                    .ok_or_else(|| {
                        TableError::CorruptCatalog(format!(
                            "index {} references missing field {}",
                            index_meta.name, index_meta.field_name
                        ))
                    })?;
            let payload = &row[field.offset..field.offset + field.len];
            let is_null = meta
                .null_flag_index(position)
                .map(|i| row[i] != 0)
                .unwrap_or(false);
            match tree.delete_entry(payload, is_null, rid) {
                Ok(()) => {}
                Err(IndexError::KeyNotFound) if !error_on_not_exists => {
                    warn!(
                        table = meta.name(),
                        index = %index_meta.name,
                        rid = %rid,
                        "index entry already absent"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn compile_conditions(
        &self,
        conditions: &[Condition],
    ) -> Result<Option<CompositeFilter>, TableError> {
        if conditions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(CompositeFilter::new(&self.meta, conditions)?))
        }
    }

    /// Collects the identifiers and bytes of every visible matching row.
    fn collect_matching(
        &self,
        txn: Option<&dyn Transaction>,
        filter: Option<&CompositeFilter>,
    ) -> Result<Vec<(RowId, Vec<u8>)>, TableError> {
        let mut rows = Vec::new();
        self.scan_record(txn, filter, -1, |rid, data| {
            rows.push((rid, data.to_vec()));
            Ok(())
        })?;
        Ok(rows)
    }

    fn fetch_row(&self, rid: RowId) -> Result<Vec<u8>, TableError> {
        Ok(self.data.get(rid)?.data().to_vec())
    }
}

/// Brings a literal to the indexed field's width.
///
/// Short `Chars` literals are zero-padded like their stored form. Longer
/// literals are truncated; that can only widen the candidate set (the full
/// predicate re-runs on every fetched row), except for `<`, where the keys
/// equal to the truncated bound still satisfy the original comparison and
/// the operator weakens to `<=`.
fn normalize_probe(op: CompOp, bytes: &[u8], field_len: usize) -> (CompOp, Vec<u8>) {
    let mut probe = bytes.to_vec();
    if probe.len() < field_len {
        probe.resize(field_len, 0);
        (op, probe)
    } else if probe.len() > field_len {
        probe.truncate(field_len);
        let op = if op == CompOp::Lt { CompOp::Le } else { op };
        (op, probe)
    } else {
        (op, probe)
    }
}

/// Writes a value (or its null sentinel) into a row buffer and sets the
/// trailing null flag.
fn write_value(row: &mut [u8], field: &FieldMeta, flag_index: Option<usize>, value: &Value) {
    let slot = &mut row[field.offset..field.offset + field.len];
    if value.is_null {
        write_null_sentinel(field.attr_type, slot);
    } else {
        slot.fill(0);
        slot[..value.data.len()].copy_from_slice(&value.data);
    }
    if let Some(i) = flag_index {
        row[i] = value.is_null as u8;
    }
}

/// Checks a value against a field's nullability, type and width.
fn validate_value(value: &Value, field: &FieldMeta) -> Result<(), TableError> {
    if value.is_null {
        if !field.nullable {
            return Err(TableError::InvalidArgument(format!(
                "field {} does not accept null",
                field.name
            )));
        }
        return Ok(());
    }
    if value.attr_type != field.attr_type {
        return Err(TableError::FieldTypeMismatch {
            field: field.name.clone(),
            expected: field.attr_type,
            actual: value.attr_type,
        });
    }
    match field.attr_type {
        AttrType::Chars | AttrType::Text => {
            if value.data.len() > field.len {
                return Err(TableError::FieldMissing(format!(
                    "value of {} bytes exceeds {}({}) for field {}",
                    value.data.len(),
                    field.attr_type,
                    field.len,
                    field.name
                )));
            }
        }
        _ => {
            if value.data.len() != field.len {
                return Err(TableError::InvalidArgument(format!(
                    "value of {} bytes for {}-byte field {}",
                    value.data.len(),
                    field.len,
                    field.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::AttrType;
    use crate::table::meta::table_meta_path;
    use tempfile::{tempdir, TempDir};

    fn sample_table() -> (TempDir, Table) {
        let dir = tempdir().unwrap();
        let attrs = [
            AttrInfo::new("id", AttrType::Int, 4, false),
            AttrInfo::new("name", AttrType::Chars, 8, true),
        ];
        let table = Table::create(
            &table_meta_path(dir.path(), "t1"),
            "t1",
            dir.path(),
            &attrs,
        )
        .unwrap();
        (dir, table)
    }

    fn all_rows(table: &Table) -> Vec<(RowId, Vec<u8>)> {
        let mut rows = Vec::new();
        table
            .scan_record(None, None, -1, |rid, data| {
                rows.push((rid, data.to_vec()));
                Ok(())
            })
            .unwrap();
        rows
    }

    #[test]
    fn test_create_refuses_bad_arguments() {
        let dir = tempdir().unwrap();
        let attrs = [AttrInfo::new("id", AttrType::Int, 4, false)];

        assert!(matches!(
            Table::create(&table_meta_path(dir.path(), "x"), "  ", dir.path(), &attrs),
            Err(TableError::InvalidArgument(_))
        ));
        assert!(matches!(
            Table::create(&table_meta_path(dir.path(), "x"), "x", dir.path(), &[]),
            Err(TableError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_insert_validation_leaves_heap_unchanged() {
        let (_dir, mut table) = sample_table();
        table
            .insert_record(None, &[Value::int(1), Value::chars("a")])
            .unwrap();

        // Wrong arity
        assert!(matches!(
            table.insert_record(None, &[Value::int(2)]),
            Err(TableError::FieldMissing(_))
        ));
        // Wrong type
        assert!(matches!(
            table.insert_record(None, &[Value::chars("x"), Value::chars("a")]),
            Err(TableError::FieldTypeMismatch { .. })
        ));
        // Null into NOT NULL
        assert!(matches!(
            table.insert_record(None, &[Value::null(), Value::chars("a")]),
            Err(TableError::InvalidArgument(_))
        ));

        assert_eq!(all_rows(&table).len(), 1);
    }

    #[test]
    fn test_chars_length_boundary() {
        let (_dir, mut table) = sample_table();

        // Exactly the declared length fits
        table
            .insert_record(None, &[Value::int(1), Value::chars("12345678")])
            .unwrap();
        // One byte longer is rejected
        assert!(matches!(
            table.insert_record(None, &[Value::int(2), Value::chars("123456789")]),
            Err(TableError::FieldMissing(_))
        ));
        assert_eq!(all_rows(&table).len(), 1);
    }

    #[test]
    fn test_update_rekeys_index(){
        let (_dir, mut table) = sample_table();
        table
            .insert_record(None, &[Value::int(1), Value::chars("abc")])
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

        let filter = CompositeFilter::new(
            table.table_meta(),
            &[Condition::attr_value("name", CompOp::Eq, Value::chars("NEW"))],
        )
        .unwrap();
        let mut hits = 0;
        table
            .scan_record(None, Some(&filter), -1, |_, _| {
                hits += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(hits, 1);

        let filter = CompositeFilter::new(
            table.table_meta(),
            &[Condition::attr_value("name", CompOp::Eq, Value::chars("abc"))],
        )
        .unwrap();
        let mut hits = 0;
        table
            .scan_record(None, Some(&filter), -1, |_, _| {
                hits += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(hits, 0);
    }

    #[test]
    fn test_scan_limit() {
        let (_dir, mut table) = sample_table();
        for i in 0..10 {
            table
                .insert_record(None, &[Value::int(i), Value::chars("x")])
                .unwrap();
        }

        let mut count = 0;
        table
            .scan_record(None, None, 0, |_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 0);

        let mut count = 0;
        table
            .scan_record(None, None, 3, |_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 3);

        let mut count = 0;
        table
            .scan_record(None, None, -1, |_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 10);
    }

    #[test]
    fn test_create_index_rejects_duplicates() {
        let (_dir, mut table) = sample_table();
        table.create_index(None, "i_id", "id").unwrap();

        assert!(matches!(
            table.create_index(None, "i_id", "name"),
            Err(TableError::IndexExists(_))
        ));
        assert!(matches!(
            table.create_index(None, "i_id2", "id"),
            Err(TableError::IndexExists(_))
        ));
        assert!(matches!(
            table.create_index(None, "i_ghost", "ghost"),
            Err(TableError::FieldMissing(_))
        ));
        assert!(matches!(
            table.create_index(None, " ", "id"),
            Err(TableError::InvalidArgument(_))
        ));
        assert_eq!(table.index_names(), vec!["i_id"]);
    }

    #[test]
    fn test_rollback_insert_cleans_heap_and_indexes() {
        let (_dir, mut table) = sample_table();
        table.create_index(None, "i_id", "id").unwrap();
        let rid = table
            .insert_record(None, &[Value::int(42), Value::chars("z")])
            .unwrap();

        table.rollback_insert(rid).unwrap();

        assert_eq!(all_rows(&table).len(), 0);
        let filter = CompositeFilter::new(
            table.table_meta(),
            &[Condition::attr_value("id", CompOp::Eq, Value::int(42))],
        )
        .unwrap();
        let mut hits = 0;
        table
            .scan_record(None, Some(&filter), -1, |_, _| {
                hits += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(hits, 0);
    }
}

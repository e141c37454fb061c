//! Transaction integration seam.
//!
//! The engine does not manage transactions itself; it defers visibility and
//! durability decisions to a [`Transaction`] implementation supplied by the
//! caller. The trait receives the table schema and raw row bytes rather
//! than a handle back into the table, so the engine keeps exclusive access
//! to its own files while the transaction layer stamps system fields.
//!
//! The first two fields of every row are reserved for the transaction
//! layer: a deletion mark and a transaction stamp (see
//! [`TableMeta`](crate::table::TableMeta)). Their interpretation belongs
//! entirely to the `Transaction` implementation.

use std::fmt;

use crate::record::RowId;
use crate::table::TableMeta;

/// Error raised by a transaction implementation.
#[derive(Debug)]
pub struct TxnError {
    message: String,
}

impl TxnError {
    /// Creates a transaction error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TxnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction error: {}", self.message)
    }
}

impl std::error::Error for TxnError {}

/// Hooks the table engine invokes around row mutations.
///
/// Mutating hooks receive the row buffer and may rewrite the system fields;
/// the engine persists whatever the hook leaves in the buffer. Hooks are
/// called before the corresponding physical operation, so a failing hook
/// aborts it.
pub trait Transaction {
    /// Stamps a freshly materialized row before it reaches the heap.
    fn init_row_info(&self, meta: &TableMeta, row: &mut [u8]);

    /// Records an insert of `rid`. A failure rolls the heap insert back.
    fn insert_record(&self, meta: &TableMeta, rid: RowId, row: &[u8]) -> Result<(), TxnError>;

    /// Marks a row deleted. The engine persists the updated buffer; the
    /// physical delete happens at [`commit_delete`](Self::commit_delete).
    fn delete_record(&self, meta: &TableMeta, rid: RowId, row: &mut [u8]) -> Result<(), TxnError>;

    /// Records an in-place update from `row` to `new_row`.
    fn update_record(
        &self,
        meta: &TableMeta,
        rid: RowId,
        row: &[u8],
        new_row: &[u8],
    ) -> Result<(), TxnError>;

    /// Decides whether a row is visible to this transaction.
    fn is_visible(&self, meta: &TableMeta, row: &[u8]) -> bool;

    /// Finalizes an insert, typically clearing the transaction stamp.
    fn commit_insert(&self, meta: &TableMeta, rid: RowId, row: &mut [u8]) -> Result<(), TxnError>;

    /// Acknowledges the physical removal of a previously marked row.
    fn commit_delete(&self, meta: &TableMeta, rid: RowId, row: &[u8]) -> Result<(), TxnError>;

    /// Finalizes an in-place update.
    fn commit_update(
        &self,
        meta: &TableMeta,
        rid: RowId,
        row: &[u8],
        new_row: &[u8],
    ) -> Result<(), TxnError>;

    /// Clears the deletion mark of a row whose delete is rolled back.
    fn rollback_delete(
        &self,
        meta: &TableMeta,
        rid: RowId,
        row: &mut [u8],
    ) -> Result<(), TxnError>;
}

/// Transaction stand-in for embeddings without a transaction manager.
///
/// Every row is visible and every hook succeeds without touching the row.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransaction;

impl Transaction for NoopTransaction {
    fn init_row_info(&self, _meta: &TableMeta, _row: &mut [u8]) {}

    fn insert_record(&self, _meta: &TableMeta, _rid: RowId, _row: &[u8]) -> Result<(), TxnError> {
        Ok(())
    }

    fn delete_record(
        &self,
        _meta: &TableMeta,
        _rid: RowId,
        _row: &mut [u8],
    ) -> Result<(), TxnError> {
        Ok(())
    }

    fn update_record(
        &self,
        _meta: &TableMeta,
        _rid: RowId,
        _row: &[u8],
        _new_row: &[u8],
    ) -> Result<(), TxnError> {
        Ok(())
    }

    fn is_visible(&self, _meta: &TableMeta, _row: &[u8]) -> bool {
        true
    }

    fn commit_insert(
        &self,
        _meta: &TableMeta,
        _rid: RowId,
        _row: &mut [u8],
    ) -> Result<(), TxnError> {
        Ok(())
    }

    fn commit_delete(&self, _meta: &TableMeta, _rid: RowId, _row: &[u8]) -> Result<(), TxnError> {
        Ok(())
    }

    fn commit_update(
        &self,
        _meta: &TableMeta,
        _rid: RowId,
        _row: &[u8],
        _new_row: &[u8],
    ) -> Result<(), TxnError> {
        Ok(())
    }

    fn rollback_delete(
        &self,
        _meta: &TableMeta,
        _rid: RowId,
        _row: &mut [u8],
    ) -> Result<(), TxnError> {
        Ok(())
    }
}

//! Error types for the table engine.

use std::fmt;

use crate::datum::AttrType;
use crate::index::IndexError;
use crate::record::RecordError;
use crate::storage::StorageError;
use crate::tx::TxnError;

/// Errors from table operations.
#[derive(Debug)]
pub enum TableError {
    /// Malformed input: blank names, empty schemas, null into a
    /// non-nullable field.
    InvalidArgument(String),
    /// A table with this name already exists.
    TableExists(String),
    /// The value list does not match the schema's user fields, or a named
    /// field is absent, or a `Chars` value exceeds its declared length.
    FieldMissing(String),
    /// A value's type differs from the field's declared type.
    FieldTypeMismatch {
        /// Field the value was destined for.
        field: String,
        /// Declared field type.
        expected: AttrType,
        /// Type of the supplied value.
        actual: AttrType,
    },
    /// An index with this name, or on this field, already exists.
    IndexExists(String),
    /// The catalog file is unreadable or violates schema invariants.
    CorruptCatalog(String),
    /// Error from the record file.
    Record(RecordError),
    /// Error from a B+tree index.
    Index(IndexError),
    /// Error from the storage layer.
    Storage(StorageError),
    /// Error raised by the transaction layer.
    Txn(TxnError),
    /// Raw I/O error outside the paged files (catalog reads and writes).
    Io(std::io::Error),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            TableError::TableExists(name) => write!(f, "table {} already exists", name),
            TableError::FieldMissing(msg) => write!(f, "field missing: {}", msg),
            TableError::FieldTypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for field {}: expected {}, got {}",
                field, expected, actual
            ),
            TableError::IndexExists(msg) => write!(f, "index already exists: {}", msg),
            TableError::CorruptCatalog(msg) => write!(f, "corrupt catalog: {}", msg),
            TableError::Record(e) => write!(f, "record error: {}", e),
            TableError::Index(e) => write!(f, "index error: {}", e),
            TableError::Storage(e) => write!(f, "storage error: {}", e),
            TableError::Txn(e) => write!(f, "{}", e),
            TableError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for TableError {}

impl From<RecordError> for TableError {
    fn from(e: RecordError) -> Self {
        TableError::Record(e)
    }
}

impl From<IndexError> for TableError {
    fn from(e: IndexError) -> Self {
        TableError::Index(e)
    }
}

impl From<StorageError> for TableError {
    fn from(e: StorageError) -> Self {
        TableError::Storage(e)
    }
}

impl From<TxnError> for TableError {
    fn from(e: TxnError) -> Self {
        TableError::Txn(e)
    }
}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        TableError::Io(e)
    }
}

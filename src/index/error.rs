//! Error types for the B+tree index.

use std::fmt;

use crate::datum::CompOp;
use crate::storage::StorageError;

/// Errors from index operations.
#[derive(Debug)]
pub enum IndexError {
    /// The exact `(key, row_id)` pair is absent.
    ///
    /// Callers performing compensating cleanup may treat this as
    /// non-fatal.
    KeyNotFound,
    /// Key payload length differs from the indexed field width.
    InvalidKeyLength {
        /// Field width the index was created with.
        expected: usize,
        /// Length of the supplied payload.
        actual: usize,
    },
    /// The key width leaves no room for a usable node fanout.
    KeyTooLarge(usize),
    /// The operator has no ordered-scan interpretation.
    UnsupportedOperator(CompOp),
    /// The index file is not a valid B+tree or does not match the field.
    Corrupted(String),
    /// Error from the storage layer.
    Storage(StorageError),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::KeyNotFound => write!(f, "index entry not found"),
            IndexError::InvalidKeyLength { expected, actual } => {
                write!(f, "invalid key length: expected {}, got {}", expected, actual)
            }
            IndexError::KeyTooLarge(len) => {
                write!(f, "key of {} bytes is too large for a tree node", len)
            }
            IndexError::UnsupportedOperator(op) => {
                write!(f, "operator {} cannot drive an index scan", op)
            }
            IndexError::Corrupted(msg) => write!(f, "index corrupted: {}", msg),
            IndexError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<StorageError> for IndexError {
    fn from(e: StorageError) -> Self {
        IndexError::Storage(e)
    }
}

//! Error types for the record file.

use std::fmt;

use crate::record::RowId;
use crate::storage::StorageError;

/// Errors from record file operations.
#[derive(Debug)]
pub enum RecordError {
    /// The row identifier does not address an occupied slot.
    InvalidRowId(RowId),
    /// The row does not fit into a single page.
    RowTooLarge(usize),
    /// Row width differs from the slot width of the addressed page.
    WidthMismatch {
        /// Slot width of the page.
        expected: usize,
        /// Width of the supplied row.
        actual: usize,
    },
    /// Error from the storage layer.
    Storage(StorageError),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::InvalidRowId(rid) => write!(f, "invalid row id {}", rid),
            RecordError::RowTooLarge(size) => {
                write!(f, "row of {} bytes does not fit in a page", size)
            }
            RecordError::WidthMismatch { expected, actual } => {
                write!(f, "row width mismatch: slot holds {}, got {}", expected, actual)
            }
            RecordError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<StorageError> for RecordError {
    fn from(e: StorageError) -> Self {
        RecordError::Storage(e)
    }
}

//! Storage layer errors.

use std::fmt;

use crate::storage::PageNo;

/// Errors from page I/O and the buffer pool.
#[derive(Debug)]
pub enum StorageError {
    /// Page not found in storage.
    PageNotFound(PageNo),

    /// Buffer passed to `read_page`/`write_page` is not exactly one page.
    InvalidBufferSize {
        /// Expected buffer size (`PAGE_SIZE`).
        expected: usize,
        /// Actual buffer size provided.
        actual: usize,
    },

    /// All buffer pool frames are occupied and pinned.
    PoolExhausted,

    /// I/O error from the underlying file system.
    Io(std::io::Error),

    /// The backing file has an invalid format or size.
    Corrupted(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::PageNotFound(no) => write!(f, "page {} not found", no),
            StorageError::InvalidBufferSize { expected, actual } => {
                write!(f, "invalid buffer size: expected {}, got {}", expected, actual)
            }
            StorageError::PoolExhausted => write!(f, "all buffer pool frames are pinned"),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Corrupted(msg) => write!(f, "data corruption: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

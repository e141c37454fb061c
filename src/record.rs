//! Paged record file.
//!
//! Rows of a table live in fixed-width slots inside 8KB pages. Each page
//! carries an occupancy bitmap; a row is addressed by its stable
//! [`RowId`] (page number + slot number) for as long as it exists.
//!
//! - [`RecordPage`]: page-level slot directory and row storage
//! - [`RecordFile`]: multi-page record file with a free-page chain
//! - [`RecordFileScanner`]: pull-based cursor over every occupied slot
//! - [`RowView`]: borrowed view of one row inside a pinned page

mod error;
mod file;
mod page;

pub use error::RecordError;
pub use file::{RecordFile, RecordFileScanner, RowView};
pub use page::{page_capacity, RecordPage, RECORD_PAGE_HEADER_SIZE};

use std::fmt;

/// Identifier of a row within a record file.
///
/// Stable for the life of the row; the slot may be reused by a later
/// insert once the row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    /// Page containing the row. Page 0 is the file header and never holds
    /// rows.
    pub page_no: u32,
    /// Slot within the page.
    pub slot_no: u32,
}

impl RowId {
    /// Creates a new row identifier.
    pub fn new(page_no: u32, slot_no: u32) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.page_no, self.slot_no)
    }
}

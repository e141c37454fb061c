//! Multi-page record file.
//!
//! Page 0 is the file header and stores the head of the free-page chain;
//! rows live in record pages 1..n. Inserts walk the chain first, fall back
//! to a page-by-page sweep, and finally allocate a fresh page. Deletes only
//! clear the occupancy bit; slot bytes are retained until the slot is
//! reused.

use std::ops::Deref;
use std::path::Path;

use super::error::RecordError;
use super::page::{page_capacity, RecordPage};
use super::RowId;
use crate::storage::{
    BufferPool, FileStorage, PageNo, PageReadGuard, Storage, StorageError, DEFAULT_POOL_SIZE,
};

const OFF_FIRST_FREE: usize = 0;

/// A record file over one storage backend.
///
/// All rows in a file share one slot width (fixed by the first insert);
/// pages whose width does not match a row are skipped during placement.
pub struct RecordFile<S: Storage> {
    pool: BufferPool<S>,
}

impl RecordFile<FileStorage> {
    /// Creates a new record file at `path`.
    ///
    /// # Errors
    ///
    /// Fails with an `AlreadyExists` I/O error if the path is taken.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let storage = FileStorage::create(path.as_ref())?;
        Self::with_pool(BufferPool::new(storage, DEFAULT_POOL_SIZE))
    }

    /// Opens an existing record file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let storage = FileStorage::open(path.as_ref())?;
        Self::with_pool(BufferPool::new(storage, DEFAULT_POOL_SIZE))
    }
}

impl<S: Storage> RecordFile<S> {
    /// Wraps a buffer pool as a record file, initializing the header page
    /// for an empty backend.
    pub fn with_pool(pool: BufferPool<S>) -> Result<Self, RecordError> {
        if pool.page_count() == 0 {
            // Zeroed header page: empty free-page chain
            let guard = pool.new_page()?;
            drop(guard);
        }
        Ok(Self { pool })
    }

    /// Inserts a row and returns its identifier.
    pub fn insert(&self, row: &[u8]) -> Result<RowId, RecordError> {
        let width = row.len();
        if width == 0 || page_capacity(width) == 0 {
            return Err(RecordError::RowTooLarge(width));
        }

        // Walk the free-page chain, lazily popping stale (full or
        // mismatched) heads.
        let mut steps = 0u32;
        loop {
            let head = self.first_free()?;
            if head == 0 || steps > self.pool.page_count() {
                break;
            }
            steps += 1;

            let mut guard = self.pool.fetch_page_mut(head)?;
            let mut page = RecordPage::new(&mut *guard);
            if page.width() == width && !page.is_full() {
                let slot = match page.find_free_slot() {
                    Some(slot) => slot,
                    None => break,
                };
                page.write_slot(slot, row);
                page.set_occupied(slot, true);
                if page.is_full() {
                    let next = page.next_free();
                    page.set_chained(false);
                    drop(guard);
                    self.set_first_free(next)?;
                }
                return Ok(RowId::new(head, slot));
            }
            let next = page.next_free();
            page.set_chained(false);
            drop(guard);
            self.set_first_free(next)?;
        }

        // Page-by-page sweep for space the chain does not know about
        for page_no in 1..self.pool.page_count() {
            let mut guard = self.pool.fetch_page_mut(page_no)?;
            let mut page = RecordPage::new(&mut *guard);
            if page.width() == width && !page.is_full() {
                if let Some(slot) = page.find_free_slot() {
                    page.write_slot(slot, row);
                    page.set_occupied(slot, true);
                    return Ok(RowId::new(page_no, slot));
                }
            }
        }

        // No existing page has space; allocate a fresh one
        let head = self.first_free()?;
        let mut guard = self.pool.new_page()?;
        let page_no = guard.page_no();
        let mut page = RecordPage::new(&mut *guard);
        page.init(width as u32);
        page.write_slot(0, row);
        page.set_occupied(0, true);
        let link = !page.is_full();
        if link {
            page.set_chained(true);
            page.set_next_free(head);
        }
        drop(guard);
        if link {
            self.set_first_free(page_no)?;
        }
        Ok(RowId::new(page_no, 0))
    }

    /// Fetches a row, pinning its page for the lifetime of the view.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::InvalidRowId` if the identifier does not
    /// address an occupied slot.
    pub fn get(&self, rid: RowId) -> Result<RowView<'_, S>, RecordError> {
        if rid.page_no == 0 || rid.page_no >= self.pool.page_count() {
            return Err(RecordError::InvalidRowId(rid));
        }
        let guard = self.pool.fetch_page(rid.page_no)?;
        let (offset, len) = {
            let page = RecordPage::new(&*guard);
            if page.width() == 0
                || rid.slot_no >= page.capacity()
                || !page.is_occupied(rid.slot_no)
            {
                return Err(RecordError::InvalidRowId(rid));
            }
            (page.slot_offset(rid.slot_no), page.width())
        };
        Ok(RowView {
            guard,
            offset,
            len,
            rid,
        })
    }

    /// Overwrites a row in place. The occupancy bitmap is unchanged.
    pub fn update(&self, rid: RowId, row: &[u8]) -> Result<(), RecordError> {
        if rid.page_no == 0 || rid.page_no >= self.pool.page_count() {
            return Err(RecordError::InvalidRowId(rid));
        }
        let mut guard = self.pool.fetch_page_mut(rid.page_no)?;
        let mut page = RecordPage::new(&mut *guard);
        if rid.slot_no >= page.capacity() || !page.is_occupied(rid.slot_no) {
            return Err(RecordError::InvalidRowId(rid));
        }
        if row.len() != page.width() {
            return Err(RecordError::WidthMismatch {
                expected: page.width(),
                actual: row.len(),
            });
        }
        page.write_slot(rid.slot_no, row);
        Ok(())
    }

    /// Deletes a row by clearing its occupancy bit. Slot bytes are not
    /// zeroed.
    pub fn delete(&self, rid: RowId) -> Result<(), RecordError> {
        if rid.page_no == 0 || rid.page_no >= self.pool.page_count() {
            return Err(RecordError::InvalidRowId(rid));
        }
        let head = self.first_free()?;
        let chain = {
            let mut guard = self.pool.fetch_page_mut(rid.page_no)?;
            let mut page = RecordPage::new(&mut *guard);
            if rid.slot_no >= page.capacity() || !page.is_occupied(rid.slot_no) {
                return Err(RecordError::InvalidRowId(rid));
            }
            page.set_occupied(rid.slot_no, false);
            if !page.is_chained() {
                page.set_chained(true);
                page.set_next_free(head);
                true
            } else {
                false
            }
        };
        if chain {
            self.set_first_free(rid.page_no)?;
        }
        Ok(())
    }

    /// Returns a cursor over every occupied slot in `(page, slot)` order.
    pub fn scan_from_start(&self) -> RecordFileScanner<'_, S> {
        RecordFileScanner {
            file: self,
            page_no: 1,
            slot_no: 0,
        }
    }

    /// Writes all dirty pages back and syncs the backend.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.pool.flush_all()
    }

    fn first_free(&self) -> Result<PageNo, RecordError> {
        let guard = self.pool.fetch_page(0)?;
        Ok(u32::from_le_bytes([
            guard[OFF_FIRST_FREE],
            guard[OFF_FIRST_FREE + 1],
            guard[OFF_FIRST_FREE + 2],
            guard[OFF_FIRST_FREE + 3],
        ]))
    }

    fn set_first_free(&self, page_no: PageNo) -> Result<(), RecordError> {
        let mut guard = self.pool.fetch_page_mut(0)?;
        guard[OFF_FIRST_FREE..OFF_FIRST_FREE + 4].copy_from_slice(&page_no.to_le_bytes());
        Ok(())
    }
}

/// Borrowed view of one row inside a pinned page.
///
/// The page stays pinned for the lifetime of the view; callers must not
/// retain row bytes past it.
pub struct RowView<'a, S: Storage> {
    guard: PageReadGuard<'a, S>,
    offset: usize,
    len: usize,
    rid: RowId,
}

impl<S: Storage> RowView<'_, S> {
    /// Returns the identifier of the viewed row.
    pub fn rid(&self) -> RowId {
        self.rid
    }

    /// Returns the row bytes.
    pub fn data(&self) -> &[u8] {
        &self.guard[self.offset..self.offset + self.len]
    }
}

impl<S: Storage> Deref for RowView<'_, S> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// Pull-based cursor yielding rows in `(page, slot)` order.
///
/// At most one page is pinned at a time: the pin is held by the returned
/// [`RowView`] and released when the caller drops it.
pub struct RecordFileScanner<'a, S: Storage> {
    file: &'a RecordFile<S>,
    page_no: PageNo,
    slot_no: u32,
}

impl<'a, S: Storage> RecordFileScanner<'a, S> {
    /// Advances to the next occupied slot, or `None` at end of file.
    pub fn next_row(&mut self) -> Result<Option<RowView<'a, S>>, RecordError> {
        loop {
            if self.page_no >= self.file.pool.page_count() {
                return Ok(None);
            }
            let guard = self.file.pool.fetch_page(self.page_no)?;
            let (capacity, width) = {
                let page = RecordPage::new(&*guard);
                (page.capacity(), page.width())
            };

            let mut slot = self.slot_no;
            while slot < capacity {
                let hit = {
                    let page = RecordPage::new(&*guard);
                    page.is_occupied(slot)
                };
                if hit {
                    let offset = {
                        let page = RecordPage::new(&*guard);
                        page.slot_offset(slot)
                    };
                    let rid = RowId::new(self.page_no, slot);
                    self.slot_no = slot + 1;
                    return Ok(Some(RowView {
                        guard,
                        offset,
                        len: width,
                        rid,
                    }));
                }
                slot += 1;
            }

            self.page_no += 1;
            self.slot_no = 0;
        }
    }
}

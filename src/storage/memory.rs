//! In-memory storage implementation for tests.

use parking_lot::Mutex;

use super::page::{PageData, PageNo, PAGE_SIZE};
use super::{Storage, StorageError};

/// In-memory storage backed by a vector of pages.
///
/// Behaves like [`FileStorage`](super::FileStorage) without touching the
/// file system; `sync_all` is a no-op.
pub struct MemoryStorage {
    pages: Mutex<Vec<PageData>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        let pages = self.pages.lock();
        let page = pages
            .get(page_no as usize)
            .ok_or(StorageError::PageNotFound(page_no))?;
        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    fn write_page(&self, page_no: PageNo, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(page_no as usize)
            .ok_or(StorageError::PageNotFound(page_no))?;
        page.as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageNo, StorageError> {
        let mut pages = self.pages.lock();
        let page_no = pages.len() as PageNo;
        pages.push(PageData::new());
        Ok(page_no)
    }

    fn page_count(&self) -> u32 {
        self.pages.lock().len() as u32
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

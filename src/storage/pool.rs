//! Buffer pool: page caching with pin counts and LRU eviction.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use super::guard::{PageReadGuard, PageWriteGuard};
use super::page::{PageData, PageNo};
use super::replacer::LruReplacer;
use super::{Storage, StorageError};

/// Default number of frames in a buffer pool (256 * 8KB = 2MB).
pub const DEFAULT_POOL_SIZE: usize = 256;

pub(super) struct FrameMeta {
    pub page_no: Option<PageNo>,
    pub pin_count: u32,
    pub dirty: bool,
}

pub(super) struct Frame {
    pub data: RwLock<PageData>,
    pub meta: Mutex<FrameMeta>,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: RwLock::new(PageData::new()),
            meta: Mutex::new(FrameMeta {
                page_no: None,
                pin_count: 0,
                dirty: false,
            }),
        }
    }
}

/// Caches pages of one [`Storage`] backend in a fixed array of frames.
///
/// Pages are fetched through RAII guards which pin the frame for their
/// lifetime; a frame becomes an eviction candidate only when its pin count
/// drops to zero. Write guards mark the frame dirty on drop; dirty frames
/// are written back on eviction and on [`flush_all`](Self::flush_all).
///
/// The pool is injected into its consumers by constructor, so tests can
/// substitute [`MemoryStorage`](super::MemoryStorage) for the disk backend.
pub struct BufferPool<S: Storage> {
    storage: S,
    frames: Vec<Frame>,
    page_table: RwLock<HashMap<PageNo, usize>>,
    replacer: Mutex<LruReplacer>,
    free_list: Mutex<Vec<usize>>,
}

impl<S: Storage> BufferPool<S> {
    /// Creates a buffer pool with `pool_size` frames over the given backend.
    pub fn new(storage: S, pool_size: usize) -> Self {
        let frames = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list = (0..pool_size).rev().collect();

        Self {
            storage,
            frames,
            page_table: RwLock::new(HashMap::new()),
            replacer: Mutex::new(LruReplacer::with_capacity(pool_size)),
            free_list: Mutex::new(free_list),
        }
    }

    /// Returns the underlying storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the number of pages allocated in the backend.
    pub fn page_count(&self) -> u32 {
        self.storage.page_count()
    }

    /// Fetches a page for reading. The returned guard pins the frame.
    pub fn fetch_page(&self, page_no: PageNo) -> Result<PageReadGuard<'_, S>, StorageError> {
        let frame_id = self.pin_frame(page_no)?;
        let lock = self.frames[frame_id].data.read();
        Ok(PageReadGuard::new(self, frame_id, page_no, lock))
    }

    /// Fetches a page for modification. The frame is marked dirty when the
    /// guard is dropped.
    pub fn fetch_page_mut(&self, page_no: PageNo) -> Result<PageWriteGuard<'_, S>, StorageError> {
        let frame_id = self.pin_frame(page_no)?;
        let lock = self.frames[frame_id].data.write();
        Ok(PageWriteGuard::new(self, frame_id, page_no, lock))
    }

    /// Allocates a new page in the backend and returns a write guard over
    /// its zeroed contents.
    pub fn new_page(&self) -> Result<PageWriteGuard<'_, S>, StorageError> {
        let page_no = self.storage.allocate_page()?;
        let frame_id = self.take_victim()?;

        {
            let mut meta = self.frames[frame_id].meta.lock();
            meta.page_no = Some(page_no);
            meta.pin_count = 1;
            meta.dirty = false;
        }
        self.page_table.write().insert(page_no, frame_id);

        let mut lock = self.frames[frame_id].data.write();
        lock.clear();
        Ok(PageWriteGuard::new(self, frame_id, page_no, lock))
    }

    /// Writes every dirty frame back and syncs the backend.
    ///
    /// Callers must not hold write guards across a flush.
    pub fn flush_all(&self) -> Result<(), StorageError> {
        for frame in &self.frames {
            let mut meta = frame.meta.lock();
            if let (Some(page_no), true) = (meta.page_no, meta.dirty) {
                let data = frame.data.read();
                self.storage.write_page(page_no, data.as_slice())?;
                meta.dirty = false;
            }
        }
        self.storage.sync_all()
    }

    /// Looks up or loads the page and increments its pin count.
    fn pin_frame(&self, page_no: PageNo) -> Result<usize, StorageError> {
        {
            let table = self.page_table.read();
            if let Some(&frame_id) = table.get(&page_no) {
                let mut meta = self.frames[frame_id].meta.lock();
                meta.pin_count += 1;
                if meta.pin_count == 1 {
                    self.replacer.lock().pin(frame_id);
                }
                return Ok(frame_id);
            }
        }

        let frame_id = self.take_victim()?;
        {
            let mut data = self.frames[frame_id].data.write();
            if let Err(e) = self.storage.read_page(page_no, data.as_mut_slice()) {
                self.free_list.lock().push(frame_id);
                return Err(e);
            }
        }
        {
            let mut meta = self.frames[frame_id].meta.lock();
            meta.page_no = Some(page_no);
            meta.pin_count = 1;
            meta.dirty = false;
        }
        self.page_table.write().insert(page_no, frame_id);
        Ok(frame_id)
    }

    /// Finds a usable frame, evicting (and writing back) an unpinned page
    /// if the free list is empty.
    fn take_victim(&self) -> Result<usize, StorageError> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }

        let frame_id = self
            .replacer
            .lock()
            .evict()
            .ok_or(StorageError::PoolExhausted)?;

        let mut meta = self.frames[frame_id].meta.lock();
        debug_assert_eq!(meta.pin_count, 0);
        if let Some(old_no) = meta.page_no.take() {
            if meta.dirty {
                let data = self.frames[frame_id].data.read();
                if let Err(e) = self.storage.write_page(old_no, data.as_slice()) {
                    // Victim stays cached and evictable; the caller sees
                    // the write-back failure.
                    meta.page_no = Some(old_no);
                    drop(data);
                    drop(meta);
                    self.replacer.lock().unpin(frame_id);
                    return Err(e);
                }
            }
            meta.dirty = false;
            self.page_table.write().remove(&old_no);
        }
        Ok(frame_id)
    }

    /// Flushes one page if it is cached and dirty.
    pub fn flush_page(&self, page_no: PageNo) -> Result<(), StorageError> {
        let table = self.page_table.read();
        if let Some(&frame_id) = table.get(&page_no) {
            let mut meta = self.frames[frame_id].meta.lock();
            if meta.dirty {
                let data = self.frames[frame_id].data.read();
                self.storage.write_page(page_no, data.as_slice())?;
                meta.dirty = false;
            }
        }
        Ok(())
    }

    pub(super) fn unpin(&self, frame_id: usize, dirty: bool) {
        let mut meta = self.frames[frame_id].meta.lock();
        if dirty {
            meta.dirty = true;
        }
        meta.pin_count = meta.pin_count.saturating_sub(1);
        if meta.pin_count == 0 {
            self.replacer.lock().unpin(frame_id);
        }
    }
}

impl<S: Storage> Drop for BufferPool<S> {
    /// Closing a pool writes its dirty pages back; durability beyond the OS
    /// cache still requires an explicit flush.
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            tracing::error!(error = %e, "failed to flush buffer pool on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, PAGE_SIZE};

    fn small_pool(frames: usize) -> BufferPool<MemoryStorage> {
        BufferPool::new(MemoryStorage::new(), frames)
    }

    #[test]
    fn test_new_page_and_fetch() {
        let pool = small_pool(4);

        let page_no = {
            let mut guard = pool.new_page().unwrap();
            guard[0] = 42;
            guard.page_no()
        };

        let guard = pool.fetch_page(page_no).unwrap();
        assert_eq!(guard[0], 42);
        assert_eq!(guard.len(), PAGE_SIZE);
    }

    #[test]
    fn test_dirty_page_survives_eviction() {
        let pool = small_pool(2);

        let page_no = {
            let mut guard = pool.new_page().unwrap();
            guard[100] = 7;
            guard.page_no()
        };

        // Force the first page out of the pool
        for _ in 0..4 {
            let guard = pool.new_page().unwrap();
            drop(guard);
        }

        let guard = pool.fetch_page(page_no).unwrap();
        assert_eq!(guard[100], 7);
    }

    #[test]
    fn test_pool_exhausted_when_all_pinned() {
        let pool = small_pool(2);

        let g0 = pool.new_page().unwrap();
        let g1 = pool.new_page().unwrap();

        assert!(matches!(pool.new_page(), Err(StorageError::PoolExhausted)));

        drop(g0);
        drop(g1);
        assert!(pool.new_page().is_ok());
    }

    #[test]
    fn test_flush_all_writes_dirty_pages() {
        let pool = small_pool(4);

        let page_no = {
            let mut guard = pool.new_page().unwrap();
            guard[0] = 9;
            guard.page_no()
        };
        pool.flush_all().unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        pool.storage().read_page(page_no, &mut buf).unwrap();
        assert_eq!(buf[0], 9);
    }

    #[test]
    fn test_fetch_missing_page() {
        let pool = small_pool(4);
        assert!(matches!(
            pool.fetch_page(17),
            Err(StorageError::PageNotFound(17))
        ));
        // The frame taken for the failed load is returned to the free list
        for _ in 0..4 {
            let guard = pool.new_page().unwrap();
            drop(guard);
        }
    }

    #[test]
    fn test_pin_count_shared_between_guards() {
        let pool = small_pool(2);
        let page_no = pool.new_page().unwrap().page_no();

        let g0 = pool.fetch_page(page_no).unwrap();
        let g1 = pool.fetch_page(page_no).unwrap();
        drop(g0);

        // Still pinned by g1; the other frame is the only candidate
        let other = pool.new_page().unwrap();
        drop(other);
        drop(g1);
    }
}

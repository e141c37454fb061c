//! RAII guards for buffer pool page access.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::page::{PageData, PageNo};
use super::pool::BufferPool;
use super::Storage;

/// Read-only access to a pinned page.
///
/// Dropping the guard unpins the page; the frame becomes an eviction
/// candidate once its pin count reaches zero.
pub struct PageReadGuard<'a, S: Storage> {
    pool: &'a BufferPool<S>,
    frame_id: usize,
    page_no: PageNo,
    lock: RwLockReadGuard<'a, PageData>,
}

impl<'a, S: Storage> PageReadGuard<'a, S> {
    pub(super) fn new(
        pool: &'a BufferPool<S>,
        frame_id: usize,
        page_no: PageNo,
        lock: RwLockReadGuard<'a, PageData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_no,
            lock,
        }
    }

    /// Returns the page number this guard pins.
    pub fn page_no(&self) -> PageNo {
        self.page_no
    }
}

impl<S: Storage> Deref for PageReadGuard<'_, S> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.lock.as_slice()
    }
}

impl<S: Storage> Drop for PageReadGuard<'_, S> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, false);
    }
}

/// Mutable access to a pinned page.
///
/// Dropping the guard unpins the page and marks the frame dirty, so the
/// modification reaches storage on eviction or flush.
pub struct PageWriteGuard<'a, S: Storage> {
    pool: &'a BufferPool<S>,
    frame_id: usize,
    page_no: PageNo,
    lock: RwLockWriteGuard<'a, PageData>,
}

impl<'a, S: Storage> PageWriteGuard<'a, S> {
    pub(super) fn new(
        pool: &'a BufferPool<S>,
        frame_id: usize,
        page_no: PageNo,
        lock: RwLockWriteGuard<'a, PageData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_no,
            lock,
        }
    }

    /// Returns the page number this guard pins.
    pub fn page_no(&self) -> PageNo {
        self.page_no
    }
}

impl<S: Storage> Deref for PageWriteGuard<'_, S> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.lock.as_slice()
    }
}

impl<S: Storage> DerefMut for PageWriteGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.lock.as_mut_slice()
    }
}

impl<S: Storage> Drop for PageWriteGuard<'_, S> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, true);
    }
}

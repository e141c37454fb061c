//! File-backed storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::page::{byte_offset, PageNo, PAGE_SIZE};
use super::{Storage, StorageError};

/// File-backed storage.
///
/// Stores pages as contiguous 8KB blocks in a single file:
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (8KB)     | Page 1 (8KB)     | Page 2 (8KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 8192      ^ offset 16384
/// ```
///
/// A mutex around the file handle serializes seek+read/write pairs.
/// Durability requires an explicit [`sync_all`](Storage::sync_all); until
/// then writes may sit in the OS page cache.
pub struct FileStorage {
    path: PathBuf,
    file: Mutex<File>,
    page_count: AtomicU32,
}

impl FileStorage {
    /// Creates a new storage file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` with kind `AlreadyExists` if the path is
    /// already taken.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU32::new(0),
        })
    }

    /// Opens an existing storage file.
    ///
    /// The page count is derived from the file size.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file size is not a multiple
    /// of `PAGE_SIZE`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU32::new(page_count),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        if page_no >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_no));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset(page_no)))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_no: PageNo, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        if page_no >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_no));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset(page_no)))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageNo, StorageError> {
        let mut file = self.file.lock();

        let page_no = self.page_count.load(Ordering::Acquire);
        file.seek(SeekFrom::Start(byte_offset(page_no)))?;
        file.write_all(&[0u8; PAGE_SIZE])?;

        self.page_count.store(page_no + 1, Ordering::Release);
        Ok(page_no)
    }

    fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::Acquire)
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

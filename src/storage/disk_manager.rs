//! Disk Manager - low-level file I/O for database pages.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// Pages are laid out sequentially; page N lives at file offset
/// `N * PAGE_SIZE`.
///
/// Because a sharded pool allocates page ids by instance offset
/// (instance k of N owns ids k, k+N, k+2N, ...), pages are not written
/// in dense order. `write_page` extends the file as needed and a read of
/// a page that has never been written returns zeroes, which is the
/// defined content of an allocated-but-unflushed page.
///
/// # Thread Safety
/// `DiskManager` is single-threaded. Callers (the buffer pool) serialize
/// access behind a mutex.
///
/// # Durability
/// Every write is followed by `fsync()`. Conservative, and the simplest
/// thing that is correct until a WAL takes over durability.
pub struct DiskManager {
    file: File,
    /// One past the highest page id ever written.
    page_count: u32,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        debug!(path = %path.as_ref().display(), "created database file");

        Ok(Self {
            file,
            page_count: 0,
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        debug!(path = %path.as_ref().display(), page_count, "opened database file");

        Ok(Self { file, page_count })
    }

    /// Open an existing database file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Read a page from disk.
    ///
    /// A page beyond the end of the file reads as all zeroes.
    ///
    /// # Errors
    /// Returns `Error::InvalidPageId` for the INVALID sentinel, or an I/O
    /// error from the underlying read.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let mut page = Page::new();
        if page_id.0 >= self.page_count {
            // Allocated but never flushed; contents are defined as zero.
            return Ok(page);
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a page to disk, extending the file if needed.
    ///
    /// # Durability
    /// Calls `fsync()` after writing.
    ///
    /// # Errors
    /// Returns `Error::InvalidPageId` for the INVALID sentinel, or an I/O
    /// error from the underlying write.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;

        if page_id.0 >= self.page_count {
            self.page_count = page_id.0 + 1;
        }

        Ok(())
    }

    /// Allocate the next dense page on disk, initialized to zeroes.
    ///
    /// The buffer pool does not use this (it allocates ids by instance
    /// offset), but the collaborator keeps the operation for callers that
    /// manage pages directly.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.page_count);

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.file.sync_all()?;

        self.page_count += 1;
        Ok(page_id)
    }

    /// Deallocate a page.
    ///
    /// Bookkeeping stub: the file is not shrunk and the id is not reused.
    pub fn deallocate_page(&mut self, _page_id: PageId) {}

    /// One past the highest page id ever written.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (PAGE_SIZE as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManager::create(&path).unwrap();
        assert_eq!(dm.page_count(), 0);
        assert_eq!(dm.file_size(), 0);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        DiskManager::create(&path).unwrap();
        assert!(DiskManager::create(&path).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.db");

        assert!(DiskManager::open(&path).is_err());
    }

    #[test]
    fn test_write_and_read_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xAB;
        page.as_mut_slice()[100] = 0xCD;
        page.as_mut_slice()[4095] = 0xEF;

        dm.write_page(PageId::new(0), &page).unwrap();

        let read_page = dm.read_page(PageId::new(0)).unwrap();
        assert_eq!(read_page.as_slice()[0], 0xAB);
        assert_eq!(read_page.as_slice()[100], 0xCD);
        assert_eq!(read_page.as_slice()[4095], 0xEF);
    }

    #[test]
    fn test_unwritten_page_reads_as_zeroes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        let page = dm.read_page(PageId::new(7)).unwrap();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sparse_write_extends_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        // Sharded allocation skips ids; writing page 5 first is legal.
        let mut page = Page::new();
        page.as_mut_slice()[0] = 0x42;
        dm.write_page(PageId::new(5), &page).unwrap();

        assert_eq!(dm.page_count(), 6);
        assert_eq!(dm.file_size(), 6 * PAGE_SIZE as u64);

        // The hole reads as zeroes.
        let hole = dm.read_page(PageId::new(2)).unwrap();
        assert!(hole.as_slice().iter().all(|&b| b == 0));

        let read = dm.read_page(PageId::new(5)).unwrap();
        assert_eq!(read.as_slice()[0], 0x42);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::create(&path).unwrap();
            let mut page = Page::new();
            page.as_mut_slice()[0] = 0x42;
            dm.write_page(PageId::new(0), &page).unwrap();
        }

        {
            let mut dm = DiskManager::open(&path).unwrap();
            assert_eq!(dm.page_count(), 1);

            let page = dm.read_page(PageId::new(0)).unwrap();
            assert_eq!(page.as_slice()[0], 0x42);
        }
    }

    #[test]
    fn test_allocate_page_is_dense() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        for i in 0..3 {
            let page_id = dm.allocate_page().unwrap();
            assert_eq!(page_id, PageId::new(i));
        }
        assert_eq!(dm.page_count(), 3);
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        assert!(dm.read_page(PageId::INVALID).is_err());
        assert!(dm.write_page(PageId::INVALID, &Page::new()).is_err());
    }
}

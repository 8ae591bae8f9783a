//! RAII guards for page access.
//!
//! A successful fetch or new-page call hands back a guard that keeps the
//! frame pinned; dropping the guard releases the pin. This pairs every
//! acquisition with exactly one release by construction:
//! - [`PageReadGuard`] - shared access, unpins clean
//! - [`PageWriteGuard`] - exclusive access, marks the page dirty on drop

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::pool_instance::BufferPoolInstance;

/// Shared read access to a pinned page.
///
/// Multiple read guards for the same page may coexist. On drop the data
/// lock is released first, then the pin; a concurrent evictor can
/// therefore never wait on this guard while it waits on the pool.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolInstance,
    frame_id: FrameId,
    page_id: PageId,
    /// None once the guard has been dropped explicitly.
    lock: Option<RwLockReadGuard<'a, Page>>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolInstance,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            lock: Some(lock),
        }
    }

    /// The guarded page's id.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The frame holding the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the page early. Idempotent; the guard must not be
    /// dereferenced afterwards.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.pool.unpin_page(self.page_id, false);
        }
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_deref().expect("page guard used after drop_guard")
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// Exclusive write access to a pinned page.
///
/// On drop the page is marked dirty and unpinned, in that order relative
/// to the data lock as described on [`PageReadGuard`].
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolInstance,
    frame_id: FrameId,
    page_id: PageId,
    /// None once the guard has been dropped explicitly.
    lock: Option<RwLockWriteGuard<'a, Page>>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolInstance,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            lock: Some(lock),
        }
    }

    /// The guarded page's id.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The frame holding the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the page early, marking it dirty. Idempotent; the guard
    /// must not be dereferenced afterwards.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.pool.unpin_page(self.page_id, true);
        }
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_deref().expect("page guard used after drop_guard")
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.lock
            .as_deref_mut()
            .expect("page guard used after drop_guard")
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

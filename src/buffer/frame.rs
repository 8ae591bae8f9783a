//! Frame - a slot in the buffer pool.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A frame in the buffer pool: one page of data plus the metadata the
/// pool needs to manage it.
///
/// - which page is resident (`None` means the frame is free)
/// - pin count, the number of outstanding users
/// - dirty flag, set when the contents differ from the on-disk page
///
/// # Thread Safety
/// Page data sits behind a `RwLock` so readers of a pinned page can
/// proceed in parallel. The metadata fields use interior mutability so
/// the pool can hand out `&Frame`, but every metadata *transition* is
/// made while holding the owning pool instance's mutex; the atomics
/// exist so concurrent readers (pin-count queries, guards) need no lock.
pub struct Frame {
    /// The page data.
    page: RwLock<Page>,

    /// Resident page, or None if the frame is free.
    page_id: Mutex<Option<PageId>>,

    /// Number of outstanding users of this frame.
    pin_count: AtomicU32,

    /// True iff the contents differ from the on-disk page.
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a new free frame with a zeroed buffer.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Acquire a read lock on the page data.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Acquire a write lock on the page data.
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// The resident page, or None if the frame is free.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    /// Set or clear the resident page.
    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    /// Increment the pin count. Returns the new count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count if it is non-zero.
    ///
    /// Returns the new count, or None if the frame was not pinned; in
    /// that case the caller has an unpin without a matching pin and the
    /// frame is left untouched.
    #[inline]
    pub fn try_unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|old| old - 1)
    }

    /// Current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    /// Whether the frame has outstanding users.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Mark the contents as modified. Cleared only by flush or eviction.
    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }

    /// Clear the dirty flag after a write-back.
    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    /// Whether the contents differ from the on-disk page.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    /// Whether the frame holds no page.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.page_id().is_none()
    }

    /// Return the frame to its free state: no page, unpinned, clean,
    /// zeroed buffer.
    pub fn reset(&self) {
        self.page_mut().reset();
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Relaxed);
        self.is_dirty.store(false, Ordering::Relaxed);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

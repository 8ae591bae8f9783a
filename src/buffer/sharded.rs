//! Sharded buffer pool - composes independent pool instances.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{
    BufferPoolInstance, PageReadGuard, PageWriteGuard, StatsSnapshot,
};
use crate::common::{Error, PageId, Result};
use crate::recovery::LogManager;
use crate::storage::DiskManager;

/// A buffer pool sharded over `num_instances` independent
/// [`BufferPoolInstance`]s, all backed by one disk manager.
///
/// Per-page operations route to shard `page_id % num_instances`, so two
/// operations on different shards never contend on the same instance
/// mutex. New pages are allocated round-robin: a rotating cursor picks
/// the shard to try first, and each call advances it by one so new-page
/// load spreads evenly.
///
/// Page ids partition the address space disjointly across shards; no
/// cross-shard ordering exists or is needed.
pub struct ShardedBufferPool {
    instances: Vec<BufferPoolInstance>,

    /// Shard to try first on the next [`new_page`](Self::new_page) call.
    round_robin: Mutex<usize>,
}

impl ShardedBufferPool {
    /// Create a pool of `num_instances` shards with `pool_size` frames
    /// each.
    ///
    /// # Panics
    /// Panics if `num_instances` or `pool_size` is 0.
    pub fn new(
        num_instances: u32,
        pool_size: usize,
        disk_manager: Arc<Mutex<DiskManager>>,
    ) -> Self {
        Self::with_log_manager(num_instances, pool_size, disk_manager, None)
    }

    /// As [`new`](Self::new), threading the reserved log collaborator
    /// through to every shard.
    pub fn with_log_manager(
        num_instances: u32,
        pool_size: usize,
        disk_manager: Arc<Mutex<DiskManager>>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "num_instances must be > 0");

        let instances = (0..num_instances)
            .map(|index| {
                BufferPoolInstance::with_sharding(
                    pool_size,
                    num_instances,
                    index,
                    Arc::clone(&disk_manager),
                    log_manager.clone(),
                )
            })
            .collect();

        Self {
            instances,
            round_robin: Mutex::new(0),
        }
    }

    /// The shard responsible for `page_id`.
    fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let shard = page_id.shard_of(self.instances.len() as u32);
        &self.instances[shard as usize]
    }

    /// Fetch a page for shared read access from its shard.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        self.instance_for(page_id).fetch_page_read(page_id)
    }

    /// Fetch a page for exclusive write access from its shard.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        self.instance_for(page_id).fetch_page_write(page_id)
    }

    /// Like [`fetch_page_read`](Self::fetch_page_read), folding every
    /// failure into None.
    pub fn checked_read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        self.fetch_page_read(page_id).ok()
    }

    /// Like [`fetch_page_write`](Self::fetch_page_write), folding every
    /// failure into None.
    pub fn checked_write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        self.fetch_page_write(page_id).ok()
    }

    /// Allocate a new page on the first shard with a usable frame.
    ///
    /// Starting from the rotating cursor, each shard is tried once; the
    /// cursor advances by one per call whether or not allocation
    /// succeeds.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if every frame of every shard is pinned
    /// - I/O errors from writing back a dirty victim
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let mut cursor = self.round_robin.lock();
        let start = *cursor;
        *cursor = (*cursor + 1) % self.instances.len();

        for offset in 0..self.instances.len() {
            let index = (start + offset) % self.instances.len();
            match self.instances[index].new_page() {
                Ok(guard) => return Ok(guard),
                Err(Error::NoFreeFrames) => continue,
                Err(e) => return Err(e),
            }
        }

        debug!("every shard is fully pinned");
        Err(Error::NoFreeFrames)
    }

    /// Delete a page via its shard.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        self.instance_for(page_id).delete_page(page_id)
    }

    /// Flush a page via its shard.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).flush_page(page_id)
    }

    /// Flush every dirty page of every shard.
    pub fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    /// Total number of frames across all shards.
    pub fn size(&self) -> usize {
        self.instances
            .iter()
            .map(BufferPoolInstance::pool_size)
            .sum()
    }

    /// Number of shards.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// One shard, by index. Useful for per-shard introspection.
    pub fn instance(&self, index: usize) -> &BufferPoolInstance {
        &self.instances[index]
    }

    /// Pin count of a resident page, routed to its shard.
    pub fn pin_count_of(&self, page_id: PageId) -> Option<u32> {
        self.instance_for(page_id).pin_count_of(page_id)
    }

    /// Whether the page is resident in its shard.
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.instance_for(page_id).contains_page(page_id)
    }

    /// Counters summed over all shards.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.instances
            .iter()
            .map(|instance| instance.stats().snapshot())
            .fold(StatsSnapshot::default(), StatsSnapshot::merge)
    }
}

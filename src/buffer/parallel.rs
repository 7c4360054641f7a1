//! Sharded buffer pool front.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard};
use crate::common::{Error, PageId, Result};
use crate::storage::DiskManager;

/// A thin dispatcher over N independent [`BufferPoolManager`] instances.
///
/// Every page id belongs to exactly one instance (`pid % N`), and instances
/// allocate ids pre-striped over the same modulus, so routing is
/// deterministic and shards never collide or share a counter. The front has
/// no lock of its own; the per-instance mutexes provide all ordering, and no
/// ordering is guaranteed across shards.
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolManager>,

    /// Round-robin cursor for spreading `new_page` across instances.
    next_instance: AtomicUsize,
}

impl ParallelBufferPool {
    /// Create `num_instances` pool instances of `pool_size` frames each.
    ///
    /// `make_disk` is called once per instance; each shard owns its own
    /// backing store.
    ///
    /// # Panics
    /// Panics if `num_instances` is 0 (or `pool_size` is 0, via the
    /// instance constructor).
    pub fn new<D, F>(pool_size: usize, num_instances: u32, mut make_disk: F) -> Self
    where
        D: DiskManager + 'static,
        F: FnMut(u32) -> D,
    {
        assert!(num_instances > 0, "num_instances must be > 0");

        let instances = (0..num_instances)
            .map(|index| {
                BufferPoolManager::new_instance(pool_size, num_instances, index, make_disk(index), None)
            })
            .collect();

        Self {
            instances,
            next_instance: AtomicUsize::new(0),
        }
    }

    /// Number of instances behind the front.
    pub fn num_instances(&self) -> u32 {
        self.instances.len() as u32
    }

    /// Total number of frames across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|pool| pool.pool_size()).sum()
    }

    /// The instance responsible for `page_id`.
    fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        &self.instances[(page_id.0 as usize) % self.instances.len()]
    }

    /// Allocate a fresh page on one of the instances.
    ///
    /// Starts at the round-robin cursor and tries each instance at most
    /// once, so a single full shard does not fail the whole front.
    ///
    /// # Errors
    /// - [`Error::NoFreeFrames`] if every instance is fully pinned
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let n = self.instances.len();
        let start = self.next_instance.fetch_add(1, Ordering::Relaxed) % n;

        for offset in 0..n {
            match self.instances[(start + offset) % n].new_page() {
                Err(Error::NoFreeFrames) => continue,
                other => return other,
            }
        }

        Err(Error::NoFreeFrames)
    }

    /// Fetch a page with shared access from its owning instance.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.instance_for(page_id).fetch_page_read(page_id)
    }

    /// Fetch a page with exclusive access from its owning instance.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.instance_for(page_id).fetch_page_write(page_id)
    }

    /// Drop one pin on `page_id` at its owning instance.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        if !page_id.is_valid() {
            return false;
        }
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    /// Flush `page_id` at its owning instance.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        self.instance_for(page_id).flush_page(page_id)
    }

    /// Flush every resident page on every instance.
    pub fn flush_all_pages(&self) -> Result<()> {
        for pool in &self.instances {
            pool.flush_all_pages()?;
        }
        Ok(())
    }

    /// Delete `page_id` at its owning instance.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(true);
        }
        self.instance_for(page_id).delete_page(page_id)
    }
}

//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting
//! - Dirty write-back before any frame reuse
//! - Pluggable eviction policies
//! - Pre-striped page id allocation for sharded deployments

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::replacer::{LruReplacer, Replacer};
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FrameId, PageId, Result};
use crate::recovery::LogManager;
use crate::storage::DiskManager;

/// Structural state of the pool. One mutex guards all of it, including the
/// disk manager: every public operation is a single critical section, so
/// between any two operations the pool invariants hold:
///
/// - the page table maps `pid -> fid` iff frame `fid` holds `pid`
/// - a frame is on the free list or in the page table, never both
/// - the replacer's eviction set is exactly the resident frames with
///   `pin_count == 0`
struct PoolCore {
    /// Maps resident page ids to frame ids.
    page_table: HashMap<PageId, FrameId>,

    /// Frames holding no page (LIFO for cache locality).
    free_list: Vec<FrameId>,

    /// Eviction policy for selecting victim frames.
    replacer: Box<dyn Replacer>,

    /// Handles all disk I/O, serialized by the pool mutex.
    disk: Box<dyn DiskManager>,

    /// Next page id this instance may hand out; steps by `num_instances`.
    next_page_id: u32,
}

/// Manages a fixed pool of buffer frames caching disk pages.
///
/// # Architecture
/// ```text
/// ┌────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                       │
/// │  ┌───────────────────────────┐  ┌──────────────────────┐  │
/// │  │ core: Mutex<PoolCore>     │  │  frames: Vec<Frame>  │  │
/// │  │  page_table  PageId→Fid ──┼─▶│ [F0] [F1] [F2] ...   │  │
/// │  │  free_list   replacer     │  │ data: RwLock<Page>   │  │
/// │  │  disk        next_page_id │  │ meta: pin, dirty, id │  │
/// │  └───────────────────────────┘  └──────────────────────┘  │
/// └────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// Structural transitions (free list, page table, replacer, frame metadata,
/// disk I/O) all happen under the single `core` mutex. Page data sits in the
/// frames behind per-frame `RwLock`s, acquired only after the mutex is
/// released, so pin holders read and write page content without blocking the
/// pool. A frame with outstanding pins is never evicted, overwritten, or
/// relocated.
///
/// # Usage
/// ```ignore
/// let disk = FileDiskManager::create("test.db")?;
/// let pool = BufferPoolManager::new(64, disk, None);
///
/// let mut guard = pool.new_page()?;
/// guard.as_mut_slice()[0] = 0xAB;
/// drop(guard); // unpins, reports dirty
///
/// let guard = pool.fetch_page_read(page_id)?;
/// let data = guard.as_slice();
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup, never moved.
    frames: Vec<Frame>,

    core: Mutex<PoolCore>,

    /// Performance counters, lock-free.
    stats: BufferPoolStats,

    /// Write-ahead log hook. Held for WAL integration; the pool does not
    /// drive it yet.
    #[allow(dead_code)]
    log_manager: Option<LogManager>,

    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
}

impl BufferPoolManager {
    /// Create a standalone pool (a single instance owning the whole page id
    /// space).
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new<D>(pool_size: usize, disk_manager: D, log_manager: Option<LogManager>) -> Self
    where
        D: DiskManager + 'static,
    {
        Self::new_instance(pool_size, 1, 0, disk_manager, log_manager)
    }

    /// Create one instance of a sharded pool.
    ///
    /// The instance only allocates page ids congruent to `instance_index`
    /// modulo `num_instances`, so instances never collide without sharing a
    /// counter.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0, `num_instances` is 0, or
    /// `instance_index >= num_instances`.
    pub fn new_instance<D>(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: D,
        log_manager: Option<LogManager>,
    ) -> Self
    where
        D: DiskManager + 'static,
    {
        Self::with_replacer(
            pool_size,
            num_instances,
            instance_index,
            disk_manager,
            log_manager,
            Box::new(LruReplacer::new()),
        )
    }

    /// Create an instance with an explicit eviction policy.
    pub fn with_replacer<D>(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: D,
        log_manager: Option<LogManager>,
        replacer: Box<dyn Replacer>,
    ) -> Self
    where
        D: DiskManager + 'static,
    {
        assert!(pool_size > 0, "pool_size must be > 0");
        assert!(num_instances > 0, "num_instances must be > 0");
        assert!(
            instance_index < num_instances,
            "instance_index must be < num_instances"
        );

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: Vec<FrameId> = (0..pool_size).map(FrameId::new).collect();

        Self {
            frames,
            core: Mutex::new(PoolCore {
                page_table: HashMap::new(),
                free_list,
                replacer,
                disk: Box::new(disk_manager),
                next_page_id: instance_index,
            }),
            stats: BufferPoolStats::new(),
            log_manager,
            pool_size,
            num_instances,
            instance_index,
        }
    }

    // ========================================================================
    // Public API: create, fetch
    // ========================================================================

    /// Allocate a fresh page and pin it in a frame.
    ///
    /// The frame is secured first and the page id allocated only afterwards,
    /// so a full pool never burns ids. The returned guard starts zeroed with
    /// `pin_count == 1`.
    ///
    /// # Errors
    /// - [`Error::NoFreeFrames`] if every frame is pinned
    /// - I/O errors from flushing a dirty victim
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let (frame_id, page_id) = {
            let mut core = self.core.lock();

            let frame_id = self
                .acquire_frame(&mut core)?
                .ok_or(Error::NoFreeFrames)?;
            let page_id = self.allocate_page_id(&mut core);

            let frame = &self.frames[frame_id.0];
            frame.page_mut().reset();
            frame.set_page_id(Some(page_id));
            frame.pin();

            core.page_table.insert(page_id, frame_id);
            core.replacer.pin(frame_id);

            debug!(page_id = page_id.0, frame_id = frame_id.0, "new page");
            (frame_id, page_id)
        };

        let latch = self.frames[frame_id.0].page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, latch))
    }

    /// Fetch a page with shared access.
    ///
    /// A resident page is pinned in place; anything else is read from disk
    /// into a free or victimized frame.
    ///
    /// # Errors
    /// - [`Error::InvalidPageId`] for the sentinel id
    /// - [`Error::NoFreeFrames`] if the page is absent and every frame is
    ///   pinned
    /// - I/O errors from the disk manager
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let latch = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_id, latch))
    }

    /// Fetch a page with exclusive access.
    ///
    /// Same contract as [`fetch_page_read`](Self::fetch_page_read); the
    /// returned guard reports the page dirty when it drops.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_id)?;
        let latch = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, latch))
    }

    // ========================================================================
    // Public API: unpin, flush, delete
    // ========================================================================

    /// Drop one pin on `page_id`, ORing `is_dirty` into the frame's dirty
    /// flag.
    ///
    /// The flag only ORs: once any unpin reported dirty, later clean unpins
    /// cannot clear it, so the write-back on eviction or flush is never
    /// skipped. Unpinning never writes to disk by itself.
    ///
    /// Returns false if the page is not resident or its pin count is already
    /// zero (a caller protocol violation; diagnostic, not fatal).
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut core = self.core.lock();

        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.0];
        if !frame.is_pinned() {
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }

        if frame.unpin() == 0 {
            core.replacer.unpin(frame_id);
        }

        true
    }

    /// Write `page_id`'s frame to disk and mark it clean.
    ///
    /// Writes unconditionally, even if the frame is clean, and works on
    /// pinned pages; the pool mutex orders the write against mutators.
    /// Blocks while an exclusive guard for the page is held.
    ///
    /// Returns `Ok(false)` for the sentinel id or a page that is not
    /// resident.
    ///
    /// # Errors
    /// - I/O errors from the disk write
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        let mut core = self.core.lock();
        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return Ok(false);
        };

        self.write_frame(&mut core, frame_id, page_id)?;
        Ok(true)
    }

    /// Flush every resident page.
    ///
    /// Only frames holding a valid page participate; free frames are never
    /// touched.
    ///
    /// # Errors
    /// - I/O errors from the disk writes
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut core = self.core.lock();

        let resident: Vec<(PageId, FrameId)> =
            core.page_table.iter().map(|(&pid, &fid)| (pid, fid)).collect();

        for (page_id, frame_id) in resident {
            self.write_frame(&mut core, frame_id, page_id)?;
        }

        Ok(())
    }

    /// Drop `page_id` from the pool and hand the id back to the disk layer.
    ///
    /// Returns `Ok(true)` vacuously when the page is not resident, and
    /// `Ok(false)` when it is resident but pinned. On success the frame is
    /// zeroed and returned to the free list.
    ///
    /// # Errors
    /// - I/O errors from the deallocation hook
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut core = self.core.lock();

        let Some(&frame_id) = core.page_table.get(&page_id) else {
            // Deleting an absent page succeeds without side effects.
            return Ok(true);
        };

        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Ok(false);
        }

        core.disk.deallocate_page(page_id)?;

        core.page_table.remove(&page_id);
        // The frame must not be reachable for victimization once free.
        core.replacer.pin(frame_id);
        frame.reset();
        core.free_list.push(frame_id);

        trace!(page_id = page_id.0, frame_id = frame_id.0, "deleted page");
        Ok(true)
    }

    // ========================================================================
    // Public API: introspection
    // ========================================================================

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of instances in the sharded deployment this pool belongs to.
    pub fn num_instances(&self) -> u32 {
        self.num_instances
    }

    /// This pool's index within its sharded deployment.
    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Number of frames currently holding no page.
    pub fn free_frame_count(&self) -> usize {
        self.core.lock().free_list.len()
    }

    /// Number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.core.lock().page_table.len()
    }

    /// Whether `page_id` is currently resident.
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.core.lock().page_table.contains_key(&page_id)
    }

    /// Pin count of a resident page, or None if the page is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let core = self.core.lock();
        let &frame_id = core.page_table.get(&page_id)?;
        Some(self.frames[frame_id.0].pin_count())
    }

    // ========================================================================
    // Internal: fetch logic
    // ========================================================================

    fn fetch_page_internal(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let mut core = self.core.lock();

        // Fast path: already resident.
        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0];
            frame.pin();
            core.replacer.pin(frame_id);
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(frame_id);
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let frame_id = self
            .acquire_frame(&mut core)?
            .ok_or(Error::NoFreeFrames)?;

        let frame = &self.frames[frame_id.0];
        frame.set_page_id(Some(page_id));
        frame.pin();

        core.page_table.insert(page_id, frame_id);
        core.replacer.pin(frame_id);

        {
            let mut page = frame.page_mut();
            core.disk.read_page(page_id, &mut page)?;
        }
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: frame acquisition and write-back
    // ========================================================================

    /// Secure a reusable frame: free list first, then the replacer. A dirty
    /// victim is written back before its frame is handed out. Returns
    /// Ok(None) when every frame is pinned.
    fn acquire_frame(&self, core: &mut PoolCore) -> Result<Option<FrameId>> {
        if let Some(frame_id) = core.free_list.pop() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = core.replacer.victim() else {
            return Ok(None);
        };
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);

        let frame = &self.frames[frame_id.0];
        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                self.write_frame(core, frame_id, old_page_id)?;
            }
            core.page_table.remove(&old_page_id);
            debug!(
                page_id = old_page_id.0,
                frame_id = frame_id.0,
                "evicted page"
            );
        }
        frame.set_page_id(None);

        Ok(Some(frame_id))
    }

    /// Write a frame's content to disk and mark it clean.
    fn write_frame(&self, core: &mut PoolCore, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];

        {
            let page = frame.page();
            core.disk.write_page(page_id, &page)?;
        }
        frame.clear_dirty();

        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        trace!(page_id = page_id.0, "wrote page");
        Ok(())
    }

    // ========================================================================
    // Internal: page id allocation
    // ========================================================================

    /// Hand out the next page id in this instance's stride.
    fn allocate_page_id(&self, core: &mut PoolCore) -> PageId {
        let page_id = PageId::new(core.next_page_id);
        core.next_page_id += self.num_instances;
        self.validate_page_id(page_id);
        page_id
    }

    /// Allocated ids must land back on this instance.
    fn validate_page_id(&self, page_id: PageId) {
        debug_assert_eq!(
            page_id.0 % self.num_instances,
            self.instance_index,
            "page id {} outside instance {} stride",
            page_id,
            self.instance_index
        );
    }
}

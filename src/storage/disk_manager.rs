//! Disk managers - low-level page I/O behind the buffer pool.
//!
//! The buffer pool consumes the [`DiskManager`] capability set and owns page
//! id allocation itself, so a disk manager only has to read, write and
//! deallocate pages by id. Two implementations are provided:
//! - [`FileDiskManager`] - pages laid out sequentially in a single file
//! - [`MemDiskManager`] - a HashMap-backed store with an observable write log

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};
use crate::storage::page::Page;

/// The capability set the buffer pool needs from a backing store.
///
/// Methods take `&mut self`; the pool serializes all disk access behind its
/// own mutex, so implementations do not need internal synchronization.
///
/// Failures are catastrophic at this layer. A read of a page id that was
/// never written is not an error; it yields a zeroed page.
pub trait DiskManager: Send {
    /// Fill `page` with the persisted content of `page_id`.
    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()>;

    /// Persist `page` as the content of `page_id`.
    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()>;

    /// Mark `page_id` as recoverable/unused at the disk layer.
    fn deallocate_page(&mut self, page_id: PageId) -> Result<()>;
}

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// Pages are laid out sequentially; page N lives at file offset
/// `N * PAGE_SIZE`. Writing a page extends the file as needed, so the file
/// may be sparse when page ids are striped across pool instances.
///
/// # Durability
/// Every write is followed by `fsync()`. Conservative, and the place to
/// revisit once group commit exists.
pub struct FileDiskManager {
    file: File,
    /// Number of page slots the file currently covers.
    file_pages: u32,
    /// Ids handed back through `deallocate_page`.
    deallocated: HashSet<PageId>,
}

impl FileDiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            file_pages: 0,
            deallocated: HashSet::new(),
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let file_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file,
            file_pages,
            deallocated: HashSet::new(),
        })
    }

    /// Open an existing database file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Number of page slots covered by the file so far.
    #[inline]
    pub fn file_pages(&self) -> u32 {
        self.file_pages
    }

    /// Total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.file_pages as u64) * (PAGE_SIZE as u64)
    }

    /// Whether `page_id` has been handed back through `deallocate_page`.
    pub fn is_deallocated(&self, page_id: PageId) -> bool {
        self.deallocated.contains(&page_id)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        // Never-written pages read back as zeros.
        if page_id.0 >= self.file_pages {
            page.reset();
            return Ok(());
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(page.as_mut_slice())?;

        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;

        self.file_pages = self.file_pages.max(page_id.0 + 1);
        self.deallocated.remove(&page_id);

        Ok(())
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        // The slot stays in the file; reclaiming space is a compaction
        // concern, not a paging one.
        self.deallocated.insert(page_id);
        Ok(())
    }
}

/// Shared mutable state behind a [`MemDiskManager`] handle.
#[derive(Default)]
struct MemDiskState {
    pages: HashMap<PageId, Box<Page>>,
    write_log: Vec<PageId>,
    deallocated: HashSet<PageId>,
}

/// An in-memory backing store.
///
/// Cloning yields another handle to the same store, which makes this the
/// observable double for tests: hand one clone to the pool and keep the
/// other to inspect the write log after the fact. Also usable for embedding
/// a pool with no file system at all.
#[derive(Clone, Default)]
pub struct MemDiskManager {
    state: Arc<Mutex<MemDiskState>>,
}

impl MemDiskManager {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every page id written so far, in write order.
    pub fn write_log(&self) -> Vec<PageId> {
        self.state.lock().write_log.clone()
    }

    /// How many times `page_id` has been written.
    pub fn write_count(&self, page_id: PageId) -> usize {
        self.state
            .lock()
            .write_log
            .iter()
            .filter(|&&pid| pid == page_id)
            .count()
    }

    /// Number of distinct pages the store holds.
    pub fn page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Whether `page_id` has been handed back through `deallocate_page`.
    pub fn is_deallocated(&self, page_id: PageId) -> bool {
        self.state.lock().deallocated.contains(&page_id)
    }
}

impl DiskManager for MemDiskManager {
    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        let state = self.state.lock();
        match state.pages.get(&page_id) {
            Some(stored) => page.copy_from(stored),
            None => page.reset(),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let mut state = self.state.lock();
        let stored = state
            .pages
            .entry(page_id)
            .or_insert_with(|| Box::new(Page::new()));
        stored.copy_from(page);
        state.write_log.push(page_id);
        state.deallocated.remove(&page_id);
        Ok(())
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.state.lock().deallocated.insert(page_id);
        Ok(())
    }
}

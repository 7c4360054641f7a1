//! RAII guards for pinned pages.
//!
//! A guard is the caller-visible form of a pin: it is bound to the pool's
//! lifetime, names the frame it pins, and exposes the page data. Dropping
//! the guard unpins the page; a [`PageWriteGuard`] reports it dirty, a
//! [`PageReadGuard`] reports it clean. Callers who want to manage the
//! pin/dirty bookkeeping themselves can [`detach`](PageWriteGuard::detach)
//! the guard and later call [`BufferPoolManager::unpin_page`] with a
//! `(page_id, dirty)` pair of their own.
//!
//! Lock order: guards always release the page latch before the unpin takes
//! the pool mutex, so a flusher holding the pool mutex and waiting on the
//! page latch cannot deadlock with a guard being dropped.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// Shared read access to a pinned page.
///
/// Multiple read guards may exist for the same page at once.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    /// None once the guard has been dropped or detached.
    latch: Option<RwLockReadGuard<'a, Page>>,
    unpin_on_drop: bool,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            latch: Some(latch),
            unpin_on_drop: true,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the latch and the pin now instead of at end of scope.
    /// Calling it again is a no-op.
    pub fn drop_guard(&mut self) {
        if let Some(latch) = self.latch.take() {
            drop(latch);
            if self.unpin_on_drop {
                self.pool.unpin_page(self.page_id, false);
            }
        }
    }

    /// Release the latch but keep the pin. The caller takes over the
    /// obligation to call `unpin_page(page_id, ..)` exactly once.
    pub fn detach(mut self) -> PageId {
        self.unpin_on_drop = false;
        self.latch.take();
        self.page_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.latch.as_ref().expect("page guard used after drop_guard")
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// Exclusive write access to a pinned page.
///
/// Dropping the guard reports the page dirty; the pool keeps the dirty flag
/// sticky until the next flush, so a later clean unpin cannot launder it.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    /// None once the guard has been dropped or detached.
    latch: Option<RwLockWriteGuard<'a, Page>>,
    unpin_on_drop: bool,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            latch: Some(latch),
            unpin_on_drop: true,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the latch and the pin now instead of at end of scope.
    /// Calling it again is a no-op.
    pub fn drop_guard(&mut self) {
        if let Some(latch) = self.latch.take() {
            drop(latch);
            if self.unpin_on_drop {
                self.pool.unpin_page(self.page_id, true);
            }
        }
    }

    /// Release the latch but keep the pin. The caller takes over the
    /// obligation to call `unpin_page(page_id, dirty)` exactly once, and
    /// with it the choice of dirty flag.
    pub fn detach(mut self) -> PageId {
        self.unpin_on_drop = false;
        self.latch.take();
        self.page_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.latch.as_ref().expect("page guard used after drop_guard")
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.latch.as_mut().expect("page guard used after drop_guard")
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

//! Page pins as owned guards.

use super::frame::FrameId;
use super::pool::BufferPool;
use crate::storage::{PageId, Storage};

/// An owned pin on a buffered page.
///
/// While the guard is alive the page cannot be evicted. Dropping the guard
/// unpins the page, handing the pool the dirty bit accumulated over the
/// pin's lifetime; the page reaches disk on eviction or
/// [`BufferPool::flush_all`].
///
/// Page bytes are accessed through short closures ([`with`](Self::with) /
/// [`with_mut`](Self::with_mut)) that take the frame's data lock only for
/// the duration of the closure. A guard held across `await` points
/// therefore pins the page without latching it, and several guards on the
/// same page can coexist.
///
/// `with_mut` marks the pin dirty; a caller that mutates the page through
/// a previously obtained pointer-equivalent (e.g. re-reads it as clean)
/// can use [`mark_dirty`](Self::mark_dirty) directly.
pub struct PageGuard<'a, S: Storage> {
    pool: &'a BufferPool<S>,
    frame_id: FrameId,
    page_id: PageId,
    dirty: bool,
}

impl<'a, S: Storage> PageGuard<'a, S> {
    pub(super) fn new(pool: &'a BufferPool<S>, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            dirty: false,
        }
    }

    /// The id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Whether this pin will be released dirty.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flags the pinned page as modified.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Runs `f` over the page bytes.
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.pool.frame_data(self.frame_id).read();
        f(data.as_slice())
    }

    /// Runs `f` over the page bytes mutably and marks the pin dirty.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.dirty = true;
        let mut data = self.pool.frame_data(self.frame_id).write();
        f(data.as_mut_slice())
    }
}

impl<S: Storage> Drop for PageGuard<'_, S> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, self.dirty);
    }
}

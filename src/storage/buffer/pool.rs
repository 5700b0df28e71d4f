//! Buffer pool: cached pages with pin counting and dirty tracking.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use super::error::BufferPoolError;
use super::frame::{Frame, FrameId, FrameMetadata};
use super::guard::PageGuard;
use super::replacer::LruReplacer;
use crate::storage::{PAGE_SIZE, PageData, PageId, Storage};

/// Buffer pool over a [`Storage`] backend.
///
/// The pool keeps a fixed number of frames and maps file pages onto them
/// on demand. Pages are handed out pinned, as [`PageGuard`]s; a frame with
/// outstanding pins is never evicted. When no frame is free, the least
/// recently unpinned page is evicted, writing it back first if some pin
/// released it dirty.
///
/// ```text
/// +-------------------+
/// | Heap file layer   |
/// +-------------------+
///          |  fetch_page / alloc_page -> PageGuard
///          v
/// +-------------------+
/// | BufferPool        |
/// +-------------------+
///          |  read_page / write_page / allocate_page
///          v
/// +-------------------+
/// | Storage (trait)   |
/// +-------------------+
/// ```
///
/// The pool assumes the cooperative single-owner model of the heap layer:
/// one logical agent drives each pool, operations run to completion, and
/// pins released from `Drop` only touch the (synchronous) state mutex.
pub struct BufferPool<S: Storage> {
    /// The underlying storage backend.
    storage: S,

    /// Frame buffers; each one's bytes behind its own lock.
    frames: Vec<Frame>,

    /// Page table, per-frame metadata, free list and replacement policy.
    state: Mutex<PoolState>,

    /// Number of frames in the pool.
    pool_size: usize,
}

struct PoolState {
    /// Maps resident pages to their frames.
    page_table: HashMap<PageId, FrameId>,

    /// Bookkeeping per frame, indexed by `FrameId`.
    frame_metadata: Vec<FrameMetadata>,

    /// Frames not currently holding any page.
    free_list: Vec<FrameId>,

    /// Eviction policy over fully unpinned frames.
    replacer: LruReplacer,
}

impl<S: Storage> BufferPool<S> {
    /// Creates a buffer pool with `pool_size` frames over `storage`.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn new(storage: S, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<_> = (0..pool_size).map(|_| Frame::new()).collect();
        let frame_metadata: Vec<_> = (0..pool_size).map(|_| FrameMetadata::new()).collect();
        let free_list: Vec<_> = (0..pool_size).map(FrameId::new).collect();

        Self {
            storage,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                frame_metadata,
                free_list,
                replacer: LruReplacer::new(),
            }),
            pool_size,
        }
    }

    /// Reads a page into the pool and pins it.
    ///
    /// A page already resident just gains a pin; otherwise it is read from
    /// storage into a free or evicted frame.
    ///
    /// # Errors
    ///
    /// `BufferPoolError::NoFreeFrames` if every frame is pinned;
    /// `BufferPoolError::PageNotFound` if storage has no such page;
    /// storage I/O errors pass through.
    pub async fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_, S>, BufferPoolError> {
        let frame_id = self.get_or_load_frame(page_id).await?;
        Ok(PageGuard::new(self, frame_id, page_id))
    }

    /// Allocates a new page in storage and pins it.
    ///
    /// The page starts zeroed.
    pub async fn alloc_page(&self) -> Result<PageGuard<'_, S>, BufferPoolError> {
        let page_id = self.storage.allocate_page().await?;
        self.fetch_page(page_id).await
    }

    /// Writes one page back to storage if it is resident and dirty.
    pub async fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let frame_id = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                Some(&fid) if state.frame_metadata[fid.as_usize()].is_dirty => Some(fid),
                _ => None,
            }
        };

        if let Some(frame_id) = frame_id {
            let buf = self.copy_frame(frame_id);
            self.storage.write_page(page_id, &buf).await?;

            let mut state = self.state.lock();
            // The frame cannot have been evicted meanwhile in the
            // single-owner model, but re-check before clearing.
            if state.frame_metadata[frame_id.as_usize()].page_id == Some(page_id) {
                state.frame_metadata[frame_id.as_usize()].is_dirty = false;
            }
        }

        Ok(())
    }

    /// Writes every dirty page back to storage and syncs it.
    pub async fn flush_all(&self) -> Result<(), BufferPoolError> {
        let dirty_pages: Vec<PageId> = {
            let state = self.state.lock();
            state
                .frame_metadata
                .iter()
                .filter(|meta| meta.is_dirty)
                .filter_map(|meta| meta.page_id)
                .collect()
        };

        for page_id in dirty_pages {
            self.flush_page(page_id).await?;
        }

        self.storage.sync_all().await?;
        Ok(())
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Outstanding pins on a page; 0 if the page is not resident.
    ///
    /// Diagnostic accessor, used by tests of the heap layer's pin
    /// discipline.
    pub fn pin_count(&self, page_id: PageId) -> u32 {
        let state = self.state.lock();
        match state.page_table.get(&page_id) {
            Some(&fid) => state.frame_metadata[fid.as_usize()].pin_count,
            None => 0,
        }
    }

    /// Access to a frame's data lock, for guards.
    pub(super) fn frame_data(&self, frame_id: FrameId) -> &RwLock<PageData> {
        &self.frames[frame_id.as_usize()].data
    }

    /// Releases one pin, folding in the pin's dirty bit.
    ///
    /// Synchronous and infallible: called from `PageGuard::drop`.
    pub(super) fn unpin(&self, frame_id: FrameId, dirty: bool) {
        let mut state = self.state.lock();
        let meta = &mut state.frame_metadata[frame_id.as_usize()];

        if meta.pin_count == 0 {
            log::warn!("unpin of frame {:?} with no outstanding pins", frame_id);
            return;
        }

        meta.pin_count -= 1;
        if dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
    }

    /// Copies a frame's bytes out under its data lock.
    ///
    /// Keeps the lock span synchronous so storage awaits never run with a
    /// frame latch held.
    fn copy_frame(&self, frame_id: FrameId) -> Vec<u8> {
        self.frames[frame_id.as_usize()].data.read().as_slice().to_vec()
    }

    /// Returns the frame caching `page_id`, loading it if necessary.
    /// The frame's pin count is incremented.
    async fn get_or_load_frame(&self, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        // Fast path: already resident.
        {
            let mut state = self.state.lock();
            if let Some(&frame_id) = state.page_table.get(&page_id) {
                state.frame_metadata[frame_id.as_usize()].pin_count += 1;
                state.replacer.pin(frame_id);
                return Ok(frame_id);
            }
        }

        // Miss: claim a frame, then read the page into it.
        let frame_id = self.claim_frame().await?;

        let mut buf = vec![0u8; PAGE_SIZE];
        if let Err(e) = self.storage.read_page(page_id, &mut buf).await {
            // Return the claimed frame so the miss does not leak it.
            self.state.lock().free_list.push(frame_id);
            return Err(e.into());
        }
        self.frames[frame_id.as_usize()]
            .data
            .write()
            .as_mut_slice()
            .copy_from_slice(&buf);

        let mut state = self.state.lock();
        state.page_table.insert(page_id, frame_id);
        let meta = &mut state.frame_metadata[frame_id.as_usize()];
        meta.page_id = Some(page_id);
        meta.pin_count = 1;
        meta.is_dirty = false;

        Ok(frame_id)
    }

    /// Takes a free frame, evicting the LRU unpinned page if none is free.
    async fn claim_frame(&self) -> Result<FrameId, BufferPoolError> {
        let (frame_id, victim) = {
            let mut state = self.state.lock();
            if let Some(frame_id) = state.free_list.pop() {
                (frame_id, None)
            } else {
                let frame_id = match state.replacer.victim() {
                    Some(fid) => fid,
                    None => return Err(BufferPoolError::NoFreeFrames),
                };
                let meta = &mut state.frame_metadata[frame_id.as_usize()];
                let victim = meta.page_id.map(|pid| (pid, meta.is_dirty));
                if let Some((pid, _)) = victim {
                    state.page_table.remove(&pid);
                }
                state.frame_metadata[frame_id.as_usize()].reset();
                (frame_id, victim)
            }
        };

        // Write back the evicted page outside the state lock.
        if let Some((old_page_id, true)) = victim {
            log::trace!("evicting dirty page {:?}", old_page_id);
            let buf = self.copy_frame(frame_id);
            if let Err(e) = self.storage.write_page(old_page_id, &buf).await {
                // Hand the frame back so the failed eviction does not leak it.
                self.state.lock().free_list.push(frame_id);
                return Err(e.into());
            }
        }

        Ok(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn pool(frames: usize) -> BufferPool<MemoryStorage> {
        BufferPool::new(MemoryStorage::new(), frames)
    }

    #[tokio::test]
    async fn test_alloc_page_is_pinned_and_zeroed() {
        let pool = pool(4);
        let guard = pool.alloc_page().await.unwrap();

        assert_eq!(guard.page_id(), PageId::new(0));
        assert_eq!(pool.pin_count(guard.page_id()), 1);
        guard.with(|data| assert!(data.iter().all(|&b| b == 0)));

        let page_id = guard.page_id();
        drop(guard);
        assert_eq!(pool.pin_count(page_id), 0);
    }

    #[tokio::test]
    async fn test_fetch_resident_page_adds_pin() {
        let pool = pool(4);
        let g1 = pool.alloc_page().await.unwrap();
        let page_id = g1.page_id();

        let g2 = pool.fetch_page(page_id).await.unwrap();
        assert_eq!(pool.pin_count(page_id), 2);

        drop(g1);
        assert_eq!(pool.pin_count(page_id), 1);
        drop(g2);
        assert_eq!(pool.pin_count(page_id), 0);
        assert_eq!(pool.resident_pages(), 1);
    }

    #[tokio::test]
    async fn test_dirty_bit_accumulates_into_frame() {
        let pool = pool(4);
        let page_id = {
            let mut guard = pool.alloc_page().await.unwrap();
            guard.with_mut(|data| data[0] = 42);
            assert!(guard.is_dirty());
            guard.page_id()
        };

        // Dirty contents must survive an eviction round trip.
        for _ in 0..4 {
            pool.alloc_page().await.unwrap();
        }
        let guard = pool.fetch_page(page_id).await.unwrap();
        guard.with(|data| assert_eq!(data[0], 42));
    }

    #[tokio::test]
    async fn test_clean_pin_does_not_dirty() {
        let pool = pool(4);
        let page_id = pool.alloc_page().await.unwrap().page_id();

        let guard = pool.fetch_page(page_id).await.unwrap();
        assert!(!guard.is_dirty());
        drop(guard);

        let state = pool.state.lock();
        let fid = state.page_table[&page_id];
        assert!(!state.frame_metadata[fid.as_usize()].is_dirty);
    }

    #[tokio::test]
    async fn test_mark_dirty_without_write() {
        let pool = pool(4);
        let page_id = pool.alloc_page().await.unwrap().page_id();

        let mut guard = pool.fetch_page(page_id).await.unwrap();
        guard.mark_dirty();
        drop(guard);

        let state = pool.state.lock();
        let fid = state.page_table[&page_id];
        assert!(state.frame_metadata[fid.as_usize()].is_dirty);
    }

    #[tokio::test]
    async fn test_eviction_on_full_pool() {
        let pool = pool(2);
        let mut page_ids = Vec::new();
        for _ in 0..4 {
            page_ids.push(pool.alloc_page().await.unwrap().page_id());
        }

        assert_eq!(pool.resident_pages(), 2);

        // Every page is still readable after eviction.
        for page_id in page_ids {
            let guard = pool.fetch_page(page_id).await.unwrap();
            assert_eq!(guard.page_id(), page_id);
        }
    }

    #[tokio::test]
    async fn test_no_free_frames_when_all_pinned() {
        let pool = pool(2);
        let _g1 = pool.alloc_page().await.unwrap();
        let _g2 = pool.alloc_page().await.unwrap();

        let result = pool.alloc_page().await;
        assert!(matches!(result, Err(BufferPoolError::NoFreeFrames)));
    }

    #[tokio::test]
    async fn test_fetch_missing_page() {
        let pool = pool(2);
        let result = pool.fetch_page(PageId::new(7)).await;
        assert!(matches!(result, Err(BufferPoolError::PageNotFound(_))));
        // The claimed frame went back to the free list.
        assert_eq!(pool.state.lock().free_list.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_all_writes_dirty_pages() {
        let storage = MemoryStorage::new();
        let pool = BufferPool::new(storage, 4);

        let page_id = {
            let mut guard = pool.alloc_page().await.unwrap();
            guard.with_mut(|data| data[10] = 9);
            guard.page_id()
        };

        pool.flush_all().await.unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        pool.storage.read_page(page_id, &mut buf).await.unwrap();
        assert_eq!(buf[10], 9);
    }
}

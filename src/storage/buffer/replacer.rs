//! LRU page replacement.

use std::collections::{HashSet, VecDeque};

use super::frame::FrameId;

/// LRU replacement policy over evictable (fully unpinned) frames.
///
/// Frames are ordered by recency of unpin; `victim()` returns the least
/// recently unpinned frame.
///
/// # Lazy removal
///
/// `pin()` removes the frame from `in_queue` only; the stale deque entry
/// is skipped during `victim()`. This keeps `pin` O(1) instead of
/// searching the deque.
pub(super) struct LruReplacer {
    /// Frames in LRU order, front = least recently used. May contain
    /// stale entries for frames that have been re-pinned.
    lru_queue: VecDeque<FrameId>,

    /// Source of truth for evictability, for O(1) membership tests.
    in_queue: HashSet<FrameId>,
}

impl LruReplacer {
    pub(super) fn new() -> Self {
        Self {
            lru_queue: VecDeque::new(),
            in_queue: HashSet::new(),
        }
    }

    /// Selects and removes the eviction victim, oldest first.
    ///
    /// Returns `None` when every frame is pinned.
    pub(super) fn victim(&mut self) -> Option<FrameId> {
        while let Some(frame_id) = self.lru_queue.pop_front() {
            if self.in_queue.remove(&frame_id) {
                return Some(frame_id);
            }
            // Stale entry for a re-pinned frame; skip it.
        }
        None
    }

    /// Marks a frame non-evictable. No-op if the frame is not tracked.
    pub(super) fn pin(&mut self, frame_id: FrameId) {
        self.in_queue.remove(&frame_id);
    }

    /// Marks a frame evictable, as the most recently used.
    pub(super) fn unpin(&mut self, frame_id: FrameId) {
        if self.in_queue.insert(frame_id) {
            self.lru_queue.push_back(frame_id);
        }
    }

    /// Number of evictable frames.
    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.in_queue.len()
    }
}

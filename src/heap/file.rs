//! Heap file creation, destruction, and the base handle.
//!
//! A heap file is a chain of slotted data pages behind a header page:
//!
//! ```text
//! +-----------+    +-----------+    +-----------+    +-----------+
//! | header    |    | data page |--->| data page |--->| data page |
//! | (page 0)  |    | first     |    |           |    | last      |
//! +-----------+    +-----------+    +-----------+    +-----------+
//!       |               ^                                  ^
//!       +--first_page---+                                  |
//!       +--last_page------------------------------------- +
//! ```
//!
//! A [`HeapFile`] handle keeps the header page pinned for its whole
//! lifetime and at most one data page (the *current* page) pinned at a
//! time. Pins are [`PageGuard`]s, so every exit path (early error returns
//! and teardown included) releases them with the dirty bit they
//! accumulated.

use bytes::Bytes;

use super::error::HeapError;
use super::header::FileHeader;
use super::page::{DataPage, RecordId};
use crate::storage::{BufferPool, FileStorage, PageGuard, PageId, Storage};

/// The header page is always the first physical page of the file.
pub const HEADER_PAGE_ID: PageId = PageId::new(0);

/// Frames used by the short-lived pool inside [`create_heap_file`].
const CREATE_POOL_SIZE: usize = 8;

/// Creates a new heap file at `path`.
///
/// The file is created, formatted with a header page and one empty data
/// page, flushed, and closed.
///
/// # Errors
///
/// Returns `HeapError::FileExists`, leaving the existing file untouched,
/// if `path` already exists. Failures from the storage layer propagate
/// as-is; a partially created file is not cleaned up.
pub async fn create_heap_file(path: impl Into<std::path::PathBuf>) -> Result<(), HeapError> {
    let path = path.into();
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let storage = FileStorage::create(&path).await?;
    let pool = BufferPool::new(storage, CREATE_POOL_SIZE);

    format_heap_file(&pool, &name).await?;
    pool.flush_all().await?;

    log::debug!("created heap file {}", path.display());
    Ok(())
}

/// Formats the (empty) storage behind `pool` as a heap file.
///
/// Allocates the header page and the initial empty data page, and writes a
/// header whose chain consists of that data page. This is the
/// storage-agnostic core of [`create_heap_file`]; call it directly to set
/// up a heap file over a [`MemoryStorage`](crate::storage::MemoryStorage)
/// pool.
pub async fn format_heap_file<S: Storage>(
    pool: &BufferPool<S>,
    name: &str,
) -> Result<(), HeapError> {
    let mut header_guard = pool.alloc_page().await?;
    debug_assert_eq!(header_guard.page_id(), HEADER_PAGE_ID);

    let mut data_guard = pool.alloc_page().await?;
    data_guard.with_mut(|data| DataPage::new(data).init());

    let header = FileHeader::new(name, data_guard.page_id());
    header_guard.with_mut(|data| header.write_to(data));

    // Both guards drop here, unpinning the pages dirty.
    Ok(())
}

/// Removes the heap file at `path`.
///
/// Delegates to the file layer; the caller must ensure no handle is open
/// on the file. The file layer's error passes through unchanged, so a
/// missing file surfaces as `HeapError::FileNotFound`.
pub async fn destroy_heap_file(path: impl AsRef<std::path::Path>) -> Result<(), HeapError> {
    FileStorage::destroy(path).await?;
    Ok(())
}

/// An open heap file.
///
/// The handle caches the parsed [`FileHeader`] and writes every header
/// mutation straight through to the pinned header frame, so the dirty
/// state of the header page can never drift from its contents.
pub struct HeapFile<'p, S: Storage> {
    pub(super) pool: &'p BufferPool<S>,

    /// Currently pinned data page, if any. The pin carries the page's
    /// accumulated dirty bit.
    ///
    /// Field order fixes teardown: the current data page unpins before the
    /// header page.
    pub(super) cur: Option<PageGuard<'p, S>>,

    /// Record the cursor last settled on; always on the current page when
    /// both are present.
    pub(super) cur_rec: Option<RecordId>,

    /// Cached copy of the header page contents.
    pub(super) header: FileHeader,

    /// Pin on the header page, held for the handle's whole lifetime.
    header_guard: PageGuard<'p, S>,
}

impl<'p, S: Storage> HeapFile<'p, S> {
    /// Opens the heap file behind `pool`.
    ///
    /// Pins the header page, parses it, and pins the first data page of
    /// the chain as the current page. On failure every pin taken so far is
    /// released.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::NotAHeapFile` if page 0 carries no heap file
    /// header; buffer pool and storage errors propagate.
    pub async fn open(pool: &'p BufferPool<S>) -> Result<HeapFile<'p, S>, HeapError> {
        let header_guard = pool.fetch_page(HEADER_PAGE_ID).await?;
        let header = header_guard.with(FileHeader::read_from)?;
        log::debug!("opening heap file {:?}", header.name());

        let cur = pool.fetch_page(header.first_page()).await?;

        Ok(HeapFile {
            pool,
            cur: Some(cur),
            cur_rec: None,
            header,
            header_guard,
        })
    }

    /// The stored file name.
    pub fn name(&self) -> String {
        self.header.name()
    }

    /// Number of live records in the file. O(1).
    pub fn rec_cnt(&self) -> u32 {
        self.header.rec_cnt()
    }

    /// Number of data pages in the chain. O(1).
    pub fn page_cnt(&self) -> u32 {
        self.header.page_cnt()
    }

    /// First data page of the chain.
    pub fn first_page(&self) -> PageId {
        self.header.first_page()
    }

    /// Last data page of the chain.
    pub fn last_page(&self) -> PageId {
        self.header.last_page()
    }

    /// Reads the record identified by `rid`.
    ///
    /// If `rid` lies on a different page than the current one, the current
    /// page is unpinned and `rid`'s page becomes current. On success the
    /// cursor moves to `rid`.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::SlotNotFound` for deleted or nonexistent slots;
    /// buffer pool errors propagate.
    pub async fn record(&mut self, rid: RecordId) -> Result<Bytes, HeapError> {
        let guard = self.make_current(rid.page_id).await?;
        let bytes = guard
            .with(|data| DataPage::new(data).read(rid.slot_id).map(Bytes::copy_from_slice))
            .ok_or(HeapError::SlotNotFound(rid.slot_id))?;

        self.cur_rec = Some(rid);
        Ok(bytes)
    }

    /// Makes `page_id` the current page and returns its pin.
    ///
    /// Crossing pages is a strict unpin-then-pin sequence: the old pin is
    /// released (with its accumulated dirty bit) before the new page is
    /// fetched. If `page_id` is already current, the existing pin is kept.
    pub(super) async fn make_current(
        &mut self,
        page_id: PageId,
    ) -> Result<&mut PageGuard<'p, S>, HeapError> {
        match self.cur.take() {
            Some(guard) if guard.page_id() == page_id => Ok(self.cur.insert(guard)),
            stale => {
                // Unpin the old page (if any) before pinning the next one.
                drop(stale);
                let guard = self.pool.fetch_page(page_id).await?;
                Ok(self.cur.insert(guard))
            }
        }
    }

    /// The page id of the current data page, if one is pinned.
    pub(super) fn cur_page_id(&self) -> Option<PageId> {
        self.cur.as_ref().map(|guard| guard.page_id())
    }

    /// Counts one more live record, writing the header through.
    pub(super) fn increment_rec_cnt(&mut self) {
        self.header.rec_cnt += 1;
        self.write_header();
    }

    /// Counts one less live record, writing the header through.
    pub(super) fn decrement_rec_cnt(&mut self) {
        self.header.rec_cnt = self.header.rec_cnt.saturating_sub(1);
        self.write_header();
    }

    /// Records a freshly linked last page, writing the header through.
    pub(super) fn extend_chain(&mut self, new_last: PageId) {
        self.header.last_page = new_last;
        self.header.page_cnt += 1;
        self.write_header();
    }

    /// Writes the cached header back to the pinned header frame.
    ///
    /// Marks the header pin dirty, keeping the dirty-on-change discipline
    /// in one place.
    fn write_header(&mut self) {
        let header = self.header;
        self.header_guard.with_mut(|data| header.write_to(data));
    }
}

//! Record insertion into heap files.
//!
//! Records are always appended to the last page of the chain; when it
//! fills up, a fresh page is allocated, linked in, and becomes the new
//! last page. Intermediate pages are therefore never left empty.

use super::error::HeapError;
use super::file::HeapFile;
use super::page::{DataPage, MAX_RECORD_SIZE, RecordId};
use crate::storage::{BufferPool, Storage};

/// An insertion handle over a heap file.
pub struct InsertFileScan<'p, S: Storage> {
    file: HeapFile<'p, S>,
}

impl<'p, S: Storage> InsertFileScan<'p, S> {
    /// Opens an insertion handle over the heap file behind `pool`.
    pub async fn open(pool: &'p BufferPool<S>) -> Result<InsertFileScan<'p, S>, HeapError> {
        Ok(InsertFileScan {
            file: HeapFile::open(pool).await?,
        })
    }

    /// Number of live records in the file. O(1).
    pub fn rec_cnt(&self) -> u32 {
        self.file.rec_cnt()
    }

    /// Appends a record to the file and returns its id.
    ///
    /// The insert targets the last page of the chain, repositioning the
    /// current page there first if needed. If the record does not fit, a
    /// new page is allocated, initialized, linked after the old last page,
    /// and the insert retries there; the header's last page and page count
    /// are updated. Every successful insert bumps the record count and
    /// leaves the cursor on the new record.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::RecordTooLarge` if the record exceeds
    /// [`MAX_RECORD_SIZE`] and could never fit on any page. Buffer pool
    /// failures abort the insert without rolling back earlier steps.
    pub async fn insert_record(&mut self, record: &[u8]) -> Result<RecordId, HeapError> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(HeapError::RecordTooLarge {
                size: record.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let pool = self.file.pool;
        let last_page = self.file.last_page();
        let guard = self.file.make_current(last_page).await?;

        if guard.with(|data| DataPage::new(data).can_insert(record.len())) {
            let slot_id = guard.with_mut(|data| DataPage::new(data).insert(record))?;
            let rid = RecordId::new(last_page, slot_id);

            self.file.cur_rec = Some(rid);
            self.file.increment_rec_cnt();
            return Ok(rid);
        }

        // The last page is full: allocate a fresh page and link it in.
        let mut new_guard = pool.alloc_page().await?;
        let new_page_id = new_guard.page_id();
        new_guard.with_mut(|data| DataPage::new(data).init());
        log::trace!("extending heap file chain with page {:?}", new_page_id);

        guard.with_mut(|data| DataPage::new(data).set_next_page(Some(new_page_id)));

        // Unpin the full page, then make the fresh page current.
        self.file.cur = None;
        let guard = self.file.cur.insert(new_guard);

        // The page is empty and the record passed the size check, so this
        // insert holds unless the page layer itself misbehaves.
        let slot_id = guard.with_mut(|data| DataPage::new(data).insert(record))?;
        let rid = RecordId::new(new_page_id, slot_id);

        self.file.extend_chain(new_page_id);
        self.file.cur_rec = Some(rid);
        self.file.increment_rec_cnt();
        Ok(rid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::file::{HEADER_PAGE_ID, format_heap_file};
    use crate::heap::scan::HeapFileScan;
    use crate::storage::MemoryStorage;

    async fn heap_pool() -> BufferPool<MemoryStorage> {
        let pool = BufferPool::new(MemoryStorage::new(), 32);
        format_heap_file(&pool, "insert_test").await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let pool = heap_pool().await;
        let mut insert = InsertFileScan::open(&pool).await.unwrap();

        let rid = insert.insert_record(b"hello heap").await.unwrap();
        assert_eq!(insert.rec_cnt(), 1);

        let mut file = HeapFile::open(&pool).await.unwrap();
        let bytes = file.record(rid).await.unwrap();
        assert_eq!(&bytes[..], b"hello heap");
    }

    #[tokio::test]
    async fn test_inserts_get_distinct_rids() {
        let pool = heap_pool().await;
        let mut insert = InsertFileScan::open(&pool).await.unwrap();

        let a = insert.insert_record(b"alpha").await.unwrap();
        let b = insert.insert_record(b"beta").await.unwrap();
        let c = insert.insert_record(b"gamma").await.unwrap();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(insert.rec_cnt(), 3);
    }

    #[tokio::test]
    async fn test_round_trip_across_handles() {
        let pool = heap_pool().await;
        let records: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; (i as usize + 1) * 10]).collect();

        let rids = {
            let mut insert = InsertFileScan::open(&pool).await.unwrap();
            let mut rids = Vec::new();
            for record in &records {
                rids.push(insert.insert_record(record).await.unwrap());
            }
            rids
        };

        let mut file = HeapFile::open(&pool).await.unwrap();
        for (rid, expected) in rids.iter().zip(&records) {
            let bytes = file.record(*rid).await.unwrap();
            assert_eq!(&bytes[..], &expected[..]);
        }
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let pool = heap_pool().await;
        let mut insert = InsertFileScan::open(&pool).await.unwrap();

        let record = vec![0u8; MAX_RECORD_SIZE + 1];
        let result = insert.insert_record(&record).await;
        assert!(matches!(result, Err(HeapError::RecordTooLarge { .. })));
        assert_eq!(insert.rec_cnt(), 0);
    }

    #[tokio::test]
    async fn test_max_size_record_is_accepted() {
        let pool = heap_pool().await;
        let mut insert = InsertFileScan::open(&pool).await.unwrap();

        // Exactly MAX_RECORD_SIZE must never be rejected as oversized.
        let record = vec![1u8; MAX_RECORD_SIZE];
        let rid = insert.insert_record(&record).await.unwrap();

        let mut file = HeapFile::open(&pool).await.unwrap();
        assert_eq!(file.record(rid).await.unwrap().len(), MAX_RECORD_SIZE);
    }

    #[tokio::test]
    async fn test_page_count_transitions_two_records_per_page() {
        let pool = heap_pool().await;
        let mut insert = InsertFileScan::open(&pool).await.unwrap();

        // 4000-byte records: exactly two fit per page.
        let record = vec![9u8; 4000];
        let mut page_counts = Vec::new();
        let mut last_pages = Vec::new();
        for _ in 0..5 {
            insert.insert_record(&record).await.unwrap();
            page_counts.push(insert.file.page_cnt());
            last_pages.push(insert.file.last_page());
        }

        assert_eq!(page_counts, vec![1, 1, 2, 2, 3]);
        assert_eq!(last_pages[0], last_pages[1]);
        assert_ne!(last_pages[1], last_pages[2]);
        assert_eq!(last_pages[2], last_pages[3]);
        assert_ne!(last_pages[3], last_pages[4]);
        assert_eq!(insert.rec_cnt(), 5);
    }

    #[tokio::test]
    async fn test_page_chain_matches_page_cnt() {
        let pool = heap_pool().await;
        let mut insert = InsertFileScan::open(&pool).await.unwrap();

        let record = vec![3u8; 3000];
        for _ in 0..10 {
            insert.insert_record(&record).await.unwrap();
        }

        let first_page = insert.file.first_page();
        let last_page = insert.file.last_page();
        let page_cnt = insert.file.page_cnt();
        drop(insert);

        // Walk the chain and compare its length with the header count.
        let mut chain = Vec::new();
        let mut next = Some(first_page);
        while let Some(page_id) = next {
            chain.push(page_id);
            let guard = pool.fetch_page(page_id).await.unwrap();
            next = guard.with(|data| DataPage::new(data).next_page());
        }

        assert_eq!(chain.len() as u32, page_cnt);
        assert_eq!(chain.last(), Some(&last_page));
    }

    #[tokio::test]
    async fn test_insert_holds_single_data_page_pin() {
        let pool = heap_pool().await;
        let mut insert = InsertFileScan::open(&pool).await.unwrap();

        let record = vec![7u8; 4000];
        for _ in 0..6 {
            insert.insert_record(&record).await.unwrap();
            assert_eq!(pool.pin_count(HEADER_PAGE_ID), 1);
            let pinned: u32 = (1..=4)
                .map(|n| pool.pin_count(crate::storage::PageId::new(n)))
                .sum();
            assert_eq!(pinned, 1);
        }
    }

    #[tokio::test]
    async fn test_scan_after_multi_page_insert() {
        let pool = heap_pool().await;
        let mut rids = Vec::new();
        {
            let mut insert = InsertFileScan::open(&pool).await.unwrap();
            for i in 0..7u8 {
                rids.push(insert.insert_record(&vec![i; 3500]).await.unwrap());
            }
        }

        let mut scan = HeapFileScan::open(&pool).await.unwrap();
        let mut seen = Vec::new();
        while let Some(rid) = scan.scan_next().await.unwrap() {
            seen.push(rid);
        }
        assert_eq!(seen, rids);
    }

    #[tokio::test]
    async fn test_rec_cnt_tracks_inserts_and_deletes() {
        let pool = heap_pool().await;

        {
            let mut insert = InsertFileScan::open(&pool).await.unwrap();
            for i in 0..8u8 {
                insert.insert_record(&[i]).await.unwrap();
            }
            assert_eq!(insert.rec_cnt(), 8);
        }

        {
            let mut scan = HeapFileScan::open(&pool).await.unwrap();
            // Delete three records through the scan.
            for _ in 0..3 {
                scan.scan_next().await.unwrap();
                scan.delete_record().unwrap();
            }
        }

        let scan = HeapFileScan::open(&pool).await.unwrap();
        assert_eq!(scan.rec_cnt(), 5);
    }
}

//! In-memory page storage.

use parking_lot::Mutex;

use super::Storage;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageData, PageId};

/// In-memory page storage for tests and development.
///
/// Pages live in a `Vec` of aligned buffers; page ids are the Vec indices.
/// Operations are synchronous underneath and merely `async` for trait
/// compatibility.
pub struct MemoryStorage {
    pages: Mutex<Vec<PageData>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let pages = self.pages.lock();
        let page = pages
            .get(page_id.page_num() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;

        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(page_id.page_num() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;

        page.as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, StorageError> {
        let mut pages = self.pages.lock();
        let page_id = PageId::new(pages.len() as u64);
        pages.push(PageData::new());
        Ok(page_id)
    }

    async fn page_count(&self) -> u64 {
        self.pages.lock().len() as u64
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_and_read_zeroed() {
        let storage = MemoryStorage::new();
        let page_id = storage.allocate_page().await.unwrap();
        assert_eq!(storage.page_count().await, 1);

        let mut buf = [0u8; PAGE_SIZE];
        storage.read_page(page_id, &mut buf).await.unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let storage = MemoryStorage::new();
        let page_id = storage.allocate_page().await.unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&[1, 2, 3, 4]);
        storage.write_page(page_id, &buf).await.unwrap();

        let mut out = [0u8; PAGE_SIZE];
        storage.read_page(page_id, &mut out).await.unwrap();
        assert_eq!(&out[0..4], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_page_not_found() {
        let storage = MemoryStorage::new();
        let mut buf = [0u8; PAGE_SIZE];
        let result = storage.read_page(PageId::new(0), &mut buf).await;
        assert!(matches!(result, Err(StorageError::PageNotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_buffer_size() {
        let storage = MemoryStorage::new();
        let page_id = storage.allocate_page().await.unwrap();

        let mut small = [0u8; 16];
        assert!(matches!(
            storage.read_page(page_id, &mut small).await,
            Err(StorageError::InvalidBufferSize { actual: 16, .. })
        ));
        assert!(matches!(
            storage.write_page(page_id, &small).await,
            Err(StorageError::InvalidBufferSize { actual: 16, .. })
        ));
    }
}

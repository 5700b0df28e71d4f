//! File-backed page storage.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::Storage;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageId};

/// One heap file on disk, stored as contiguous 8KB pages.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (8KB)     | Page 1 (8KB)     | Page 2 (8KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 8192      ^ offset 16384
/// ```
///
/// Page 0 is the first physical page of the file; the heap layer keeps its
/// header there. A `tokio::sync::Mutex` serializes access to the file
/// handle. Dropping a `FileStorage` closes the file.
pub struct FileStorage {
    /// Path the file was created/opened with.
    path: PathBuf,
    /// File handle, serialized behind an async mutex.
    file: Mutex<File>,
    /// Number of pages currently in the file.
    page_count: AtomicU64,
}

impl FileStorage {
    /// Creates a new, empty storage file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FileExists` (and leaves the existing file
    /// untouched) if a file already exists at `path`.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileExists(path));
            }
            Err(e) => return Err(e.into()),
        };

        log::debug!("created storage file {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU64::new(0),
        })
    }

    /// Opens an existing storage file.
    ///
    /// The page count is recovered from the file size.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FileNotFound` if the path does not exist and
    /// `StorageError::Corrupted` if the file size is not a multiple of
    /// `PAGE_SIZE`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = match OpenOptions::new().read(true).write(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let file_size = file.metadata().await?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        log::debug!("opened storage file {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU64::new(file_size / PAGE_SIZE as u64),
        })
    }

    /// Removes the storage file at `path`.
    ///
    /// The caller must ensure no handle is open on the file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FileNotFound` if the path does not exist.
    pub async fn destroy(path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the path of the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        if page_id.page_num() >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.read_exact(buf).await?;

        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        if page_id.page_num() >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.write_all(buf).await?;

        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, StorageError> {
        let mut file = self.file.lock().await;

        // Extend the file with one zeroed page. page_count is only updated
        // under the file lock, so allocation order matches file layout.
        let page_num = self.page_count.load(Ordering::Acquire);
        let page_id = PageId::new(page_num);

        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.write_all(&[0u8; PAGE_SIZE]).await?;

        self.page_count.store(page_num + 1, Ordering::Release);

        Ok(page_id)
    }

    async fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");

        let storage = FileStorage::create(&path).await.unwrap();
        assert_eq!(storage.page_count().await, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_create_existing_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");

        let _first = FileStorage::create(&path).await.unwrap();
        let result = FileStorage::create(&path).await;
        assert!(matches!(result, Err(StorageError::FileExists(_))));
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = FileStorage::open(dir.path().join("absent.db")).await;
        assert!(matches!(result, Err(StorageError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_destroy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");

        drop(FileStorage::create(&path).await.unwrap());
        FileStorage::destroy(&path).await.unwrap();
        assert!(!path.exists());

        let result = FileStorage::destroy(&path).await;
        assert!(matches!(result, Err(StorageError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::create(dir.path().join("t.db")).await.unwrap();
        let page_id = storage.allocate_page().await.unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&[9, 8, 7, 6]);
        storage.write_page(page_id, &buf).await.unwrap();

        let mut out = [0u8; PAGE_SIZE];
        storage.read_page(page_id, &mut out).await.unwrap();
        assert_eq!(&out[0..4], &[9, 8, 7, 6]);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");

        {
            let storage = FileStorage::create(&path).await.unwrap();
            let page_id = storage.allocate_page().await.unwrap();
            let mut buf = [0u8; PAGE_SIZE];
            buf[0] = 42;
            storage.write_page(page_id, &buf).await.unwrap();
            storage.sync_all().await.unwrap();
        }

        {
            let storage = FileStorage::open(&path).await.unwrap();
            assert_eq!(storage.page_count().await, 1);
            let mut buf = [0u8; PAGE_SIZE];
            storage.read_page(PageId::new(0), &mut buf).await.unwrap();
            assert_eq!(buf[0], 42);
        }
    }

    #[tokio::test]
    async fn test_corrupted_file_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();

        let result = FileStorage::open(&path).await;
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[tokio::test]
    async fn test_read_unallocated_page() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::create(dir.path().join("t.db")).await.unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        let result = storage.read_page(PageId::new(0), &mut buf).await;
        assert!(matches!(result, Err(StorageError::PageNotFound(_))));
    }
}

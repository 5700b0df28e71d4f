//! Storage layer errors.

use std::path::PathBuf;

use crate::storage::PageId;

/// Errors from the file and page I/O layer.
#[derive(Debug)]
pub enum StorageError {
    /// A file with this path already exists (`FileStorage::create`).
    FileExists(PathBuf),

    /// No file with this path exists (`FileStorage::open` / `destroy`).
    FileNotFound(PathBuf),

    /// The page has not been allocated.
    PageNotFound(PageId),

    /// A read/write buffer was not exactly `PAGE_SIZE` bytes.
    InvalidBufferSize {
        /// Expected buffer size (PAGE_SIZE).
        expected: usize,
        /// Size of the buffer provided.
        actual: usize,
    },

    /// I/O error from the underlying file system.
    Io(std::io::Error),

    /// The file contents do not form a valid page store.
    Corrupted(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileExists(path) => write!(f, "file already exists: {}", path.display()),
            StorageError::FileNotFound(path) => write!(f, "no such file: {}", path.display()),
            StorageError::PageNotFound(id) => write!(f, "page not found: {:?}", id),
            StorageError::InvalidBufferSize { expected, actual } => {
                write!(f, "invalid buffer size: expected {}, got {}", expected, actual)
            }
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Corrupted(msg) => write!(f, "corrupted storage: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

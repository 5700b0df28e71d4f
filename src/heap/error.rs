//! Heap layer errors.

use std::path::PathBuf;

use crate::storage::{BufferPoolError, StorageError};

use super::page::SlotId;

/// Errors from heap file operations.
///
/// End-of-iteration conditions (end of file, end of page, no records on a
/// page) are not errors; they surface as `None` from the scan and page
/// traversal APIs.
#[derive(Debug)]
pub enum HeapError {
    /// A heap file with this path already exists (`create_heap_file`).
    FileExists(PathBuf),

    /// No heap file with this path exists.
    FileNotFound(PathBuf),

    /// Page 0 of the file does not carry a heap file header.
    NotAHeapFile,

    /// Not enough free space on the page for the record and its slot.
    PageFull {
        /// Bytes needed for the record plus its slot entry.
        required: usize,
        /// Contiguous free bytes available.
        available: usize,
    },

    /// The slot does not exist or has been deleted.
    SlotNotFound(SlotId),

    /// The scan has no current record to read, delete, or resume from.
    NoCurrentRecord,

    /// The record can never fit on any data page.
    RecordTooLarge {
        /// Size of the rejected record.
        size: usize,
        /// Largest insertable record size.
        max: usize,
    },

    /// Rejected scan predicate parameters.
    InvalidScanParam(&'static str),

    /// Buffer pool failure.
    Buffer(BufferPoolError),

    /// Storage layer failure.
    Storage(StorageError),
}

impl std::fmt::Display for HeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapError::FileExists(path) => {
                write!(f, "heap file already exists: {}", path.display())
            }
            HeapError::FileNotFound(path) => write!(f, "no such heap file: {}", path.display()),
            HeapError::NotAHeapFile => write!(f, "file is not a heap file"),
            HeapError::PageFull {
                required,
                available,
            } => {
                write!(f, "page full: need {} bytes, have {}", required, available)
            }
            HeapError::SlotNotFound(slot_id) => write!(f, "slot {} not found or deleted", slot_id),
            HeapError::NoCurrentRecord => write!(f, "scan has no current record"),
            HeapError::RecordTooLarge { size, max } => {
                write!(f, "record of {} bytes exceeds maximum of {}", size, max)
            }
            HeapError::InvalidScanParam(reason) => write!(f, "invalid scan parameter: {}", reason),
            HeapError::Buffer(e) => write!(f, "buffer pool error: {}", e),
            HeapError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for HeapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HeapError::Buffer(e) => Some(e),
            HeapError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferPoolError> for HeapError {
    fn from(e: BufferPoolError) -> Self {
        HeapError::Buffer(e)
    }
}

impl From<StorageError> for HeapError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::FileExists(path) => HeapError::FileExists(path),
            StorageError::FileNotFound(path) => HeapError::FileNotFound(path),
            other => HeapError::Storage(other),
        }
    }
}

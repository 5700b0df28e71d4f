//! granary: heap-file record storage over a pinned-page buffer pool.
//!
//! The crate has two layers:
//!
//! - [`storage`]: page-granular file I/O behind the
//!   [`Storage`](storage::Storage) trait, and a
//!   [`BufferPool`](storage::BufferPool) that caches pages and hands them
//!   out pinned.
//! - [`heap`]: heap files, i.e. chains of slotted data pages holding
//!   variable-length records, with sequential scans, predicate filtering,
//!   and record insertion/deletion.
//!
//! ```no_run
//! use granary::heap::{HeapFileScan, InsertFileScan, create_heap_file};
//! use granary::storage::{BufferPool, FileStorage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! create_heap_file("accounts.db").await?;
//!
//! let storage = FileStorage::open("accounts.db").await?;
//! let pool = BufferPool::new(storage, 64);
//!
//! let mut insert = InsertFileScan::open(&pool).await?;
//! let rid = insert.insert_record(b"alice,100").await?;
//! drop(insert);
//!
//! let mut scan = HeapFileScan::open(&pool).await?;
//! while let Some(rid) = scan.scan_next().await? {
//!     println!("{:?}: {:?}", rid, scan.current_record()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod heap;
pub mod storage;

//! Sequential heap file scans with optional predicate filtering.
//!
//! A [`HeapFileScan`] walks the data page chain forward, one pinned page
//! at a time, yielding the records that satisfy its predicate (or every
//! record, for a wildcard scan). The scan also supports a single
//! mark/reset checkpoint and deletion of the current record.

use std::cmp::Ordering;

use bytes::Bytes;

use super::error::HeapError;
use super::file::HeapFile;
use super::page::{DataPage, RecordId};
use crate::storage::{BufferPool, PageId, Storage};

/// Attribute type a scan predicate compares on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    /// Little-endian `i32`, 4 bytes.
    Integer,
    /// Little-endian `f32`, 4 bytes.
    Float,
    /// Raw bytes, compared lexicographically.
    String,
}

/// Comparison operator of a scan predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Lt,
    Lte,
    Eq,
    Gte,
    Gt,
    Ne,
}

impl CompOp {
    /// Whether an attribute comparing to the filter value as `ord`
    /// satisfies this operator.
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CompOp::Lt => ord == Ordering::Less,
            CompOp::Lte => ord != Ordering::Greater,
            CompOp::Eq => ord == Ordering::Equal,
            CompOp::Gte => ord != Ordering::Less,
            CompOp::Gt => ord == Ordering::Greater,
            CompOp::Ne => ord != Ordering::Equal,
        }
    }
}

/// A validated scan predicate: compare `length` bytes of the record at
/// `offset` against the filter value under `op`.
#[derive(Debug, Clone)]
struct Predicate {
    offset: usize,
    length: usize,
    ty: AttrType,
    op: CompOp,
    value: Vec<u8>,
}

impl Predicate {
    fn new(
        offset: usize,
        length: usize,
        ty: AttrType,
        filter: &[u8],
        op: CompOp,
    ) -> Result<Self, HeapError> {
        if length < 1 {
            return Err(HeapError::InvalidScanParam("length must be at least 1"));
        }
        match ty {
            AttrType::Integer if length != size_of::<i32>() => {
                return Err(HeapError::InvalidScanParam(
                    "integer comparisons require a 4-byte window",
                ));
            }
            AttrType::Float if length != size_of::<f32>() => {
                return Err(HeapError::InvalidScanParam(
                    "float comparisons require a 4-byte window",
                ));
            }
            _ => {}
        }
        if filter.len() < length {
            return Err(HeapError::InvalidScanParam(
                "filter value shorter than the comparison window",
            ));
        }

        Ok(Self {
            offset,
            length,
            ty,
            op,
            value: filter[..length].to_vec(),
        })
    }

    /// Evaluates the predicate against a record's bytes.
    ///
    /// A comparison window that extends past the end of the record never
    /// matches. Numeric attributes are copied into aligned values, never
    /// cast in place, so unaligned record layouts are fine.
    fn matches(&self, record: &[u8]) -> bool {
        let Some(end) = self.offset.checked_add(self.length) else {
            return false;
        };
        if end > record.len() {
            return false;
        }
        let window = &record[self.offset..end];

        match self.ty {
            AttrType::Integer => {
                let mut attr = [0u8; size_of::<i32>()];
                let mut filter = [0u8; size_of::<i32>()];
                attr.copy_from_slice(window);
                filter.copy_from_slice(&self.value);
                let attr = i32::from_le_bytes(attr);
                let filter = i32::from_le_bytes(filter);
                self.op.matches(attr.cmp(&filter))
            }
            AttrType::Float => {
                let mut attr = [0u8; size_of::<f32>()];
                let mut filter = [0u8; size_of::<f32>()];
                attr.copy_from_slice(window);
                filter.copy_from_slice(&self.value);
                let attr = f32::from_le_bytes(attr);
                let filter = f32::from_le_bytes(filter);
                match attr.partial_cmp(&filter) {
                    Some(ord) => self.op.matches(ord),
                    // NaN compares unequal to everything.
                    None => self.op == CompOp::Ne,
                }
            }
            AttrType::String => self.op.matches(window.cmp(&self.value[..])),
        }
    }
}

/// A forward scan over a heap file.
///
/// The cursor starts before the first record; each
/// [`scan_next`](HeapFileScan::scan_next) advances it to the next record
/// satisfying the predicate and returns that record's id, or `None` once
/// the file is exhausted.
pub struct HeapFileScan<'p, S: Storage> {
    file: HeapFile<'p, S>,
    predicate: Option<Predicate>,
    marked_page: Option<PageId>,
    marked_rec: Option<RecordId>,
}

impl<'p, S: Storage> HeapFileScan<'p, S> {
    /// Opens a wildcard scan over the heap file behind `pool`.
    pub async fn open(pool: &'p BufferPool<S>) -> Result<HeapFileScan<'p, S>, HeapError> {
        Ok(HeapFileScan {
            file: HeapFile::open(pool).await?,
            predicate: None,
            marked_page: None,
            marked_rec: None,
        })
    }

    /// Number of live records in the file. O(1).
    pub fn rec_cnt(&self) -> u32 {
        self.file.rec_cnt()
    }

    /// Reads an arbitrary record, moving the cursor to it.
    ///
    /// See [`HeapFile::record`].
    pub async fn record(&mut self, rid: RecordId) -> Result<Bytes, HeapError> {
        self.file.record(rid).await
    }

    /// Configures the scan's predicate.
    ///
    /// With `filter = None` the predicate is cleared and every record
    /// matches; `offset`, `length`, `ty` and `op` are ignored. Otherwise
    /// the parameters are validated and stored. The cursor is *not*
    /// rewound: reconstruct the scan to restart from the beginning.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::InvalidScanParam`, without touching the
    /// current predicate, if `length` is zero, a numeric window is not 4
    /// bytes wide, or the filter value is shorter than the window.
    pub fn start_scan(
        &mut self,
        offset: usize,
        length: usize,
        ty: AttrType,
        filter: Option<&[u8]>,
        op: CompOp,
    ) -> Result<(), HeapError> {
        self.predicate = match filter {
            None => None,
            Some(value) => Some(Predicate::new(offset, length, ty, value, op)?),
        };
        Ok(())
    }

    /// Ends the scan, unpinning the current page.
    ///
    /// Safe to call repeatedly. A subsequent
    /// [`scan_next`](Self::scan_next) reports the scan as exhausted.
    pub fn end_scan(&mut self) {
        self.file.cur = None;
    }

    /// Snapshots the scan position for a later
    /// [`reset_scan`](Self::reset_scan).
    pub fn mark_scan(&mut self) {
        self.marked_page = self.file.cur_page_id();
        self.marked_rec = self.file.cur_rec;
    }

    /// Restores the position saved by [`mark_scan`](Self::mark_scan).
    ///
    /// A scan that was never marked is left untouched. Otherwise, if the
    /// marked page is not the current page, the current pin is released
    /// and the marked page re-read; if it is, only the cursor is restored.
    /// The next `scan_next` resumes immediately after the marked record,
    /// as though it had just been returned.
    pub async fn reset_scan(&mut self) -> Result<(), HeapError> {
        // Without a mark there is nothing to restore.
        let Some(marked_page) = self.marked_page else {
            return Ok(());
        };

        if Some(marked_page) != self.file.cur_page_id() {
            self.file.cur = None;
            self.file.cur_rec = self.marked_rec;
            let pool = self.file.pool;
            self.file.cur = Some(pool.fetch_page(marked_page).await?);
        } else {
            self.file.cur_rec = self.marked_rec;
        }
        Ok(())
    }

    /// Advances to the next matching record.
    ///
    /// Walks forward from the cursor, crossing to the next page of the
    /// chain when the current one is exhausted (strictly unpinning the old
    /// page before pinning the new one). Every visited record becomes the
    /// cursor, matching or not.
    ///
    /// Returns `Ok(None)` at the end of the file. The chain walk takes the
    /// first record of each next page; a page with no records ends the
    /// scan (the insert path never leaves such a page behind).
    pub async fn scan_next(&mut self) -> Result<Option<RecordId>, HeapError> {
        loop {
            let Some(guard) = &self.file.cur else {
                // No pinned page: the scan was ended (or never positioned).
                return Ok(None);
            };
            let page_id = guard.page_id();
            let cur_rec = self.file.cur_rec;

            let tentative = guard.with(|data| {
                let page = DataPage::new(data);
                match cur_rec {
                    None => page.first_record(),
                    Some(prev) => page.next_record(prev.slot_id),
                }
            });

            let rid = match (tentative, cur_rec) {
                (Some(slot_id), _) => RecordId::new(page_id, slot_id),
                // The current page holds no records at all.
                (None, None) => return Ok(None),
                (None, Some(_)) => {
                    // End of page: follow the chain link.
                    let Some(next_id) = guard.with(|data| DataPage::new(data).next_page()) else {
                        return Ok(None);
                    };

                    // Unpin before pinning the next page.
                    self.file.cur = None;
                    let pool = self.file.pool;
                    let next_guard = pool.fetch_page(next_id).await?;
                    let first = next_guard.with(|data| DataPage::new(data).first_record());
                    self.file.cur = Some(next_guard);

                    match first {
                        Some(slot_id) => RecordId::new(next_id, slot_id),
                        None => return Ok(None),
                    }
                }
            };

            let matched = match &self.file.cur {
                Some(guard) => guard.with(|data| {
                    DataPage::new(data)
                        .read(rid.slot_id)
                        .is_some_and(|record| {
                            self.predicate
                                .as_ref()
                                .is_none_or(|predicate| predicate.matches(record))
                        })
                }),
                None => false,
            };

            self.file.cur_rec = Some(rid);
            if matched {
                return Ok(Some(rid));
            }
        }
    }

    /// Reads the record at the cursor.
    ///
    /// The current page stays pinned; the scan releases the pin when it
    /// moves on or ends.
    ///
    /// # Errors
    ///
    /// `HeapError::NoCurrentRecord` if the scan has not yielded a record;
    /// `HeapError::SlotNotFound` if the cursor's slot was deleted.
    pub fn current_record(&self) -> Result<Bytes, HeapError> {
        let (Some(guard), Some(rid)) = (&self.file.cur, self.file.cur_rec) else {
            return Err(HeapError::NoCurrentRecord);
        };

        guard
            .with(|data| DataPage::new(data).read(rid.slot_id).map(Bytes::copy_from_slice))
            .ok_or(HeapError::SlotNotFound(rid.slot_id))
    }

    /// Deletes the record at the cursor.
    ///
    /// Tombstones the slot on the current page and decrements the file's
    /// record count; both the page and the header are marked dirty. The
    /// count drops whether or not the slot was still live, so deleting the
    /// same record twice corrupts it; callers must not.
    pub fn delete_record(&mut self) -> Result<(), HeapError> {
        let (Some(guard), Some(rid)) = (&mut self.file.cur, self.file.cur_rec) else {
            return Err(HeapError::NoCurrentRecord);
        };

        let status = guard.with_mut(|data| DataPage::new(data).delete(rid.slot_id));
        self.file.decrement_rec_cnt();
        status
    }

    /// Marks the current page dirty.
    ///
    /// For callers that mutate record bytes in place through the pinned
    /// page.
    pub fn mark_dirty(&mut self) {
        if let Some(guard) = &mut self.file.cur {
            guard.mark_dirty();
        }
    }
}

impl<S: Storage> Drop for HeapFileScan<'_, S> {
    fn drop(&mut self) {
        self.end_scan();
    }
}

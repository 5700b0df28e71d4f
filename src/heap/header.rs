//! Heap file header page format.

use super::error::HeapError;
use crate::storage::PageId;

/// Magic marker identifying a heap file header page.
const HEADER_MAGIC: u32 = 0x4841_4631; // "HAF1"

/// Maximum stored length of a heap file's name, in bytes.
pub const MAX_NAME_SIZE: usize = 32;

/// File-wide metadata, kept on page 0 of every heap file.
///
/// Layout (little endian):
/// - magic: u32
/// - `name_len`: u8, 3 reserved bytes
/// - `name`: 32 bytes
/// - `first_page`: u64
/// - `last_page`: u64
/// - `page_cnt`: u32
/// - `rec_cnt`: u32
///
/// `first_page` and `last_page` delimit the data page chain; `page_cnt`
/// equals the chain length and `rec_cnt` the number of live records in the
/// file. The header page itself is not part of the chain.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    name: [u8; MAX_NAME_SIZE],
    name_len: u8,
    pub(super) first_page: PageId,
    pub(super) last_page: PageId,
    pub(super) page_cnt: u32,
    pub(super) rec_cnt: u32,
}

impl FileHeader {
    /// Creates the header of a freshly formatted file whose chain consists
    /// of the single empty data page `first_page`.
    ///
    /// The name is truncated to [`MAX_NAME_SIZE`] bytes.
    pub fn new(name: &str, first_page: PageId) -> Self {
        let mut name_buf = [0u8; MAX_NAME_SIZE];
        let len = name.len().min(MAX_NAME_SIZE);
        name_buf[..len].copy_from_slice(&name.as_bytes()[..len]);

        Self {
            name: name_buf,
            name_len: len as u8,
            first_page,
            last_page: first_page,
            page_cnt: 1,
            rec_cnt: 0,
        }
    }

    /// The stored file name.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.name[..self.name_len as usize]).into_owned()
    }

    /// First data page of the chain.
    pub fn first_page(&self) -> PageId {
        self.first_page
    }

    /// Last data page of the chain.
    pub fn last_page(&self) -> PageId {
        self.last_page
    }

    /// Number of data pages in the chain.
    pub fn page_cnt(&self) -> u32 {
        self.page_cnt
    }

    /// Number of live records in the file.
    pub fn rec_cnt(&self) -> u32 {
        self.rec_cnt
    }

    /// Parses a header from page bytes.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::NotAHeapFile` if the magic marker is missing.
    pub fn read_from(data: &[u8]) -> Result<Self, HeapError> {
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != HEADER_MAGIC {
            return Err(HeapError::NotAHeapFile);
        }

        let name_len = data[4].min(MAX_NAME_SIZE as u8);
        let mut name = [0u8; MAX_NAME_SIZE];
        name.copy_from_slice(&data[8..8 + MAX_NAME_SIZE]);

        Ok(Self {
            name,
            name_len,
            first_page: PageId::new(u64::from_le_bytes([
                data[40], data[41], data[42], data[43], data[44], data[45], data[46], data[47],
            ])),
            last_page: PageId::new(u64::from_le_bytes([
                data[48], data[49], data[50], data[51], data[52], data[53], data[54], data[55],
            ])),
            page_cnt: u32::from_le_bytes([data[56], data[57], data[58], data[59]]),
            rec_cnt: u32::from_le_bytes([data[60], data[61], data[62], data[63]]),
        })
    }

    /// Writes the header to page bytes.
    pub fn write_to(&self, data: &mut [u8]) {
        data[0..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
        data[4] = self.name_len;
        data[5..8].fill(0);
        data[8..8 + MAX_NAME_SIZE].copy_from_slice(&self.name);
        data[40..48].copy_from_slice(&self.first_page.page_num().to_le_bytes());
        data[48..56].copy_from_slice(&self.last_page.page_num().to_le_bytes());
        data[56..60].copy_from_slice(&self.page_cnt.to_le_bytes());
        data[60..64].copy_from_slice(&self.rec_cnt.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;

    #[test]
    fn test_new_header() {
        let header = FileHeader::new("accounts", PageId::new(1));
        assert_eq!(header.name(), "accounts");
        assert_eq!(header.first_page(), PageId::new(1));
        assert_eq!(header.last_page(), PageId::new(1));
        assert_eq!(header.page_cnt(), 1);
        assert_eq!(header.rec_cnt(), 0);
    }

    #[test]
    fn test_roundtrip() {
        let mut header = FileHeader::new("t1", PageId::new(1));
        header.last_page = PageId::new(9);
        header.page_cnt = 4;
        header.rec_cnt = 123;

        let mut buf = vec![0u8; PAGE_SIZE];
        header.write_to(&mut buf);

        let parsed = FileHeader::read_from(&buf).unwrap();
        assert_eq!(parsed.name(), "t1");
        assert_eq!(parsed.first_page(), PageId::new(1));
        assert_eq!(parsed.last_page(), PageId::new(9));
        assert_eq!(parsed.page_cnt(), 4);
        assert_eq!(parsed.rec_cnt(), 123);
    }

    #[test]
    fn test_name_truncation() {
        let long = "x".repeat(100);
        let header = FileHeader::new(&long, PageId::new(1));
        assert_eq!(header.name().len(), MAX_NAME_SIZE);
    }

    #[test]
    fn test_bad_magic() {
        let buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            FileHeader::read_from(&buf),
            Err(HeapError::NotAHeapFile)
        ));
    }
}

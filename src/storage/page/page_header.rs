//! Page header and type definitions.
//!
//! Every index page starts with a [`PageHeader`]: a one-byte [`PageType`]
//! tag followed by a CRC32 of the whole page.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       1     page type
//! 1       4     checksum, little-endian
//! ```

use std::ops::Range;

/// Kind of page stored in an index file.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Zeroed or unrecognised.
    #[default]
    Invalid = 0,
    /// First page of the file, describes the index.
    IndexHeader = 1,
    BTreeInternal = 2,
    BTreeLeaf = 3,
}

impl From<u8> for PageType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => PageType::IndexHeader,
            2 => PageType::BTreeInternal,
            3 => PageType::BTreeLeaf,
            _ => PageType::Invalid,
        }
    }
}

/// Type tag and checksum at the start of a page.
///
/// The checksum covers every byte of the page, reading its own four bytes
/// as zero, so a sealed page can be verified without copying it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub checksum: u32,
}

impl PageHeader {
    pub const SIZE: usize = 5;

    const TYPE_AT: usize = 0;
    const CHECKSUM: Range<usize> = 1..5;

    /// Decode the header at the front of `data`.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`PageHeader::SIZE`].
    pub fn read(data: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&data[Self::CHECKSUM]);
        Self {
            page_type: PageType::from(data[Self::TYPE_AT]),
            checksum: u32::from_le_bytes(raw),
        }
    }

    /// Encode this header over the front of `data`.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`PageHeader::SIZE`].
    pub fn write(&self, data: &mut [u8]) {
        data[Self::TYPE_AT] = self.page_type as u8;
        data[Self::CHECKSUM].copy_from_slice(&self.checksum.to_le_bytes());
    }

    /// CRC32 of `data` with the checksum bytes read as zero.
    pub fn checksum_of(data: &[u8]) -> u32 {
        let mut crc = crc32fast::Hasher::new();
        crc.update(&data[..Self::CHECKSUM.start]);
        crc.update(&[0; 4]);
        crc.update(&data[Self::CHECKSUM.end..]);
        crc.finalize()
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        self.checksum == Self::checksum_of(data)
    }
}

//! Record identifier type.

use std::fmt;

use super::PageId;

/// Locates a tuple in the indexed relation: the relation page plus the slot
/// within that page.
///
/// The index never dereferences a `RecordId`; it only stores the value next
/// to its key and hands it back from scans.
///
/// # Layout (6 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     page_id (little-endian)
/// 4       2     slot (little-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    /// Encoded size in bytes.
    pub const SIZE: usize = 6;

    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.slot.to_le_bytes());
        bytes
    }

    /// # Panics
    /// Panics if `bytes.len() < RecordId::SIZE`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= Self::SIZE, "buffer too small for RecordId");
        Self {
            page_id: PageId(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            slot: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}, {})", self.page_id.0, self.slot)
    }
}

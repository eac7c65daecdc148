//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array. Index nodes are copied in and out of
//! it through the little-endian field accessors below; nothing ever
//! reinterprets the buffer as a typed struct.

use crate::common::config::PAGE_SIZE;

use super::page_header::{PageHeader, PageType};

/// A page of data (4KB, 4KB-aligned).
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` outside tests: copying 4KB should be an
/// explicit decision (see [`Page::copy_from`]).
///
/// # Example
/// ```
/// use pagedindex::storage::page::Page;
///
/// let mut page = Page::new();
/// page.write_i32(64, -7);
/// assert_eq!(page.read_i32(64), -7);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Overwrite this page with the contents of another.
    pub fn copy_from(&mut self, other: &Page) {
        self.data.copy_from_slice(&other.data);
    }

    // ========================================================================
    // Field accessors (little-endian)
    // ========================================================================

    /// # Panics
    /// All accessors panic if the field extends past the end of the page.
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn read_i32(&self, offset: usize) -> i32 {
        self.read_u32(offset) as i32
    }

    #[inline]
    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.write_u32(offset, value as u32);
    }

    #[inline]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    #[inline]
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    // ========================================================================
    // Header and checksum
    // ========================================================================

    pub fn header(&self) -> PageHeader {
        PageHeader::read(&self.data)
    }

    pub fn page_type(&self) -> PageType {
        self.header().page_type
    }

    /// Stamp the page type and checksum.
    ///
    /// Call this after the body of the page has been fully written.
    pub fn seal(&mut self, page_type: PageType) {
        self.data[0] = page_type as u8;
        let header = PageHeader {
            page_type,
            checksum: PageHeader::checksum_of(&self.data),
        };
        header.write(&mut self.data);
    }

    /// Whether the stored checksum matches the page bytes.
    pub fn verify_checksum(&self) -> bool {
        self.header().matches(&self.data)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.copy_from(self);
        new_page
    }
}

//! Page identifier type.

use std::fmt;

/// Identifies a page within an index file.
///
/// Pages are numbered from 0 in file order; the index header always lives in
/// the first page. On disk a `PageId` is stored as a little-endian `u32`,
/// with [`PageId::INVALID`] standing for "no page" (e.g. the right sibling of
/// the last leaf).
///
/// # Example
/// ```
/// use pagedindex::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert_eq!(PageId::from_raw(u32::MAX), None);
/// assert_eq!(PageId::from_raw(42), Some(page_id));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid/sentinel page ID.
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// Check if this page ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Decode an on-disk pointer, mapping the sentinel to `None`.
    #[inline]
    pub fn from_raw(raw: u32) -> Option<Self> {
        let page_id = PageId(raw);
        page_id.is_valid().then_some(page_id)
    }

    /// Encode an optional pointer for storage.
    #[inline]
    pub fn to_raw(page_id: Option<Self>) -> u32 {
        page_id.unwrap_or(Self::INVALID).0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}

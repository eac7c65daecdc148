//! Error types for the index and the storage layers beneath it.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagedindex.
///
/// Storage and buffer failures sit next to the index's own boundary
/// conditions so every layer can use `?` against a single type. Use
/// [`Error::is_storage_fatal`] to tell the two groups apart.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("No free frames available in buffer pool")]
    NoFreeFrames,

    /// Attempted to unpin (or delete) a page in the wrong pin state.
    ///
    /// This indicates a bug - unpinning should match pinning.
    #[error("Page {0} is not pinned")]
    PageNotPinned(u32),

    /// A page failed checksum or type validation when decoded.
    #[error("Page {page_id} is corrupted: {reason}")]
    Corrupted { page_id: u32, reason: String },

    /// An `IndexConfig` value is out of range.
    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),

    /// Only integer attributes can be indexed.
    #[error("Unsupported attribute type: {0}")]
    UnsupportedAttrType(String),

    /// A tuple handed over by a record source is too short to hold the key.
    #[error("Tuple of {len} bytes has no 4-byte key at offset {offset}")]
    TupleTooShort { offset: i32, len: usize },

    /// The stored index header does not describe the requested index.
    #[error("Index file {index_name} does not match the requested relation/attribute")]
    BadIndexMetadata { index_name: String },

    /// Scan operators outside `{GT, GTE}` x `{LT, LTE}`.
    #[error("Bad scan operators: low must be GT/GTE and high must be LT/LTE")]
    BadOpcode,

    /// Scan lower bound greater than upper bound.
    #[error("Bad scan range: low {low} is greater than high {high}")]
    BadScanRange { low: i32, high: i32 },

    /// No entry satisfies the requested range.
    #[error("No key satisfies the scan range")]
    NoSuchKey,

    /// `scan_next` or `end_scan` called without an active scan.
    #[error("Scan has not been initialized")]
    ScanNotInitialized,

    /// The active scan has no more qualifying entries.
    #[error("Index scan completed")]
    ScanCompleted,

    /// A split cascade failed after rewriting pages; the tree may hold an
    /// orphaned node and the handle refuses further inserts and scans.
    #[error("Index {index_name} is unusable after a failed split")]
    IndexPoisoned { index_name: String },
}

impl Error {
    /// Whether this error came from the page store or buffer pool.
    ///
    /// These are never retried by the index; the caller decides what to do
    /// with the handle.
    pub fn is_storage_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::PageNotFound(_)
                | Error::NoFreeFrames
                | Error::PageNotPinned(_)
                | Error::Corrupted { .. }
        )
    }

    pub(crate) fn corrupted(page_id: u32, reason: impl Into<String>) -> Self {
        Error::Corrupted {
            page_id,
            reason: reason.into(),
        }
    }
}

//! Disk-paged B+Tree secondary index over one `i32` attribute.
//!
//! # Structure
//! ```text
//!                    ┌────────────┐
//!   header page ───▶ │ root (N)   │            level = height - 1
//!                    └─┬────┬───┬─┘
//!               ┌──────┘    │   └──────┐
//!               ▼           ▼          ▼
//!           ┌───────┐   ┌───────┐  ┌───────┐
//!           │ leaf  │──▶│ leaf  │─▶│ leaf  │──▶ INVALID   (L entries each)
//!           └───────┘   └───────┘  └───────┘
//! ```
//!
//! - [`node`] - Leaf and internal page codec
//! - [`header`] - Index header page and attribute metadata
//! - `insert` - Top-down insert with split propagation
//! - `scan` - Range scan cursor
//! - `lifecycle` - Open an existing index or build a new one
//! - `verify` - Structural checks and leaf-level dumps
//!
//! Every page is reached through the [`BufferPoolManager`]. Inserts hold
//! guards on their descent path; a scan holds one explicit pin on its
//! current leaf between calls.

pub mod header;
mod insert;
mod lifecycle;
pub mod node;
mod scan;
mod verify;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::buffer::BufferPoolManager;
use crate::common::{Error, PageId, RecordId, Result};

pub use header::{AttrType, IndexHeader};
pub use scan::Operator;
pub use verify::TreeStats;

use header::RELATION_NAME_LEN;
use scan::{ScanBounds, ScanState};

/// Index-wide state that changes only when the root splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeHandle {
    pub header_page_id: PageId,
    pub root: PageId,
    /// Levels including the leaves; a lone root leaf is height 1.
    pub height: u32,
    pub leaf_capacity: usize,
    pub internal_capacity: usize,
    pub relation_name: [u8; RELATION_NAME_LEN],
    pub attr_byte_offset: i32,
    pub attr_type: AttrType,
    /// Set when a split cascade failed part way; never persisted.
    pub poisoned: bool,
}

impl TreeHandle {
    pub(crate) fn from_header(header_page_id: PageId, header: &IndexHeader) -> Self {
        Self {
            header_page_id,
            root: header.root_page_id,
            height: header.height,
            leaf_capacity: header.leaf_capacity as usize,
            internal_capacity: header.internal_capacity as usize,
            relation_name: header.relation_name,
            attr_byte_offset: header.attr_byte_offset,
            attr_type: header.attr_type,
            poisoned: false,
        }
    }

    pub(crate) fn to_header(&self) -> IndexHeader {
        IndexHeader {
            relation_name: self.relation_name,
            attr_byte_offset: self.attr_byte_offset,
            attr_type: self.attr_type,
            root_page_id: self.root,
            height: self.height,
            leaf_capacity: self.leaf_capacity as u32,
            internal_capacity: self.internal_capacity as u32,
        }
    }

    /// Rewrite the header page from this handle.
    pub(crate) fn persist(&self, bpm: &BufferPoolManager) -> Result<()> {
        let mut guard = bpm.fetch_page_write(self.header_page_id)?;
        self.to_header().encode_into(&mut guard);
        Ok(())
    }
}

/// A B+Tree index file together with its buffer pool.
///
/// Obtain one with [`BTreeIndex::open_or_create`]. Dropping the handle ends
/// any active scan and flushes dirty pages.
///
/// # Example
/// ```no_run
/// use pagedindex::{AttrType, BTreeIndex, IndexConfig, MemoryRelation, Operator};
///
/// let mut relation = MemoryRelation::new("emp");
/// for key in [10i32, 20, 30] {
///     relation.push_record(key.to_le_bytes().to_vec());
/// }
///
/// let mut index = BTreeIndex::open_or_create(
///     "/tmp/idx",
///     "emp",
///     0,
///     AttrType::Integer,
///     &mut relation,
///     IndexConfig::default(),
/// )?;
///
/// index.start_scan(15, Operator::Gte, 30, Operator::Lt)?;
/// let rid = index.scan_next()?;
/// index.end_scan()?;
/// # let _ = rid;
/// # Ok::<(), pagedindex::Error>(())
/// ```
pub struct BTreeIndex {
    index_name: String,
    path: PathBuf,
    bpm: BufferPoolManager,
    tree: TreeHandle,
    scan: ScanState,
}

impl BTreeIndex {
    // ========================================================================
    // Insert
    // ========================================================================

    /// Add `(key, rid)` to the index. Duplicate keys are kept in arrival order.
    ///
    /// # Errors
    /// Storage errors (see [`Error::is_storage_fatal`]). One that strikes
    /// after a leaf has split poisons the handle, and later inserts and scans
    /// return `Error::IndexPoisoned`. No page stays pinned after return
    /// either way.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        self.ensure_usable()?;
        insert::insert(&self.bpm, &mut self.tree, key, rid)
    }

    /// Whether a failed split has left the tree unusable.
    pub fn is_poisoned(&self) -> bool {
        self.tree.poisoned
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.tree.poisoned {
            return Err(Error::IndexPoisoned {
                index_name: self.index_name.clone(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// Begin a range scan, ending any scan already in progress.
    ///
    /// `low_op` must be [`Operator::Gt`] or [`Operator::Gte`] and `high_op`
    /// [`Operator::Lt`] or [`Operator::Lte`].
    ///
    /// # Errors
    /// - `Error::BadOpcode` / `Error::BadScanRange` before any page is read;
    ///   a scan already in progress is left running
    /// - `Error::NoSuchKey` if nothing lies in the range
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Result<()> {
        self.ensure_usable()?;
        let bounds = ScanBounds::new(low, low_op, high, high_op)?;
        self.scan.start(&self.bpm, &self.tree, bounds)
    }

    /// Record id of the next entry in the range.
    ///
    /// # Errors
    /// - `Error::ScanNotInitialized` without an active scan
    /// - `Error::ScanCompleted` once the range is exhausted, on every call
    ///   until [`BTreeIndex::end_scan`]
    pub fn scan_next(&mut self) -> Result<RecordId> {
        self.ensure_usable()?;
        self.scan.next(&self.bpm)
    }

    /// Finish the active scan and release its leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        self.scan.end(&self.bpm)
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_active()
    }

    /// Run a whole scan and collect its record ids.
    ///
    /// An empty range gives an empty vector rather than `NoSuchKey`.
    pub fn scan_range(
        &mut self,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Result<Vec<RecordId>> {
        match self.start_scan(low, low_op, high, high_op) {
            Ok(()) => {}
            Err(Error::NoSuchKey) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        }

        let mut rids = Vec::new();
        loop {
            match self.scan_next() {
                Ok(rid) => rids.push(rid),
                Err(Error::ScanCompleted) => break,
                Err(err) => {
                    let _ = self.end_scan();
                    return Err(err);
                }
            }
        }
        self.end_scan()?;
        Ok(rids)
    }

    // ========================================================================
    // Info
    // ========================================================================

    /// `"<relation>.<attr offset>"`, also the file name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn height(&self) -> u32 {
        self.tree.height
    }

    pub fn root_page_id(&self) -> PageId {
        self.tree.root
    }

    pub fn attr_byte_offset(&self) -> i32 {
        self.tree.attr_byte_offset
    }

    pub fn leaf_capacity(&self) -> usize {
        self.tree.leaf_capacity
    }

    pub fn internal_capacity(&self) -> usize {
        self.tree.internal_capacity
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.bpm
    }

    /// Write every dirty page back and sync the file.
    pub fn flush(&self) -> Result<()> {
        self.bpm.flush_all_pages()?;
        debug!(
            target: "pagedindex::btree",
            index = %self.index_name,
            stats = %self.bpm.stats().snapshot(),
            "flushed index"
        );
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if self.scan.is_active() {
            if let Err(err) = self.scan.end(&self.bpm) {
                warn!(target: "pagedindex::btree", index = %self.index_name, error = %err, "failed to end scan on drop");
            }
        }
        if let Err(err) = self.flush() {
            warn!(target: "pagedindex::btree", index = %self.index_name, error = %err, "failed to flush index on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::common::config::IndexConfig;
    use crate::relation::{tuple_with_key, MemoryRelation};

    #[test]
    fn test_poisoned_handle_rejects_inserts_and_scans() {
        let dir = TempDir::new().unwrap();
        let mut source = MemoryRelation::new("emp");
        source.push_record(tuple_with_key(8, 0, 10));
        let config = IndexConfig::default()
            .with_leaf_capacity(1)
            .with_internal_capacity(2);
        let mut index =
            BTreeIndex::open_or_create(dir.path(), "emp", 0, AttrType::Integer, &mut source, config)
                .unwrap();

        index.start_scan(0, Operator::Gte, 100, Operator::Lte).unwrap();
        index.tree.header_page_id = PageId::new(999);
        let rid = RecordId::new(PageId::new(3), 1);
        assert!(matches!(
            index.insert_entry(20, rid),
            Err(Error::PageNotFound(999))
        ));
        assert!(index.is_poisoned());

        assert!(matches!(
            index.scan_next(),
            Err(Error::IndexPoisoned { .. })
        ));
        index.end_scan().unwrap();
        assert!(matches!(
            index.insert_entry(30, rid),
            Err(Error::IndexPoisoned { .. })
        ));
        assert!(matches!(
            index.start_scan(0, Operator::Gte, 100, Operator::Lte),
            Err(Error::IndexPoisoned { .. })
        ));
        assert_eq!(index.buffer_pool().pinned_total(), 0);
    }
}

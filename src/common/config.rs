//! Configuration constants and index tuning knobs.

use crate::common::{Error, Result};
use crate::index::btree::node::{InternalNode, LeafNode};

/// Size of a page in bytes (4KB).
///
/// Every index page (header, leaf, internal) occupies exactly one page, so
/// this value bounds the node capacities below.
pub const PAGE_SIZE: usize = 4096;

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Floor on the pool size regardless of capacities: header, root and a
/// split page.
pub const MIN_POOL_SIZE: usize = 4;

/// Page ids are `u32`, so a file never holds more pages than this.
const MAX_FILE_PAGES: u64 = u32::MAX as u64;

/// Tuning knobs for a [`BTreeIndex`](crate::BTreeIndex).
///
/// Capacities default to the largest values that fit in a page. Smaller
/// values are useful for exercising splits with few keys.
///
/// # Example
/// ```
/// use pagedindex::IndexConfig;
///
/// let config = IndexConfig::default()
///     .with_leaf_capacity(3)
///     .with_internal_capacity(3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// Maximum entries per leaf node (L).
    pub leaf_capacity: usize,
    /// Maximum keys per internal node (N).
    pub internal_capacity: usize,
}

impl IndexConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_leaf_capacity(mut self, leaf_capacity: usize) -> Self {
        self.leaf_capacity = leaf_capacity;
        self
    }

    pub fn with_internal_capacity(mut self, internal_capacity: usize) -> Self {
        self.internal_capacity = internal_capacity;
        self
    }

    /// Tallest tree these capacities can reach before page ids run out.
    ///
    /// Every non-root internal node keeps at least `N/2 + 1` children after
    /// a split and the root keeps two, so a tree of height `h >= 2` has at
    /// least `2 * (N/2 + 1)^(h-2)` leaves.
    pub fn max_height(&self) -> usize {
        let fanout = (self.internal_capacity / 2 + 1).max(2) as u64;
        let mut height = 1;
        let mut min_leaves: u64 = 1;
        loop {
            let next = if height == 1 { 2 } else { min_leaves.saturating_mul(fanout) };
            if next > MAX_FILE_PAGES {
                return height;
            }
            min_leaves = next;
            height += 1;
        }
    }

    /// Frames an insert can pin at once on the tallest tree: every ancestor,
    /// the leaf, the new sibling, plus the page held by an open scan.
    pub fn min_pool_size(&self) -> usize {
        (self.max_height() + 2).max(MIN_POOL_SIZE)
    }

    /// Check every knob against the page layout.
    ///
    /// # Errors
    /// `Error::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_capacity == 0 || self.leaf_capacity > LeafNode::MAX_CAPACITY {
            return Err(Error::InvalidConfig(format!(
                "leaf_capacity {} must be in 1..={}",
                self.leaf_capacity,
                LeafNode::MAX_CAPACITY
            )));
        }
        if self.internal_capacity < 2 || self.internal_capacity > InternalNode::MAX_CAPACITY {
            return Err(Error::InvalidConfig(format!(
                "internal_capacity {} must be in 2..={}",
                self.internal_capacity,
                InternalNode::MAX_CAPACITY
            )));
        }
        if self.pool_size < self.min_pool_size() {
            return Err(Error::InvalidConfig(format!(
                "pool_size {} cannot hold an insert path for internal_capacity {}; need at least {}",
                self.pool_size,
                self.internal_capacity,
                self.min_pool_size()
            )));
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            leaf_capacity: LeafNode::MAX_CAPACITY,
            internal_capacity: InternalNode::MAX_CAPACITY,
        }
    }
}

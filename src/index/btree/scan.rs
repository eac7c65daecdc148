//! Range scan engine.
//!
//! A scan descends once from the root to the leaf that may hold the lower
//! bound, then walks the leaf level through right-sibling links. Between
//! calls the cursor keeps its current leaf pinned with an explicit
//! [`BufferPoolManager::pin_page`], alongside a decoded copy of that leaf, so
//! it borrows nothing from the buffer pool.
//!
//! ```text
//!            start_scan ok
//!   ┌──────┐ ───────────────▶ ┌────────┐ ──┐ scan_next
//!   │ Idle │                  │ Active │ ◀─┘ (RecordId | ScanCompleted)
//!   └──────┘ ◀─────────────── └────────┘
//!            end_scan
//! ```

use tracing::{debug, trace};

use crate::buffer::BufferPoolManager;
use crate::common::{Error, PageId, RecordId, Result};

use super::node::{LeafNode, Node};
use super::TreeHandle;

/// Comparison operator for one end of a range scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// Validated scan range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanBounds {
    low: i32,
    low_op: Operator,
    high: i32,
    high_op: Operator,
}

impl ScanBounds {
    /// Check operators first, then the range.
    pub(crate) fn new(low: i32, low_op: Operator, high: i32, high_op: Operator) -> Result<Self> {
        let low_ok = matches!(low_op, Operator::Gt | Operator::Gte);
        let high_ok = matches!(high_op, Operator::Lt | Operator::Lte);
        if !low_ok || !high_ok {
            return Err(Error::BadOpcode);
        }
        if low > high {
            return Err(Error::BadScanRange { low, high });
        }
        Ok(Self {
            low,
            low_op,
            high,
            high_op,
        })
    }

    #[inline]
    pub(crate) fn above_low(&self, key: i32) -> bool {
        match self.low_op {
            Operator::Gt => key > self.low,
            _ => key >= self.low,
        }
    }

    #[inline]
    pub(crate) fn below_high(&self, key: i32) -> bool {
        match self.high_op {
            Operator::Lt => key < self.high,
            _ => key <= self.high,
        }
    }
}

/// Position of an active scan. Owns one pin on `page_id`.
#[derive(Debug)]
pub(crate) struct ScanCursor {
    page_id: PageId,
    leaf: LeafNode,
    slot: usize,
    bounds: ScanBounds,
}

impl ScanCursor {
    /// Move to `next`, pinning it before the current leaf is released.
    fn hop(&mut self, bpm: &BufferPoolManager, next: PageId) -> Result<()> {
        let leaf = load_pinned_leaf(bpm, next, self.leaf.capacity())?;
        if let Err(err) = bpm.unpin_page(self.page_id, false) {
            let _ = bpm.unpin_page(next, false);
            return Err(err);
        }
        trace!(
            target: "pagedindex::btree",
            from = %self.page_id,
            to = %next,
            "scan followed right sibling"
        );
        self.page_id = next;
        self.leaf = leaf;
        self.slot = 0;
        Ok(())
    }

    /// Walk right to the first entry above the lower bound.
    ///
    /// Returns `false` when the leaf chain ends first.
    fn seek_low(&mut self, bpm: &BufferPoolManager) -> Result<bool> {
        loop {
            let bounds = self.bounds;
            if let Some(slot) = self.leaf.keys.iter().position(|&k| bounds.above_low(k)) {
                self.slot = slot;
                return Ok(true);
            }
            match self.leaf.right_sibling {
                Some(next) => self.hop(bpm, next)?,
                None => return Ok(false),
            }
        }
    }
}

/// Read and decode a leaf, then take a long-lived pin on it.
fn load_pinned_leaf(bpm: &BufferPoolManager, page_id: PageId, capacity: usize) -> Result<LeafNode> {
    let guard = bpm.fetch_page_read(page_id)?;
    let leaf = LeafNode::decode(&guard, page_id, capacity)?;
    bpm.pin_page(page_id)?;
    Ok(leaf)
}

/// Descend to the leftmost leaf that can hold a key `>= low`.
///
/// A leaf split copies its first right-hand key up as the separator, so keys
/// equal to a separator can also sit at the end of the left sibling; the
/// descent therefore follows the first separator `>= low`, not `> low`.
/// Each child is pinned before its parent's guard is dropped.
fn descend(bpm: &BufferPoolManager, tree: &TreeHandle, low: i32) -> Result<(PageId, LeafNode)> {
    let mut guard = bpm.fetch_page_read(tree.root)?;
    loop {
        let page_id = guard.page_id();
        match Node::decode(&guard, page_id, tree.leaf_capacity, tree.internal_capacity)? {
            Node::Internal(node) => {
                let child = node.children[node.seek_slot(low)];
                guard = bpm.fetch_page_read(child)?;
            }
            Node::Leaf(leaf) => {
                bpm.pin_page(page_id)?;
                return Ok((page_id, leaf));
            }
        }
    }
}

/// Scan state machine owned by the index handle.
#[derive(Debug, Default)]
pub(crate) enum ScanState {
    #[default]
    Idle,
    Active(ScanCursor),
}

impl ScanState {
    pub(crate) fn is_active(&self) -> bool {
        matches!(self, ScanState::Active(_))
    }

    /// Position a new scan at the first qualifying entry.
    ///
    /// Invalid bounds fail before any page is touched and leave the current
    /// scan running. Otherwise any current scan is ended first.
    pub(crate) fn start(
        &mut self,
        bpm: &BufferPoolManager,
        tree: &TreeHandle,
        bounds: ScanBounds,
    ) -> Result<()> {
        if self.is_active() {
            self.end(bpm)?;
        }

        let (page_id, leaf) = descend(bpm, tree, bounds.low)?;
        let mut cursor = ScanCursor {
            page_id,
            leaf,
            slot: 0,
            bounds,
        };

        let found = match cursor.seek_low(bpm) {
            Ok(found) => found && bounds.below_high(cursor.leaf.keys[cursor.slot]),
            Err(err) => {
                let _ = bpm.unpin_page(cursor.page_id, false);
                return Err(err);
            }
        };
        if !found {
            bpm.unpin_page(cursor.page_id, false)?;
            return Err(Error::NoSuchKey);
        }

        debug!(
            target: "pagedindex::btree",
            low = bounds.low,
            high = bounds.high,
            leaf = %cursor.page_id,
            slot = cursor.slot,
            "scan started"
        );
        *self = ScanState::Active(cursor);
        Ok(())
    }

    /// Next qualifying record id.
    ///
    /// `ScanCompleted` leaves the cursor where it is, so repeated calls keep
    /// failing the same way until the scan is ended.
    pub(crate) fn next(&mut self, bpm: &BufferPoolManager) -> Result<RecordId> {
        let cursor = match self {
            ScanState::Active(cursor) => cursor,
            ScanState::Idle => return Err(Error::ScanNotInitialized),
        };

        while cursor.slot >= cursor.leaf.len() {
            match cursor.leaf.right_sibling {
                Some(next) => cursor.hop(bpm, next)?,
                None => return Err(Error::ScanCompleted),
            }
        }

        let key = cursor.leaf.keys[cursor.slot];
        if !cursor.bounds.below_high(key) {
            return Err(Error::ScanCompleted);
        }
        let rid = cursor.leaf.rids[cursor.slot];
        cursor.slot += 1;
        Ok(rid)
    }

    /// Release the cursor's pin and return to `Idle`.
    pub(crate) fn end(&mut self, bpm: &BufferPoolManager) -> Result<()> {
        match std::mem::take(self) {
            ScanState::Idle => Err(Error::ScanNotInitialized),
            ScanState::Active(cursor) => {
                debug!(target: "pagedindex::btree", leaf = %cursor.page_id, "scan ended");
                bpm.unpin_page(cursor.page_id, false)
            }
        }
    }
}

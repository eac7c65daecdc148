//! Node codec: leaf and internal nodes to and from page bytes.
//!
//! Nodes are decoded into owned structs, edited in memory and encoded back.
//! Both layouts sit after the common [`PageHeader`] and use fixed offsets
//! derived from the node capacity, so a node never has to be parsed to find
//! its arrays.
//!
//! # Leaf layout
//! ```text
//! Offset          Size   Field
//! ------          ----   -----
//! 0               5      PageHeader (type = BTreeLeaf, checksum)
//! 5               4      count
//! 9               4      right sibling PageId (INVALID = none)
//! 13              4*L    keys[L] (i32)
//! 13 + 4L         6*L    rids[L] (page u32 + slot u16)
//! ```
//!
//! # Internal layout
//! ```text
//! Offset          Size       Field
//! ------          ----       -----
//! 0               5          PageHeader (type = BTreeInternal, checksum)
//! 5               4          count (number of keys)
//! 9               4          level (1 = children are leaves)
//! 13              4*N        keys[N] (i32)
//! 13 + 4N         4*(N+1)    children[N+1] (PageId)
//! ```

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, RecordId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

const OFFSET_COUNT: usize = PageHeader::SIZE;
const OFFSET_LINK: usize = OFFSET_COUNT + 4;
const OFFSET_KEYS: usize = OFFSET_LINK + 4;

/// First slot whose key is `> target`.
///
/// Used for internal-node child selection and leaf insertion, which places a
/// duplicate after every equal key already present.
#[inline]
pub fn upper_bound(keys: &[i32], target: i32) -> usize {
    keys.partition_point(|&k| k <= target)
}

/// First slot whose key is `>= target`.
#[inline]
pub fn lower_bound(keys: &[i32], target: i32) -> usize {
    keys.partition_point(|&k| k < target)
}

fn check_page(page: &Page, page_id: PageId, expected: PageType) -> Result<()> {
    if !page.verify_checksum() {
        return Err(Error::corrupted(page_id.0, "checksum mismatch"));
    }
    let found = page.page_type();
    if found != expected {
        return Err(Error::corrupted(
            page_id.0,
            format!("expected {:?} page, found {:?}", expected, found),
        ));
    }
    Ok(())
}

fn clear_body(page: &mut Page) {
    page.as_mut_slice()[PageHeader::SIZE..].fill(0);
}

// ============================================================================
// Leaf nodes
// ============================================================================

/// Leaf level of the tree: sorted `(key, rid)` pairs plus a right-sibling link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub keys: Vec<i32>,
    pub rids: Vec<RecordId>,
    pub right_sibling: Option<PageId>,
    capacity: usize,
}

impl LeafNode {
    const ENTRY_SIZE: usize = 4 + RecordId::SIZE;

    /// Largest L whose layout fits in one page.
    pub const MAX_CAPACITY: usize = (PAGE_SIZE - OFFSET_KEYS) / Self::ENTRY_SIZE;

    pub fn new(capacity: usize) -> Self {
        debug_assert!((1..=Self::MAX_CAPACITY).contains(&capacity));
        Self {
            keys: Vec::with_capacity(capacity),
            rids: Vec::with_capacity(capacity),
            right_sibling: None,
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Insert into a leaf with room, after any equal keys.
    ///
    /// # Panics
    /// Panics if the leaf is full; callers split instead.
    pub fn insert(&mut self, key: i32, rid: RecordId) {
        assert!(!self.is_full(), "insert into full leaf");
        let pos = upper_bound(&self.keys, key);
        self.keys.insert(pos, key);
        self.rids.insert(pos, rid);
    }

    /// Insert into a full leaf and split it.
    ///
    /// The L+1 entries are divided at `ceil((L+1)/2)`: the lower part stays
    /// in `self`, the upper part is returned as the new right node along with
    /// its first key, which is copied up as the separator. Sibling links are
    /// left for the caller, who knows the new page's id.
    pub fn split_insert(&mut self, key: i32, rid: RecordId) -> (LeafNode, i32) {
        debug_assert!(self.is_full());
        let pos = upper_bound(&self.keys, key);
        self.keys.insert(pos, key);
        self.rids.insert(pos, rid);

        let split = (self.capacity + 1).div_ceil(2);
        let mut right = LeafNode::new(self.capacity);
        right.keys = self.keys.split_off(split);
        right.rids = self.rids.split_off(split);

        let separator = right.keys[0];
        (right, separator)
    }

    pub fn decode(page: &Page, page_id: PageId, capacity: usize) -> Result<Self> {
        check_page(page, page_id, PageType::BTreeLeaf)?;

        let count = page.read_u32(OFFSET_COUNT) as usize;
        if count > capacity {
            return Err(Error::corrupted(
                page_id.0,
                format!("leaf count {} exceeds capacity {}", count, capacity),
            ));
        }

        let rid_base = OFFSET_KEYS + 4 * capacity;
        let mut node = LeafNode::new(capacity);
        node.right_sibling = PageId::from_raw(page.read_u32(OFFSET_LINK));
        for i in 0..count {
            node.keys.push(page.read_i32(OFFSET_KEYS + 4 * i));
            node.rids.push(RecordId::from_bytes(
                page.read_bytes(rid_base + RecordId::SIZE * i, RecordId::SIZE),
            ));
        }
        Ok(node)
    }

    pub fn encode_into(&self, page: &mut Page) {
        clear_body(page);
        page.write_u32(OFFSET_COUNT, self.len() as u32);
        page.write_u32(OFFSET_LINK, PageId::to_raw(self.right_sibling));

        let rid_base = OFFSET_KEYS + 4 * self.capacity;
        for (i, (key, rid)) in self.keys.iter().zip(&self.rids).enumerate() {
            page.write_i32(OFFSET_KEYS + 4 * i, *key);
            page.write_bytes(rid_base + RecordId::SIZE * i, &rid.to_bytes());
        }
        page.seal(PageType::BTreeLeaf);
    }
}

// ============================================================================
// Internal nodes
// ============================================================================

/// Non-leaf level: separator keys with one more child pointer than keys.
///
/// Child `i` covers keys in `[keys[i-1], keys[i]]`, open at both ends of the
/// node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub keys: Vec<i32>,
    pub children: Vec<PageId>,
    /// Distance above the leaves; 1 means the children are leaves.
    pub level: u32,
    capacity: usize,
}

impl InternalNode {
    /// Largest N whose layout fits in one page.
    pub const MAX_CAPACITY: usize = (PAGE_SIZE - OFFSET_KEYS - 4) / 8;

    /// A new root over two children.
    pub fn new_root(capacity: usize, level: u32, left: PageId, key: i32, right: PageId) -> Self {
        debug_assert!((2..=Self::MAX_CAPACITY).contains(&capacity));
        let mut keys = Vec::with_capacity(capacity + 1);
        keys.push(key);
        let mut children = Vec::with_capacity(capacity + 2);
        children.push(left);
        children.push(right);
        Self {
            keys,
            children,
            level,
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Child slot an insert of `key` descends into.
    #[inline]
    pub fn child_slot(&self, key: i32) -> usize {
        upper_bound(&self.keys, key)
    }

    /// Leftmost child slot that can hold an entry `>= key`.
    ///
    /// A leaf split copies its separator up, so equal keys may remain in the
    /// left sibling; scans start here and walk right.
    #[inline]
    pub fn seek_slot(&self, key: i32) -> usize {
        lower_bound(&self.keys, key)
    }

    /// Add `right_child` immediately after the child at `slot`, separated by
    /// `key`.
    ///
    /// # Panics
    /// Panics if the node is full; callers split instead.
    pub fn insert_after(&mut self, slot: usize, key: i32, right_child: PageId) {
        assert!(!self.is_full(), "insert into full internal node");
        self.keys.insert(slot, key);
        self.children.insert(slot + 1, right_child);
    }

    /// Insert into a full node and split it.
    ///
    /// With N+1 keys and N+2 children, `split = N/2 + N%2`: keys `[0, split)`
    /// and children `[0, split]` stay, key `split` is returned for promotion
    /// and dropped from both halves, and the rest form the right node.
    pub fn split_insert(&mut self, slot: usize, key: i32, right_child: PageId) -> (InternalNode, i32) {
        debug_assert!(self.is_full());
        self.keys.insert(slot, key);
        self.children.insert(slot + 1, right_child);

        let split = self.capacity / 2 + self.capacity % 2;
        let right_keys = self.keys.split_off(split + 1);
        let right_children = self.children.split_off(split + 1);
        let promoted = self.keys.pop().unwrap_or_default();

        let right = InternalNode {
            keys: right_keys,
            children: right_children,
            level: self.level,
            capacity: self.capacity,
        };
        (right, promoted)
    }

    pub fn decode(page: &Page, page_id: PageId, capacity: usize) -> Result<Self> {
        check_page(page, page_id, PageType::BTreeInternal)?;

        let count = page.read_u32(OFFSET_COUNT) as usize;
        if count == 0 || count > capacity {
            return Err(Error::corrupted(
                page_id.0,
                format!("internal count {} outside 1..={}", count, capacity),
            ));
        }

        let child_base = OFFSET_KEYS + 4 * capacity;
        let keys = (0..count)
            .map(|i| page.read_i32(OFFSET_KEYS + 4 * i))
            .collect();
        let children = (0..=count)
            .map(|i| PageId::new(page.read_u32(child_base + 4 * i)))
            .collect();

        Ok(Self {
            keys,
            children,
            level: page.read_u32(OFFSET_LINK),
            capacity,
        })
    }

    pub fn encode_into(&self, page: &mut Page) {
        debug_assert_eq!(self.children.len(), self.keys.len() + 1);
        clear_body(page);
        page.write_u32(OFFSET_COUNT, self.len() as u32);
        page.write_u32(OFFSET_LINK, self.level);

        let child_base = OFFSET_KEYS + 4 * self.capacity;
        for (i, key) in self.keys.iter().enumerate() {
            page.write_i32(OFFSET_KEYS + 4 * i, *key);
        }
        for (i, child) in self.children.iter().enumerate() {
            page.write_u32(child_base + 4 * i, child.0);
        }
        page.seal(PageType::BTreeInternal);
    }
}

// ============================================================================
// Either kind
// ============================================================================

/// A node decoded by its page type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    pub fn decode(
        page: &Page,
        page_id: PageId,
        leaf_capacity: usize,
        internal_capacity: usize,
    ) -> Result<Self> {
        match page.page_type() {
            PageType::BTreeLeaf => LeafNode::decode(page, page_id, leaf_capacity).map(Node::Leaf),
            PageType::BTreeInternal => {
                InternalNode::decode(page, page_id, internal_capacity).map(Node::Internal)
            }
            other => Err(Error::corrupted(
                page_id.0,
                format!("expected a B+Tree node, found {:?}", other),
            )),
        }
    }
}

//! Structural verification and leaf-level dumps.
//!
//! `verify` checks, for every node reachable from the root:
//! - keys are non-decreasing and within the separator bounds of the parent
//! - internal nodes have one more child than keys and the expected level
//! - every leaf sits at depth `height`
//! - the right-sibling chain visits the leaves in tree order and ends there
//!
//! Nodes are decoded and released one at a time, so verification pins a
//! single page at any moment.

use crate::common::{Error, PageId, RecordId, Result};

use super::node::{LeafNode, Node};
use super::BTreeIndex;

/// Shape of a tree that passed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    pub height: u32,
    pub leaf_pages: usize,
    pub internal_pages: usize,
    pub entries: usize,
}

/// Keys a subtree may hold, inherited from separators above it.
#[derive(Debug, Clone, Copy)]
struct KeyRange {
    low: Option<i32>,
    high: Option<i32>,
}

impl KeyRange {
    const ALL: KeyRange = KeyRange {
        low: None,
        high: None,
    };

    fn contains(&self, key: i32) -> bool {
        let above = match self.low {
            Some(low) => key >= low,
            None => true,
        };
        let below = match self.high {
            Some(high) => key <= high,
            None => true,
        };
        above && below
    }
}

struct Walk<'a> {
    index: &'a BTreeIndex,
    stats: TreeStats,
    leaves: Vec<PageId>,
}

impl Walk<'_> {
    fn read(&self, page_id: PageId) -> Result<Node> {
        let tree = &self.index.tree;
        let guard = self.index.bpm.fetch_page_read(page_id)?;
        let node = Node::decode(&guard, page_id, tree.leaf_capacity, tree.internal_capacity)?;
        Ok(node)
    }

    fn visit(&mut self, page_id: PageId, depth: u32, range: KeyRange) -> Result<()> {
        let height = self.index.tree.height;
        match self.read(page_id)? {
            Node::Leaf(leaf) => {
                if depth != height {
                    return Err(Error::corrupted(
                        page_id.0,
                        format!("leaf at depth {} in tree of height {}", depth, height),
                    ));
                }
                check_keys(page_id, &leaf.keys, range)?;
                self.stats.leaf_pages += 1;
                self.stats.entries += leaf.len();
                self.leaves.push(page_id);
            }
            Node::Internal(node) => {
                if depth >= height || node.level != height - depth {
                    return Err(Error::corrupted(
                        page_id.0,
                        format!("internal level {} at depth {} in tree of height {}", node.level, depth, height),
                    ));
                }
                if node.children.len() != node.keys.len() + 1 {
                    return Err(Error::corrupted(page_id.0, "fanout does not match key count"));
                }
                check_keys(page_id, &node.keys, range)?;
                self.stats.internal_pages += 1;

                for (i, &child) in node.children.iter().enumerate() {
                    let child_range = KeyRange {
                        low: if i == 0 { range.low } else { Some(node.keys[i - 1]) },
                        high: node.keys.get(i).copied().or(range.high),
                    };
                    self.visit(child, depth + 1, child_range)?;
                }
            }
        }
        Ok(())
    }

    /// Follow sibling links from the leftmost leaf and compare with the
    /// leaves found by the descent.
    fn check_chain(&self) -> Result<()> {
        let tree = &self.index.tree;
        let mut previous: Option<i32> = None;
        let mut current = self.leaves.first().copied();

        for (position, &expected) in self.leaves.iter().enumerate() {
            let page_id = current.ok_or_else(|| {
                Error::corrupted(expected.0, "sibling chain ended before this leaf")
            })?;
            if page_id != expected {
                return Err(Error::corrupted(
                    page_id.0,
                    format!("sibling chain position {} reaches this page, expected {}", position, expected),
                ));
            }

            let Node::Leaf(leaf) = self.read(page_id)? else {
                return Err(Error::corrupted(page_id.0, "sibling link to a non-leaf"));
            };
            if let (Some(prev), Some(&first)) = (previous, leaf.keys.first()) {
                if first < prev {
                    return Err(Error::corrupted(page_id.0, "keys decrease across sibling link"));
                }
            }
            previous = leaf.keys.last().copied().or(previous);
            current = leaf.right_sibling;
        }

        if let Some(extra) = current {
            return Err(Error::corrupted(
                extra.0,
                format!("sibling chain continues past the last leaf (tree root {})", tree.root),
            ));
        }
        Ok(())
    }
}

fn check_keys(page_id: PageId, keys: &[i32], range: KeyRange) -> Result<()> {
    if keys.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(Error::corrupted(page_id.0, "keys out of order"));
    }
    if let Some(&key) = keys.iter().find(|&&key| !range.contains(key)) {
        return Err(Error::corrupted(
            page_id.0,
            format!("key {} outside separator range {:?}..={:?}", key, range.low, range.high),
        ));
    }
    Ok(())
}

impl BTreeIndex {
    /// Walk the whole tree and check its structural invariants.
    ///
    /// # Errors
    /// `Error::Corrupted` naming the first offending page, or a storage error.
    pub fn verify(&self) -> Result<TreeStats> {
        let mut walk = Walk {
            index: self,
            stats: TreeStats {
                height: self.tree.height,
                ..TreeStats::default()
            },
            leaves: Vec::new(),
        };
        walk.visit(self.tree.root, 1, KeyRange::ALL)?;
        walk.check_chain()?;
        Ok(walk.stats)
    }

    /// Every `(key, rid)` in leaf order, following sibling links from the
    /// leftmost leaf.
    pub fn leaf_entries(&self) -> Result<Vec<(i32, RecordId)>> {
        let tree = &self.tree;

        let mut page_id = tree.root;
        let leftmost = loop {
            let guard = self.bpm.fetch_page_read(page_id)?;
            match Node::decode(&guard, page_id, tree.leaf_capacity, tree.internal_capacity)? {
                Node::Internal(node) => page_id = node.children[0],
                Node::Leaf(leaf) => break leaf,
            }
        };

        let mut entries = Vec::new();
        let mut leaf = leftmost;
        loop {
            entries.extend(leaf.keys.iter().copied().zip(leaf.rids.iter().copied()));
            let Some(next) = leaf.right_sibling else {
                break;
            };
            let guard = self.bpm.fetch_page_read(next)?;
            leaf = LeafNode::decode(&guard, next, tree.leaf_capacity)?;
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_range_is_inclusive() {
        let range = KeyRange {
            low: Some(10),
            high: Some(20),
        };
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
        assert!(KeyRange::ALL.contains(i32::MIN));
    }

    #[test]
    fn test_check_keys() {
        let page = PageId::new(4);
        assert!(check_keys(page, &[1, 1, 2], KeyRange::ALL).is_ok());
        assert!(check_keys(page, &[2, 1], KeyRange::ALL).is_err());

        let range = KeyRange {
            low: Some(5),
            high: None,
        };
        assert!(matches!(
            check_keys(page, &[4, 6], range),
            Err(Error::Corrupted { page_id: 4, .. })
        ));
    }
}

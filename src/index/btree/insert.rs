//! Insert engine: top-down descent, leaf insertion and the split cascade.
//!
//! The descent keeps every ancestor pinned in a [`PathFrame`] together with
//! its decoded node and the child slot it was left through. A split at the
//! leaf pops frames one at a time; the first ancestor with room absorbs the
//! separator and the rest of the stack unpins clean. When the root itself
//! splits, a new root is allocated and the header page is rewritten.

use tracing::{debug, trace, warn};

use crate::buffer::{BufferPoolManager, PageWriteGuard};
use crate::common::{PageId, RecordId, Result};

use super::node::{InternalNode, Node};
use super::TreeHandle;

/// One pinned ancestor on the descent path.
struct PathFrame<'a> {
    guard: PageWriteGuard<'a>,
    node: InternalNode,
    /// Index of the child the descent continued into.
    slot: usize,
}

/// A split that the level below could not absorb.
struct Overflow {
    left: PageId,
    separator: i32,
    right: PageId,
}

pub(super) fn insert(
    bpm: &BufferPoolManager,
    tree: &mut TreeHandle,
    key: i32,
    rid: RecordId,
) -> Result<()> {
    let mut path: Vec<PathFrame<'_>> = Vec::with_capacity(tree.height as usize);
    let mut guard = bpm.fetch_page_write(tree.root)?;

    let mut leaf = loop {
        let page_id = guard.page_id();
        match Node::decode(&guard, page_id, tree.leaf_capacity, tree.internal_capacity)? {
            Node::Internal(node) => {
                let slot = node.child_slot(key);
                let child = bpm.fetch_page_write(node.children[slot])?;
                let parent = std::mem::replace(&mut guard, child);
                path.push(PathFrame {
                    guard: parent,
                    node,
                    slot,
                });
            }
            Node::Leaf(leaf) => break leaf,
        }
    };

    if !leaf.is_full() {
        leaf.insert(key, rid);
        leaf.encode_into(&mut guard);
        return Ok(());
    }

    let mut right_guard = bpm.new_page()?;
    let right_id = right_guard.page_id();
    let (mut right, separator) = leaf.split_insert(key, rid);
    right.right_sibling = leaf.right_sibling;
    leaf.right_sibling = Some(right_id);
    right.encode_into(&mut right_guard);
    leaf.encode_into(&mut guard);

    trace!(
        target: "pagedindex::btree",
        left = %guard.page_id(),
        right = %right_id,
        separator,
        left_len = leaf.len(),
        right_len = right.len(),
        "split leaf"
    );

    let overflow = Overflow {
        left: guard.page_id(),
        separator,
        right: right_id,
    };
    drop(right_guard);
    drop(guard);

    // The leaf is already split on its page; failing above it leaves the
    // right half unreachable from the root.
    let cascade = propagate(bpm, path, overflow).and_then(|pending| match pending {
        Some(overflow) => grow_root(bpm, tree, overflow),
        None => Ok(()),
    });
    if let Err(err) = &cascade {
        tree.poisoned = true;
        warn!(target: "pagedindex::btree", key, error = %err, "split cascade failed, index poisoned");
    }
    cascade
}

/// Push a split up the ancestor stack.
///
/// Returns the overflow still pending once the stack is empty, meaning the
/// root split.
fn propagate(
    bpm: &BufferPoolManager,
    mut path: Vec<PathFrame<'_>>,
    mut overflow: Overflow,
) -> Result<Option<Overflow>> {
    while let Some(mut frame) = path.pop() {
        if !frame.node.is_full() {
            frame
                .node
                .insert_after(frame.slot, overflow.separator, overflow.right);
            frame.node.encode_into(&mut frame.guard);
            return Ok(None);
        }

        let mut right_guard = bpm.new_page()?;
        let (right, promoted) =
            frame
                .node
                .split_insert(frame.slot, overflow.separator, overflow.right);
        right.encode_into(&mut right_guard);
        frame.node.encode_into(&mut frame.guard);

        trace!(
            target: "pagedindex::btree",
            left = %frame.guard.page_id(),
            right = %right_guard.page_id(),
            level = frame.node.level,
            promoted,
            "split internal node"
        );

        overflow = Overflow {
            left: frame.guard.page_id(),
            separator: promoted,
            right: right_guard.page_id(),
        };
    }
    Ok(Some(overflow))
}

fn grow_root(bpm: &BufferPoolManager, tree: &mut TreeHandle, overflow: Overflow) -> Result<()> {
    let mut root_guard = bpm.new_page()?;
    let root = InternalNode::new_root(
        tree.internal_capacity,
        tree.height,
        overflow.left,
        overflow.separator,
        overflow.right,
    );
    root.encode_into(&mut root_guard);

    tree.root = root_guard.page_id();
    tree.height += 1;
    drop(root_guard);

    debug!(
        target: "pagedindex::btree",
        root = %tree.root,
        height = tree.height,
        "grew new root"
    );
    tree.persist(bpm)
}

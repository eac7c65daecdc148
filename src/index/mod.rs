//! Index structures built on the buffer pool.
//!
//! - [`btree`] - Paged B+Tree over one integer attribute

pub mod btree;

pub use btree::{AttrType, BTreeIndex, Operator, TreeStats};

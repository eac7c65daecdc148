//! pagedindex - A disk-paged B+Tree secondary index over an `i32` attribute.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           pagedindex                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │      Index Layer (index/)        ◀── RecordSource        │   │
//! │  │  BTreeIndex: lifecycle │ insert │ range scan │ verify    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Buffer Pool (buffer/)                       │   │
//! │  │   BufferPoolManager + Frame + LRU replacer + Statistics  │   │
//! │  │   RAII page guards, explicit pin/unpin                   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Storage Layer (storage/)                    │   │
//! │  │         DiskManager + Page + PageHeader (CRC32)          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, RecordId, Error, config)
//! - [`storage`] - Disk I/O and page formats
//! - [`buffer`] - Buffer pool management and eviction
//! - [`index`] - The B+Tree index
//! - [`relation`] - Record sources an index is built from
//!
//! # Quick Start
//! ```no_run
//! use pagedindex::{AttrType, BTreeIndex, IndexConfig, MemoryRelation, Operator};
//! use pagedindex::relation::tuple_with_key;
//!
//! let mut relation = MemoryRelation::new("emp");
//! for key in 0..1000 {
//!     relation.push_record(tuple_with_key(16, 8, key));
//! }
//!
//! let mut index = BTreeIndex::open_or_create(
//!     "/tmp/indexes",
//!     "emp",
//!     8,
//!     AttrType::Integer,
//!     &mut relation,
//!     IndexConfig::default(),
//! )?;
//!
//! let rids = index.scan_range(100, Operator::Gte, 200, Operator::Lt)?;
//! assert_eq!(rids.len(), 100);
//! # Ok::<(), pagedindex::Error>(())
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod relation;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{IndexConfig, PAGE_SIZE};
pub use common::{Error, PageId, RecordId, Result};

pub use buffer::{BufferPoolManager, StatsSnapshot};
pub use index::{AttrType, BTreeIndex, Operator, TreeStats};
pub use relation::{MemoryRelation, RecordSource};

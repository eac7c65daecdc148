//! Eviction policy implementations (replacers).
//!
//! - [`LruReplacer`] - Least Recently Used over unpinned frames

mod lru;

pub use lru::LruReplacer;

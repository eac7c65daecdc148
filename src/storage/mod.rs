//! Storage layer - disk I/O and page formats.
//!
//! This module is the page store under the buffer pool:
//! - [`DiskManager`] - Low-level file I/O for one index file
//! - [`page`] - Page types and layouts

mod disk_manager;
pub mod page;

pub use disk_manager::DiskManager;

//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container with little-endian accessors
//! - [`PageHeader`] - Type tag and checksum at the start of every page
//! - [`PageType`] - Discriminator for header, leaf and internal pages

#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use page::Page;
pub use page_header::{PageHeader, PageType};

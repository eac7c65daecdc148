//! Index header page: the persistent identity of an index file.
//!
//! # Layout
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       5     PageHeader (type = IndexHeader, checksum)
//! 5       4     magic
//! 9       32    relation name (truncated, zero-padded)
//! 41      4     attribute byte offset (i32)
//! 45      1     attribute type
//! 46      4     root PageId
//! 50      4     height
//! 54      4     leaf capacity
//! 58      4     internal capacity
//! ```

use std::fmt;

use crate::common::{Error, PageId, Result};
use crate::index::btree::node::{InternalNode, LeafNode};
use crate::storage::page::{Page, PageHeader, PageType};

/// Bytes reserved for the relation name.
pub const RELATION_NAME_LEN: usize = 32;

/// "BPIX" in little-endian.
const MAGIC: u32 = 0x5849_5042;

const OFFSET_MAGIC: usize = PageHeader::SIZE;
const OFFSET_NAME: usize = OFFSET_MAGIC + 4;
const OFFSET_ATTR_OFFSET: usize = OFFSET_NAME + RELATION_NAME_LEN;
const OFFSET_ATTR_TYPE: usize = OFFSET_ATTR_OFFSET + 4;
const OFFSET_ROOT: usize = OFFSET_ATTR_TYPE + 1;
const OFFSET_HEIGHT: usize = OFFSET_ROOT + 4;
const OFFSET_LEAF_CAP: usize = OFFSET_HEIGHT + 4;
const OFFSET_INTERNAL_CAP: usize = OFFSET_LEAF_CAP + 4;

/// Type of the indexed attribute.
///
/// Only [`AttrType::Integer`] can be indexed; the other tags are kept so a
/// header written by a future version is rejected rather than misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttrType {
    Integer = 0,
    Double = 1,
    String = 2,
}

impl AttrType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AttrType::Integer),
            1 => Some(AttrType::Double),
            2 => Some(AttrType::String),
            _ => None,
        }
    }

    /// Reject anything but integers.
    pub fn ensure_indexable(self) -> Result<()> {
        match self {
            AttrType::Integer => Ok(()),
            other => Err(Error::UnsupportedAttrType(other.to_string())),
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrType::Integer => "INTEGER",
            AttrType::Double => "DOUBLE",
            AttrType::String => "STRING",
        };
        f.write_str(name)
    }
}

/// File name of the index on `relation_name` at `attr_byte_offset`.
pub fn index_file_name(relation_name: &str, attr_byte_offset: i32) -> String {
    format!("{}.{}", relation_name, attr_byte_offset)
}

/// Relation name as stored: UTF-8 bytes cut at [`RELATION_NAME_LEN`], rest zeroed.
pub fn encode_relation_name(name: &str) -> [u8; RELATION_NAME_LEN] {
    let mut out = [0u8; RELATION_NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(RELATION_NAME_LEN);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub relation_name: [u8; RELATION_NAME_LEN],
    pub attr_byte_offset: i32,
    pub attr_type: AttrType,
    pub root_page_id: PageId,
    pub height: u32,
    pub leaf_capacity: u32,
    pub internal_capacity: u32,
}

impl IndexHeader {
    /// Whether this header describes the index on the given attribute.
    pub fn matches(&self, relation_name: &str, attr_byte_offset: i32, attr_type: AttrType) -> bool {
        self.relation_name == encode_relation_name(relation_name)
            && self.attr_byte_offset == attr_byte_offset
            && self.attr_type == attr_type
    }

    /// Stored relation name with the padding stripped.
    pub fn relation_name(&self) -> String {
        let end = self
            .relation_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_LEN);
        String::from_utf8_lossy(&self.relation_name[..end]).into_owned()
    }

    pub fn encode_into(&self, page: &mut Page) {
        page.as_mut_slice()[PageHeader::SIZE..].fill(0);
        page.write_u32(OFFSET_MAGIC, MAGIC);
        page.write_bytes(OFFSET_NAME, &self.relation_name);
        page.write_i32(OFFSET_ATTR_OFFSET, self.attr_byte_offset);
        page.write_bytes(OFFSET_ATTR_TYPE, &[self.attr_type as u8]);
        page.write_u32(OFFSET_ROOT, self.root_page_id.0);
        page.write_u32(OFFSET_HEIGHT, self.height);
        page.write_u32(OFFSET_LEAF_CAP, self.leaf_capacity);
        page.write_u32(OFFSET_INTERNAL_CAP, self.internal_capacity);
        page.seal(PageType::IndexHeader);
    }

    pub fn decode(page: &Page, page_id: PageId) -> Result<Self> {
        if !page.verify_checksum() {
            return Err(Error::corrupted(page_id.0, "header checksum mismatch"));
        }
        if page.page_type() != PageType::IndexHeader || page.read_u32(OFFSET_MAGIC) != MAGIC {
            return Err(Error::corrupted(page_id.0, "not an index header page"));
        }

        let mut relation_name = [0u8; RELATION_NAME_LEN];
        relation_name.copy_from_slice(page.read_bytes(OFFSET_NAME, RELATION_NAME_LEN));

        let raw_type = page.read_bytes(OFFSET_ATTR_TYPE, 1)[0];
        let attr_type = AttrType::from_u8(raw_type).ok_or_else(|| {
            Error::corrupted(page_id.0, format!("unknown attribute type {}", raw_type))
        })?;

        let root_page_id = PageId::from_raw(page.read_u32(OFFSET_ROOT))
            .ok_or_else(|| Error::corrupted(page_id.0, "header has no root page"))?;

        let height = page.read_u32(OFFSET_HEIGHT);
        if height == 0 {
            return Err(Error::corrupted(page_id.0, "header height is 0"));
        }

        let leaf_capacity = page.read_u32(OFFSET_LEAF_CAP);
        let internal_capacity = page.read_u32(OFFSET_INTERNAL_CAP);
        if !(1..=LeafNode::MAX_CAPACITY).contains(&(leaf_capacity as usize))
            || !(2..=InternalNode::MAX_CAPACITY).contains(&(internal_capacity as usize))
        {
            return Err(Error::corrupted(
                page_id.0,
                format!(
                    "capacities L={} N={} do not fit a page",
                    leaf_capacity, internal_capacity
                ),
            ));
        }

        Ok(Self {
            relation_name,
            attr_byte_offset: page.read_i32(OFFSET_ATTR_OFFSET),
            attr_type,
            root_page_id,
            height,
            leaf_capacity,
            internal_capacity,
        })
    }
}

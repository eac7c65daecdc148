//! Record sources: where an index reads tuples from when it is built.
//!
//! An index does not know how a relation is stored. It only needs a finite,
//! restartable stream of `(RecordId, tuple bytes)` and the byte offset of the
//! indexed `i32` inside each tuple.

use crate::common::{Error, PageId, RecordId, Result};

/// A finite stream of records that can be restarted from the beginning.
pub trait RecordSource {
    /// Next record, or `Ok(None)` once the source is exhausted.
    fn next_record(&mut self) -> Result<Option<(RecordId, Vec<u8>)>>;

    /// Restart from the first record.
    fn rewind(&mut self) -> Result<()>;
}

/// Read the little-endian `i32` at `attr_byte_offset` of `tuple`.
///
/// # Errors
/// `Error::TupleTooShort` if the offset is negative or the four bytes run
/// past the end of the tuple.
pub fn extract_key(tuple: &[u8], attr_byte_offset: i32) -> Result<i32> {
    let too_short = || Error::TupleTooShort {
        offset: attr_byte_offset,
        len: tuple.len(),
    };
    let start = usize::try_from(attr_byte_offset).map_err(|_| too_short())?;
    let bytes = start
        .checked_add(4)
        .and_then(|end| tuple.get(start..end))
        .ok_or_else(too_short)?;

    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    Ok(i32::from_le_bytes(raw))
}

/// A zeroed tuple of `len` bytes with `key` stored at `attr_byte_offset`.
///
/// # Panics
/// Panics if the key does not fit.
pub fn tuple_with_key(len: usize, attr_byte_offset: usize, key: i32) -> Vec<u8> {
    let mut tuple = vec![0u8; len];
    tuple[attr_byte_offset..attr_byte_offset + 4].copy_from_slice(&key.to_le_bytes());
    tuple
}

/// Relation held entirely in memory.
///
/// Record ids are assigned in insertion order, [`MemoryRelation::SLOTS_PER_PAGE`]
/// records to a page, so they look like ids from a slotted heap file.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelation {
    name: String,
    records: Vec<(RecordId, Vec<u8>)>,
    cursor: usize,
}

impl MemoryRelation {
    pub const SLOTS_PER_PAGE: usize = 64;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            cursor: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a tuple and return the id it was given.
    pub fn push_record(&mut self, tuple: Vec<u8>) -> RecordId {
        let n = self.records.len();
        let rid = RecordId::new(
            PageId::new((n / Self::SLOTS_PER_PAGE) as u32),
            (n % Self::SLOTS_PER_PAGE) as u16,
        );
        self.records.push((rid, tuple));
        rid
    }

    /// Record ids in insertion order.
    pub fn record_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.iter().map(|(rid, _)| *rid)
    }
}

impl RecordSource for MemoryRelation {
    fn next_record(&mut self) -> Result<Option<(RecordId, Vec<u8>)>> {
        let record = self.records.get(self.cursor).cloned();
        if record.is_some() {
            self.cursor += 1;
        }
        Ok(record)
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

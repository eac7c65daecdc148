//! RAII guards for page access.
//!
//! - [`PageReadGuard`] - Shared read access; unpins clean on drop
//! - [`PageWriteGuard`] - Exclusive access; unpins dirty on drop only if the
//!   page was actually mutated through the guard
//!
//! Holding a guard is holding a pin. The B+Tree keeps guards on its ancestor
//! path while it decides whether a split has to propagate, and ancestors
//! that end up untouched go back to the pool clean.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// One pin on a frame, released on drop.
struct Pin<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    dirty: bool,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page_internal(self.frame_id, self.dirty);
    }
}

/// Guard for read-only page access.
///
/// Multiple `PageReadGuard`s can exist for the same page simultaneously.
pub struct PageReadGuard<'a> {
    // Field order matters: the latch is released before the pin.
    lock: RwLockReadGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        let pin = Pin {
            bpm,
            frame_id,
            page_id,
            dirty: false,
        };
        Self { lock, pin }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

/// Guard for exclusive access to a page.
///
/// The first mutable dereference marks the guard dirty; a guard that was
/// only read through unpins clean.
///
/// # Example
/// ```ignore
/// let mut guard = bpm.fetch_page_write(page_id)?;
/// let count = guard.read_u32(5);   // Deref: still clean
/// guard.write_u32(5, count + 1);   // DerefMut: now dirty
/// ```
pub struct PageWriteGuard<'a> {
    lock: RwLockWriteGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        let pin = Pin {
            bpm,
            frame_id,
            page_id,
            dirty: false,
        };
        Self { lock, pin }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Whether the page has been mutated through this guard.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.pin.dirty
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.pin.dirty = true;
        &mut self.lock
    }
}

//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] pairs a [`Page`] buffer with the [`FrameState`] the pool uses
//! to decide whether that page may leave memory.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// Residency bookkeeping for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameState {
    /// Page currently loaded, `None` while the frame is free.
    pub page_id: Option<PageId>,
    pub pin_count: u32,
    /// The buffer is newer than the page on disk.
    pub is_dirty: bool,
}

/// A frame in the buffer pool.
///
/// Page bytes sit behind an `RwLock` so read guards share and write guards
/// exclude. The state is a separate small mutex, never held across I/O.
pub struct Frame {
    page: RwLock<Page>,
    state: Mutex<FrameState>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            state: Mutex::new(FrameState::default()),
        }
    }

    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// Copy of the current state.
    pub fn state(&self) -> FrameState {
        *self.state.lock()
    }

    /// Record that `page_id` now occupies this frame, clean and pinned once.
    pub fn assign(&self, page_id: PageId) {
        *self.state.lock() = FrameState {
            page_id: Some(page_id),
            pin_count: 1,
            is_dirty: false,
        };
    }

    /// Return the frame to the free state.
    pub fn clear(&self) {
        *self.state.lock() = FrameState::default();
    }

    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        self.state.lock().page_id
    }

    /// Add a pin. Returns the new pin count.
    pub fn pin(&self) -> u32 {
        let mut state = self.state.lock();
        state.pin_count += 1;
        state.pin_count
    }

    /// Drop a pin, folding in whether the holder wrote to the page.
    /// Returns the pins left.
    ///
    /// # Panics
    /// Panics if the frame has no pins.
    pub fn unpin(&self, is_dirty: bool) -> u32 {
        let mut state = self.state.lock();
        assert!(state.pin_count > 0, "pin count underflow");
        state.pin_count -= 1;
        state.is_dirty |= is_dirty;
        state.pin_count
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.state.lock().pin_count
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().is_dirty
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        std::mem::take(&mut self.state.lock().is_dirty)
    }

    pub fn mark_dirty(&self) {
        self.state.lock().is_dirty = true;
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

//! Buffer Pool Manager - the page cache under the index.
//!
//! A fixed set of frames caches pages of one index file. A page stays in
//! its frame while it has pins; unpinned frames are recycled in LRU order,
//! writing dirty contents back first.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::buffer::replacer::LruReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Page cache over a single [`DiskManager`].
///
/// ```text
///   page_table: PageId -> FrameId       frames[FrameId] = page + FrameState
///   free_list:  never-used frames       replacer: LRU over unpinned frames
/// ```
///
/// # Pinning
/// Guards pin on creation and unpin on drop. A pin that must outlive any
/// borrow (the scan cursor's current leaf) uses [`BufferPoolManager::pin_page`]
/// and [`BufferPoolManager::unpin_page`] instead.
///
/// # Usage
/// ```ignore
/// let bpm = BufferPoolManager::new(16, DiskManager::create("emp.0")?);
///
/// let mut guard = bpm.new_page()?;
/// guard.write_u32(8, 1);
/// drop(guard); // unpinned dirty
///
/// assert_eq!(bpm.fetch_page_read(PageId::new(0))?.read_u32(8), 1);
/// ```
pub struct BufferPoolManager {
    frames: Vec<Frame>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    /// Frames that have never held a page, or whose load failed.
    free_list: Mutex<Vec<FrameId>>,
    replacer: Mutex<LruReplacer>,
    disk_manager: Mutex<DiskManager>,
    stats: BufferPoolStats,
}

impl BufferPoolManager {
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        assert!(pool_size > 0, "buffer pool needs at least one frame");

        Self {
            frames: (0..pool_size).map(|_| Frame::new()).collect(),
            // Reversed so frame 0 is handed out first.
            free_list: Mutex::new((0..pool_size).rev().map(FrameId::new).collect()),
            page_table: RwLock::new(HashMap::with_capacity(pool_size)),
            replacer: Mutex::new(LruReplacer::new()),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
        }
    }

    /// Pin `page_id` and latch it shared.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the file has no such page
    /// - `Error::NoFreeFrames` if every frame is pinned
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.acquire(page_id)?;
        let latch = self.frames[frame_id.0].page();
        Ok(PageReadGuard::new(self, frame_id, page_id, latch))
    }

    /// Pin `page_id` and latch it exclusive.
    ///
    /// # Errors
    /// As [`BufferPoolManager::fetch_page_read`].
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.acquire(page_id)?;
        let latch = self.frames[frame_id.0].page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, latch))
    }

    /// Grow the file by one page and return it zeroed, pinned and latched.
    ///
    /// The frame is claimed before the file grows, so `NoFreeFrames` leaves
    /// the file untouched.
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.claim_frame()?;

        let allocated = self.disk_manager.lock().allocate_page();
        let page_id = allocated.inspect_err(|_| self.free_list.lock().push(frame_id))?;
        BufferPoolStats::bump(&self.stats.pages_allocated);

        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        self.install(frame_id, page_id);

        Ok(PageWriteGuard::new(self, frame_id, page_id, frame.page_mut()))
    }

    /// Pin a page without borrowing it.
    ///
    /// The page stays resident until a matching [`BufferPoolManager::unpin_page`].
    /// Reading it still goes through a guard, which is then a guaranteed hit.
    pub fn pin_page(&self, page_id: PageId) -> Result<()> {
        self.acquire(page_id).map(drop)
    }

    /// Release one pin taken with [`BufferPoolManager::pin_page`].
    ///
    /// # Errors
    /// `Error::PageNotPinned` if the page is not resident or has no pins.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        match self.resident(page_id) {
            Some(frame_id) if self.frames[frame_id.0].is_pinned() => {
                self.unpin_page_internal(frame_id, is_dirty);
                Ok(())
            }
            _ => Err(Error::PageNotPinned(page_id.0)),
        }
    }

    /// Pin count of a resident page, or `None` if it is not in the pool.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.resident(page_id)
            .map(|frame_id| self.frames[frame_id.0].pin_count())
    }

    /// Total pins outstanding across the pool.
    pub fn pinned_total(&self) -> u32 {
        self.frames.iter().map(Frame::pin_count).sum()
    }

    /// Write back every dirty page, then sync the file.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<(PageId, FrameId)> = self
            .page_table
            .read()
            .iter()
            .map(|(&page_id, &frame_id)| (page_id, frame_id))
            .collect();

        resident
            .into_iter()
            .try_for_each(|(page_id, frame_id)| self.write_back(frame_id, page_id))?;
        self.disk_manager.lock().sync()
    }

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.page_table.read().len()
    }

    /// Drop one pin; called by guards and [`BufferPoolManager::unpin_page`].
    pub(crate) fn unpin_page_internal(&self, frame_id: FrameId, is_dirty: bool) {
        if self.frames[frame_id.0].unpin(is_dirty) == 0 {
            self.replacer.lock().set_evictable(frame_id, true);
        }
    }

    fn resident(&self, page_id: PageId) -> Option<FrameId> {
        self.page_table.read().get(&page_id).copied()
    }

    /// Pin `page_id`, reading it in on a miss.
    fn acquire(&self, page_id: PageId) -> Result<FrameId> {
        if let Some(frame_id) = self.resident(page_id) {
            self.frames[frame_id.0].pin();
            self.touch(frame_id);
            BufferPoolStats::bump(&self.stats.cache_hits);
            return Ok(frame_id);
        }

        BufferPoolStats::bump(&self.stats.cache_misses);
        let frame_id = self.claim_frame()?;

        let read = self.disk_manager.lock().read_page(page_id);
        let page = read.inspect_err(|_| self.free_list.lock().push(frame_id))?;
        BufferPoolStats::bump(&self.stats.pages_read);

        self.frames[frame_id.0].page_mut().copy_from(&page);
        self.install(frame_id, page_id);
        Ok(frame_id)
    }

    /// Map `page_id` to a freshly loaded frame holding one pin.
    fn install(&self, frame_id: FrameId, page_id: PageId) {
        self.frames[frame_id.0].assign(page_id);
        self.page_table.write().insert(page_id, frame_id);
        self.touch(frame_id);
    }

    fn touch(&self, frame_id: FrameId) {
        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);
    }

    /// An empty frame: from the free list, otherwise by evicting.
    fn claim_frame(&self) -> Result<FrameId> {
        let free = self.free_list.lock().pop();
        match free {
            Some(frame_id) => Ok(frame_id),
            None => self.evict(),
        }
    }

    fn evict(&self) -> Result<FrameId> {
        let frame_id = self.replacer.lock().evict().ok_or(Error::NoFreeFrames)?;
        BufferPoolStats::bump(&self.stats.evictions);

        let frame = &self.frames[frame_id.0];
        if let Some(victim) = frame.page_id() {
            if let Err(err) = self.write_back(frame_id, victim) {
                // Victim stays resident and evictable.
                self.replacer.lock().set_evictable(frame_id, true);
                return Err(err);
            }
            self.page_table.write().remove(&victim);
            trace!(target: "pagedindex::buffer", page_id = victim.0, frame = frame_id.0, "evicted page");
        }
        frame.clear();

        Ok(frame_id)
    }

    fn write_back(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        if !frame.take_dirty() {
            return Ok(());
        }

        let written = self.disk_manager.lock().write_page(page_id, &frame.page());
        if written.is_err() {
            frame.mark_dirty();
        }
        written?;
        BufferPoolStats::bump(&self.stats.pages_written);
        Ok(())
    }
}

//! LRU (Least Recently Used) replacement policy.
//!
//! B+Tree traffic re-reads the root and upper internal levels on every
//! operation, so recency keeps them resident while cold leaves age out.

use std::collections::{HashMap, HashSet};

use crate::common::FrameId;

/// LRU eviction over evictable frames.
///
/// Every access stamps the frame with a logical clock value; eviction picks
/// the evictable frame with the oldest stamp. Pinned frames are never chosen.
///
/// # Complexity
/// - `record_access` / `set_evictable`: O(1)
/// - `evict`: O(evictable frames)
pub struct LruReplacer {
    clock: u64,
    last_access: HashMap<FrameId, u64>,
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            clock: 0,
            last_access: HashMap::new(),
            evictable: HashSet::new(),
        }
    }

    /// Record that a frame was accessed now.
    pub fn record_access(&mut self, frame_id: FrameId) {
        self.clock += 1;
        self.last_access.insert(frame_id, self.clock);
    }

    /// Mark a frame as evictable (pin_count dropped to 0) or not.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Select and forget the least recently used evictable frame.
    ///
    /// Returns `None` if every tracked frame is pinned.
    pub fn evict(&mut self) -> Option<FrameId> {
        let victim = self
            .evictable
            .iter()
            .min_by_key(|frame_id| self.last_access.get(frame_id).copied().unwrap_or(0))
            .copied()?;

        self.evictable.remove(&victim);
        self.last_access.remove(&victim);
        Some(victim)
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

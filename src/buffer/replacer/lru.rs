//! LRU (Least Recently Used) replacement policy.

use hashlink::LinkedHashMap;
use parking_lot::RwLock;

use crate::common::FrameId;

/// Tracks which unpinned frames are eligible for eviction, in
/// least-recently-unpinned order.
///
/// A frame enters the replacer when its pin count drops to zero and
/// leaves when it is pinned again (or evicted). [`LruReplacer::victim`]
/// hands out the frame that has been continuously unpinned the longest;
/// re-pinning and re-unpinning moves a frame to the tail.
///
/// Backed by a linked hash map, so victim selection, pin and unpin are
/// all O(1). Guarded by a readers-writer lock: `len` takes a read lock,
/// the mutators a write lock. The enclosing pool instance already
/// serializes its calls, so the lock is advisory.
pub struct LruReplacer {
    /// Insertion-ordered set of eligible frames; head = next victim.
    eligible: RwLock<LinkedHashMap<FrameId, ()>>,

    /// Capacity bound, equal to the pool size.
    max_frames: usize,
}

impl LruReplacer {
    /// Create a replacer for a pool of `max_frames` frames.
    pub fn new(max_frames: usize) -> Self {
        Self {
            eligible: RwLock::new(LinkedHashMap::new()),
            max_frames,
        }
    }

    /// Remove and return the least recently unpinned frame, or None if
    /// nothing is eligible.
    pub fn victim(&self) -> Option<FrameId> {
        self.eligible.write().pop_front().map(|(frame_id, ())| frame_id)
    }

    /// A user acquired the frame; it is no longer eligible for eviction.
    ///
    /// No-op if the frame is not in the replacer.
    pub fn pin(&self, frame_id: FrameId) {
        self.eligible.write().remove(&frame_id);
    }

    /// The frame's last user released it; append it to the eligible tail.
    ///
    /// Idempotent: a frame already in the replacer keeps its position.
    /// The capacity guard is defensive; under the pool invariants the
    /// replacer never holds more than `max_frames` entries.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut eligible = self.eligible.write();
        if eligible.contains_key(&frame_id) {
            return;
        }
        if eligible.len() < self.max_frames {
            eligible.insert(frame_id, ());
        }
    }

    /// Number of frames currently eligible for eviction.
    pub fn len(&self) -> usize {
        self.eligible.read().len()
    }

    /// Whether no frame is eligible for eviction.
    pub fn is_empty(&self) -> bool {
        self.eligible.read().is_empty()
    }
}

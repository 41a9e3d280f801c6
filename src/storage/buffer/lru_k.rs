//! LRU-K replacement policy.
//!
//! Among evictable frames, the victim is the one with the largest backward
//! K-distance: frames with fewer than K recorded accesses count as infinite
//! distance and are evicted first, ordered by oldest first access; frames
//! with K or more accesses are ordered by oldest K-th most recent access.

use super::replacer::{FrameId, Replacer};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Debug)]
pub struct LruKReplacer {
    inner: Mutex<LruKInner>,
}

#[derive(Debug)]
struct LruKInner {
    num_frames: usize,
    k: usize,
    current_ts: u64,
    evictable: usize,
    nodes: HashMap<FrameId, LruKNode>,
    /// Frames with fewer than K accesses, keyed by first access time.
    young: BTreeMap<u64, FrameId>,
    /// Frames with at least K accesses, keyed by K-th most recent access
    /// time. Timestamps come from one counter, so keys never collide.
    mature: BTreeMap<u64, FrameId>,
}

#[derive(Debug)]
struct LruKNode {
    /// The most recent accesses, oldest first, at most K of them.
    history: VecDeque<u64>,
    evictable: bool,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            inner: Mutex::new(LruKInner {
                num_frames,
                k,
                current_ts: 0,
                evictable: 0,
                nodes: HashMap::new(),
                young: BTreeMap::new(),
                mature: BTreeMap::new(),
            }),
        }
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        self.inner.lock().record_access(frame_id);
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.inner.lock().set_evictable(frame_id, evictable);
    }

    fn evict(&self) -> Option<FrameId> {
        self.inner.lock().evict()
    }

    fn remove(&self, frame_id: FrameId) {
        self.inner.lock().remove(frame_id);
    }

    fn size(&self) -> usize {
        self.inner.lock().evictable
    }
}

impl LruKInner {
    fn record_access(&mut self, frame_id: FrameId) {
        assert!(
            frame_id >= 0 && (frame_id as usize) < self.num_frames,
            "frame id {} out of range for pool of {}",
            frame_id,
            self.num_frames
        );

        let ts = self.current_ts;
        self.current_ts += 1;

        let node = self.nodes.entry(frame_id).or_insert_with(|| LruKNode {
            history: VecDeque::new(),
            evictable: false,
        });
        let prev_len = node.history.len();
        let prev_key = node.history.front().copied();
        node.history.push_back(ts);
        if node.history.len() > self.k {
            node.history.pop_front();
        }
        let new_key = *node.history.front().expect("history is non-empty");

        if !node.evictable {
            return;
        }
        // A linked node's ordering key is its history front; keep the lists
        // in step with the new access.
        if prev_len >= self.k {
            self.mature.remove(&prev_key.expect("mature node has history"));
            self.mature.insert(new_key, frame_id);
        } else if prev_len + 1 == self.k {
            // Graduated: the K-th access arrived.
            self.young.remove(&prev_key.expect("young node has history"));
            self.mature.insert(new_key, frame_id);
        }
        // Still young: the first access time is unchanged.
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let k = self.k;
        let node = self
            .nodes
            .get_mut(&frame_id)
            .expect("set_evictable on a frame with no recorded access");
        if node.evictable == evictable {
            return;
        }
        node.evictable = evictable;
        let key = *node.history.front().expect("accessed node has history");
        let is_mature = node.history.len() >= k;

        if evictable {
            if is_mature {
                self.mature.insert(key, frame_id);
            } else {
                self.young.insert(key, frame_id);
            }
            self.evictable += 1;
        } else {
            if is_mature {
                self.mature.remove(&key);
            } else {
                self.young.remove(&key);
            }
            self.evictable -= 1;
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        let (_, frame_id) = self.young.pop_first().or_else(|| self.mature.pop_first())?;
        self.nodes.remove(&frame_id);
        self.evictable -= 1;
        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        let Some(node) = self.nodes.get(&frame_id) else {
            return;
        };
        assert!(
            node.evictable,
            "remove on pinned frame {}",
            frame_id
        );
        let key = *node.history.front().expect("accessed node has history");
        if node.history.len() >= self.k {
            self.mature.remove(&key);
        } else {
            self.young.remove(&key);
        }
        self.nodes.remove(&frame_id);
        self.evictable -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_replacer() {
        let replacer = LruKReplacer::new(4, 2);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_fewer_than_k_evicted_first() {
        let replacer = LruKReplacer::new(4, 2);

        // Frame 1 reaches K accesses, frame 2 does not.
        replacer.record_access(1);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // Infinite K-distance loses to any finite one.
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_young_frames_ordered_by_first_access() {
        let replacer = LruKReplacer::new(4, 3);

        replacer.record_access(0);
        replacer.record_access(1);
        replacer.record_access(2);
        // A later re-access does not reorder a frame still below K.
        replacer.record_access(0);
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true);
        }

        assert_eq!(replacer.evict(), Some(0));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
    }

    #[test]
    fn test_mature_frames_ordered_by_kth_recent_access() {
        let replacer = LruKReplacer::new(4, 2);

        // Access order: 1, 2, 1, 2. Frame 1's second-most-recent access
        // (ts 0) is older than frame 2's (ts 1).
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
    }

    #[test]
    fn test_second_access_moves_frame_behind_single_access_frames() {
        // Six frames touched once each, then frame 1 again: every frame is
        // evictable, and the oldest single-access frame goes first.
        let replacer = LruKReplacer::new(7, 2);

        for frame_id in 1..=6 {
            replacer.record_access(frame_id);
        }
        replacer.record_access(1);
        for frame_id in 1..=6 {
            replacer.set_evictable(frame_id, true);
        }

        assert_eq!(replacer.size(), 6);
        assert_eq!(replacer.evict(), Some(2));
    }

    #[test]
    fn test_access_repositions_evictable_mature_frame() {
        let replacer = LruKReplacer::new(4, 2);

        replacer.record_access(1); // ts 0
        replacer.record_access(1); // ts 1
        replacer.record_access(2); // ts 2
        replacer.record_access(2); // ts 3
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // Frame 1 is the older candidate until it is touched twice more.
        replacer.record_access(1); // ts 4
        replacer.record_access(1); // ts 5

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_graduation_while_evictable() {
        let replacer = LruKReplacer::new(4, 2);

        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // Frame 1 reaches K accesses while already evictable and moves
        // behind the still-young frame 2.
        replacer.record_access(1);

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_set_evictable_toggling() {
        let replacer = LruKReplacer::new(4, 2);

        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);
        assert_eq!(replacer.size(), 2);

        replacer.set_evictable(1, false);
        assert_eq!(replacer.size(), 1);
        // Idempotent transitions are no-ops.
        replacer.set_evictable(1, false);
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(1, true);
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_remove() {
        let replacer = LruKReplacer::new(4, 2);

        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        replacer.remove(1);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(2));

        // Removing an untracked frame is a no-op.
        replacer.remove(3);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_eviction_discards_history() {
        let replacer = LruKReplacer::new(4, 2);

        replacer.record_access(1);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);
        assert_eq!(replacer.evict(), Some(2));

        // Frame 2 returns with a fresh single-access history and therefore
        // an infinite K-distance again.
        replacer.record_access(2);
        replacer.set_evictable(2, true);
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_record_access_out_of_range() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(4);
    }

    #[test]
    fn test_concurrent_record_and_toggle() {
        let replacer = Arc::new(LruKReplacer::new(64, 2));
        let mut handles = vec![];

        for t in 0..4 {
            let replacer = Arc::clone(&replacer);
            handles.push(thread::spawn(move || {
                for i in 0..16 {
                    let frame_id = t * 16 + i;
                    replacer.record_access(frame_id);
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(replacer.size(), 64);
        let mut victims = std::collections::HashSet::new();
        while let Some(frame_id) = replacer.evict() {
            victims.insert(frame_id);
        }
        assert_eq!(victims.len(), 64);
    }
}

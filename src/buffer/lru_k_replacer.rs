use std::collections::VecDeque;

use log::trace;
use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single frame
#[derive(Debug, Default)]
struct FrameAccessInfo {
    /// Last k access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance, or None (+inf) with fewer than k accesses.
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Timestamp {
        self.history.front().copied().unwrap_or(0)
    }
}

struct ReplacerState {
    current_timestamp: Timestamp,
    /// Indexed by frame id; None when the frame is not tracked
    frames: Vec<Option<FrameAccessInfo>>,
    num_evictable: usize,
}

/// LRU-K Replacement Policy
///
/// Evicts the evictable frame whose backward k-distance (time since its k-th
/// most recent access) is the largest. Frames with fewer than k recorded
/// accesses count as +inf and are evicted first, oldest first access winning
/// ties between them.
pub struct LruKReplacer {
    k: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer for `max_frames` frames.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "LRU-K needs k >= 1");
        let mut frames = Vec::with_capacity(max_frames);
        frames.resize_with(max_frames, || None);

        Self {
            k,
            state: Mutex::new(ReplacerState {
                current_timestamp: 0,
                frames,
                num_evictable: 0,
            }),
        }
    }

    /// Picks and forgets a victim. Returns None if no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let now = state.current_timestamp;
        // (k_distance, earliest) ordering: +inf beats finite, then larger
        // distance, then earlier first access.
        let mut victim: Option<(usize, Option<Timestamp>, Timestamp)> = None;

        for (idx, slot) in state.frames.iter().enumerate() {
            let Some(info) = slot else { continue };
            if !info.is_evictable {
                continue;
            }

            let dist = info.k_distance(now, self.k);
            let earliest = info.earliest_timestamp();

            let better = match victim {
                None => true,
                Some((_, v_dist, v_earliest)) => match (v_dist, dist) {
                    (None, Some(_)) => false,
                    (Some(_), None) => true,
                    (None, None) => earliest < v_earliest,
                    (Some(v), Some(c)) => c > v,
                },
            };

            if better {
                victim = Some((idx, dist, earliest));
            }
        }

        let (idx, _, _) = victim?;
        state.frames[idx] = None;
        state.num_evictable -= 1;

        trace!("lru-k evicts frame {}", idx);
        Some(FrameId::new(idx as u32))
    }

    /// Records an access to `frame_id` at the current logical time.
    pub fn record_access(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let idx = frame_id.as_usize();
        if idx >= state.frames.len() {
            return;
        }

        let timestamp = state.current_timestamp;
        state.current_timestamp += 1;
        state.frames[idx]
            .get_or_insert_with(FrameAccessInfo::default)
            .record_access(timestamp, self.k);
    }

    /// Marks a frame evictable (pin count dropped to zero) or not.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        let mut state = self.state.lock();
        let idx = frame_id.as_usize();
        if idx >= state.frames.len() {
            return;
        }

        let info = state.frames[idx].get_or_insert_with(FrameAccessInfo::default);
        if info.is_evictable == is_evictable {
            return;
        }
        info.is_evictable = is_evictable;

        if is_evictable {
            state.num_evictable += 1;
        } else {
            state.num_evictable -= 1;
        }
    }

    /// Forgets a frame entirely, e.g. when its page is deleted.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let idx = frame_id.as_usize();
        if idx >= state.frames.len() {
            return;
        }

        if let Some(info) = state.frames[idx].take() {
            if info.is_evictable {
                state.num_evictable -= 1;
            }
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

//! 👀 The seen-set: event ids we already shipped, remembered for a while.
//!
//! Consecutive trailing windows overlap when cycles run late (or the window is wider
//! than the poll interval), so the same event can come back. This remembers ids long
//! enough to skip those repeats, then forgets them so memory doesn't grow forever.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};

/// 👀 Insertion-ordered ids with a time-to-live.
#[derive(Debug)]
pub struct SeenSet {
    ttl: TimeDelta,
    ids: HashSet<String>,
    order: VecDeque<(DateTime<Utc>, String)>,
}

impl SeenSet {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// ➕ Remember `id` as of `now`. Already-known ids keep their original stamp.
    pub fn insert(&mut self, id: &str, now: DateTime<Utc>) {
        if self.ids.insert(id.to_string()) {
            self.order.push_back((now, id.to_string()));
        }
    }

    /// 🧹 Forget everything stamped more than `ttl` before `now`.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let mut evicted = 0;
        while let Some((stamped, _)) = self.order.front() {
            if *stamped >= cutoff {
                break;
            }
            if let Some((_, id)) = self.order.pop_front() {
                self.ids.remove(&id);
                evicted += 1;
            }
        }
        evicted
    }
}

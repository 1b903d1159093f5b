//! Bounded, time-expiring set of recently seen message digests
//!
//! Entries leave the window when they are older than the TTL or when the
//! window is full and they are the oldest. The clock is supplied by the
//! caller so the window is deterministic under test.

use crate::digest::Digest;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<Digest, Instant>,
    /// Insertion order, oldest first
    order: VecDeque<(Digest, Instant)>,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_TTL)
    }
}

impl DedupWindow {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Whether the digest was marked within the TTL
    pub fn seen(&self, digest: &Digest, now: Instant) -> bool {
        self.entries
            .get(digest)
            .is_some_and(|marked| now.saturating_duration_since(*marked) < self.ttl)
    }

    pub fn mark(&mut self, digest: Digest, now: Instant) {
        self.expire(now);
        if self.entries.contains_key(&digest) {
            return;
        }
        while self.entries.len() >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }
        self.entries.insert(digest, now);
        self.order.push_back((digest, now));
    }

    /// Returns true when the digest is new, marking it in the same step
    pub fn check_and_mark(&mut self, digest: Digest, now: Instant) -> bool {
        if self.seen(&digest, now) {
            return false;
        }
        self.mark(digest, now);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        while let Some((_, marked)) = self.order.front() {
            if now.saturating_duration_since(*marked) < self.ttl {
                break;
            }
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_front() {
            Some((digest, marked)) => {
                if self.entries.get(&digest) == Some(&marked) {
                    self.entries.remove(&digest);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::message_digest;

    #[test]
    fn test_second_delivery_is_seen() {
        let mut window = DedupWindow::default();
        let now = Instant::now();
        let digest = message_digest(b"msg");

        assert!(window.check_and_mark(digest, now));
        assert!(!window.check_and_mark(digest, now + Duration::from_secs(1)));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let mut window = DedupWindow::new(10, Duration::from_secs(60));
        let start = Instant::now();
        let digest = message_digest(b"msg");

        window.mark(digest, start);
        assert!(window.seen(&digest, start + Duration::from_secs(59)));
        assert!(!window.seen(&digest, start + Duration::from_secs(60)));
        assert!(window.check_and_mark(digest, start + Duration::from_secs(61)));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut window = DedupWindow::new(2, Duration::from_secs(60));
        let now = Instant::now();
        let (a, b, c) = (
            message_digest(b"a"),
            message_digest(b"b"),
            message_digest(b"c"),
        );

        window.mark(a, now);
        window.mark(b, now);
        window.mark(c, now);

        assert_eq!(window.len(), 2);
        assert!(!window.seen(&a, now));
        assert!(window.seen(&b, now));
        assert!(window.seen(&c, now));
    }
}

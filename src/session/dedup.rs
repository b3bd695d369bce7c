//! Duplicate suppression for inbound messages
//!
//! Brokers redeliver under at-least-once QoS, most visibly after a persistent session
//! reconnects. [`DedupCache`] remembers recently delivered fingerprints for a bounded
//! time and a bounded count.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// Identifier of one message instance: topic plus the full raw payload
///
/// The payload carries sender and timestamp, so equal text from different senders
/// or at different times yields different fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn of(topic: &str, payload: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        topic.hash(&mut hasher);
        payload.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Size- and time-bounded set of recently seen fingerprints
///
/// `last_seen` holds the authoritative timestamp per fingerprint. `order` is an
/// append-only recency log; records whose timestamp no longer matches `last_seen`
/// are stale and skipped when popped.
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    window: Duration,
    last_seen: HashMap<Fingerprint, Instant>,
    order: VecDeque<(Fingerprint, Instant)>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_WINDOW)
    }
}

impl DedupCache {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            last_seen: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Record `fingerprint` as seen at `now`
    ///
    /// Returns true if it was not already present, meaning the message should be
    /// delivered. A repeat refreshes the entry's recency and returns false.
    pub fn check_and_insert(&mut self, fingerprint: Fingerprint, now: Instant) -> bool {
        self.purge_expired(now);

        let is_new = match self.last_seen.get(&fingerprint) {
            Some(seen) => now.saturating_duration_since(*seen) >= self.window,
            None => true,
        };

        self.last_seen.insert(fingerprint, now);
        self.order.push_back((fingerprint, now));

        while self.last_seen.len() > self.capacity {
            self.evict_oldest();
        }
        if self.order.len() > self.capacity * 2 + 16 {
            self.compact();
        }

        is_new
    }

    /// Whether `fingerprint` is currently remembered (ignores expiry)
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.last_seen.contains_key(fingerprint)
    }

    /// Drop `fingerprint` so its next sighting counts as new again
    ///
    /// Its recency record is left behind and skipped once it reaches the front.
    pub fn forget(&mut self, fingerprint: &Fingerprint) -> bool {
        self.last_seen.remove(fingerprint).is_some()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn purge_expired(&mut self, now: Instant) {
        while let Some(&(fingerprint, seen)) = self.order.front() {
            if now.saturating_duration_since(seen) < self.window {
                break;
            }
            self.order.pop_front();
            self.remove_if_current(fingerprint, seen);
        }
    }

    fn evict_oldest(&mut self) {
        while let Some((fingerprint, seen)) = self.order.pop_front() {
            if self.remove_if_current(fingerprint, seen) {
                return;
            }
        }
    }

    fn remove_if_current(&mut self, fingerprint: Fingerprint, seen: Instant) -> bool {
        if self.last_seen.get(&fingerprint) == Some(&seen) {
            self.last_seen.remove(&fingerprint);
            true
        } else {
            false
        }
    }

    fn compact(&mut self) {
        let last_seen = &self.last_seen;
        self.order
            .retain(|(fingerprint, seen)| last_seen.get(fingerprint) == Some(seen));
    }
}

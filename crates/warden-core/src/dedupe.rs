//! A generic atomic check-and-mark dedupe cache with a fixed window, shared
//! by the correlator (§4.E) and dispatcher (§4.G) so that two notifications
//! for the same key within the window can never both pass (no TOCTOU gap).

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub struct DedupeCache<K: Eq + Hash + Clone> {
    window: Duration,
    seen: DashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> DedupeCache<K> {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, seen: DashMap::new() }
    }

    /// Atomically checks whether `key` was marked within the window and, if
    /// not, marks it now. Returns `true` when this call is the one that
    /// passes (first-seen or the previous mark has expired).
    pub fn check_and_mark(&self, key: K) -> bool {
        match self.seen.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().elapsed() >= self.window {
                    entry.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }

    /// Removes entries older than the window. Intended to run on a periodic
    /// sweep so the cache does not grow unbounded.
    pub fn sweep(&self) {
        self.seen.retain(|_, marked_at| marked_at.elapsed() < self.window);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_mark_within_window_is_suppressed() {
        let cache = DedupeCache::new(Duration::from_secs(300));
        assert!(cache.check_and_mark(("event-1", "constraint-1")));
        assert!(!cache.check_and_mark(("event-1", "constraint-1")));
    }

    #[test]
    fn distinct_keys_both_pass() {
        let cache = DedupeCache::new(Duration::from_secs(300));
        assert!(cache.check_and_mark(("event-1", "constraint-1")));
        assert!(cache.check_and_mark(("event-2", "constraint-1")));
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = DedupeCache::new(Duration::from_millis(10));
        cache.check_and_mark("key");
        std::thread::sleep(Duration::from_millis(20));
        cache.sweep();
        assert!(cache.is_empty());
    }

    #[test]
    fn mark_after_window_elapses_passes_again() {
        let cache = DedupeCache::new(Duration::from_millis(10));
        assert!(cache.check_and_mark("key"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.check_and_mark("key"));
    }
}

//! A token-bucket rate limiter shared by the correlator (one global bucket)
//! and the dispatcher (one bucket per namespace).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Refills at a fixed rate up to `capacity`; `try_consume` takes one token
/// without blocking, returning whether a token was available.
pub struct TokenBucket {
    capacity: u64,
    refill_per_sec: u64,
    tokens: AtomicU64,
    last_refill_millis: AtomicU64,
    epoch: Instant,
}

impl TokenBucket {
    #[must_use]
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            tokens: AtomicU64::new(capacity),
            last_refill_millis: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn refill(&self) {
        let now_millis = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        let last = self.last_refill_millis.load(Ordering::Relaxed);
        let elapsed = now_millis.saturating_sub(last);
        if elapsed == 0 {
            return;
        }
        let new_tokens = (elapsed * self.refill_per_sec) / 1000;
        if new_tokens == 0 {
            return;
        }
        if self.last_refill_millis.compare_exchange(last, now_millis, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
            loop {
                let current = self.tokens.load(Ordering::Relaxed);
                let updated = current.saturating_add(new_tokens).min(self.capacity);
                if self.tokens.compare_exchange(current, updated, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                    break;
                }
            }
        }
    }

    /// Attempts to take one token. Returns `true` if one was available.
    pub fn try_consume(&self) -> bool {
        self.refill();
        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current == 0 {
                return false;
            }
            if self.tokens.compare_exchange(current, current - 1, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_up_to_capacity_then_blocks() {
        let bucket = TokenBucket::new(2, 1);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(1, 1000);
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(bucket.try_consume());
    }
}

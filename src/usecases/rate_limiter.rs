//! Token-bucket rate limiter keyed by principal identifier.
//!
//! Each identifier (`user:<id>` or `ip:<addr>`) owns a bucket holding up to
//! `capacity` tokens, refilled at `refill_rate` tokens per second. Refill
//! granularity is whole seconds: requests within the same second see the
//! same token pool until the next second boundary — an intentional
//! simplification.
//!
//! Buckets share one map guarded by a mutex; refill+consume happens under
//! it, so admission is atomic per identifier.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

/// Per-identifier bucket state.
#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    /// Epoch seconds of the last refill.
    last_refill_time: i64,
}

impl Bucket {
    fn new(capacity: u32, now_secs: i64) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill_time: now_secs,
        }
    }

    fn refill(&mut self, now_secs: i64, capacity: u32, refill_rate: f64) {
        let elapsed = now_secs - self.last_refill_time;
        if elapsed > 0 {
            self.tokens =
                (self.tokens + elapsed as f64 * refill_rate).min(f64::from(capacity));
            self.last_refill_time = now_secs;
        }
    }

    /// Would this bucket be full if refilled now? Does not mutate, so
    /// cleanup can test staleness without resetting the refill clock.
    fn would_be_full(&self, now_secs: i64, capacity: u32, refill_rate: f64) -> bool {
        let elapsed = (now_secs - self.last_refill_time).max(0);
        self.tokens + elapsed as f64 * refill_rate >= f64::from(capacity)
    }
}

pub struct TokenBucketRateLimiter {
    capacity: u32,
    /// Tokens added per second.
    refill_rate: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketRateLimiter {
    /// Buckets idle longer than this and already full are dropped by
    /// `cleanup`.
    const IDLE_EVICTION_SECS: i64 = 300;

    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Refill the identifier's bucket, then consume one token if available.
    pub fn try_acquire(&self, identifier: &str) -> bool {
        let now = Utc::now().timestamp();
        let mut buckets = self.lock_buckets();
        let bucket = buckets
            .entry(identifier.to_string())
            .or_insert_with(|| Bucket::new(self.capacity, now));
        bucket.refill(now, self.capacity, self.refill_rate);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until at least one token is available:
    /// `ceil((1 - tokens) / refill_rate)`, or 0 when a token is ready.
    pub fn retry_after_seconds(&self, identifier: &str) -> u64 {
        let now = Utc::now().timestamp();
        let mut buckets = self.lock_buckets();
        let Some(bucket) = buckets.get_mut(identifier) else {
            return 0;
        };
        bucket.refill(now, self.capacity, self.refill_rate);
        if bucket.tokens >= 1.0 {
            return 0;
        }
        ((1.0 - bucket.tokens) / self.refill_rate).ceil() as u64
    }

    /// Forget the identifier's bucket entirely.
    pub fn reset(&self, identifier: &str) {
        self.lock_buckets().remove(identifier);
    }

    /// Drop buckets that are full and have been idle for over five minutes.
    /// Keeps the map bounded for long-running processes.
    pub fn cleanup(&self) {
        let now = Utc::now().timestamp();
        self.lock_buckets().retain(|_, bucket| {
            let idle = now - bucket.last_refill_time > Self::IDLE_EVICTION_SECS;
            !(idle && bucket.would_be_full(now, self.capacity, self.refill_rate))
        });
    }

    /// Buckets currently tracked.
    pub fn bucket_count(&self) -> usize {
        self.lock_buckets().len()
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bucket>> {
        // A poisoned lock only means another thread panicked mid-update;
        // bucket state is still usable.
        match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bucket_allows_burst_up_to_capacity() {
        let limiter = TokenBucketRateLimiter::new(3, 1.0);
        assert!(limiter.try_acquire("user:bob"));
        assert!(limiter.try_acquire("user:bob"));
        assert!(limiter.try_acquire("user:bob"));
        assert!(!limiter.try_acquire("user:bob"));
    }

    #[test]
    fn identifiers_have_independent_buckets() {
        let limiter = TokenBucketRateLimiter::new(1, 1.0);
        assert!(limiter.try_acquire("user:bob"));
        assert!(!limiter.try_acquire("user:bob"));
        assert!(limiter.try_acquire("ip:10.0.0.1"));
    }

    #[test]
    fn retry_after_matches_refill_rate() {
        // capacity=1, refill=0.1/s: after draining the single token, a full
        // token is 10 seconds away.
        let limiter = TokenBucketRateLimiter::new(1, 0.1);
        assert!(limiter.try_acquire("user:bob"));
        assert!(!limiter.try_acquire("user:bob"));
        assert_eq!(limiter.retry_after_seconds("user:bob"), 10);
    }

    #[test]
    fn retry_after_is_zero_for_unknown_or_full() {
        let limiter = TokenBucketRateLimiter::new(5, 1.0);
        assert_eq!(limiter.retry_after_seconds("unknown"), 0);
        limiter.try_acquire("user:bob");
        assert_eq!(limiter.retry_after_seconds("user:bob"), 0);
    }

    #[test]
    fn reset_restores_full_capacity() {
        let limiter = TokenBucketRateLimiter::new(1, 0.1);
        assert!(limiter.try_acquire("user:bob"));
        assert!(!limiter.try_acquire("user:bob"));
        limiter.reset("user:bob");
        assert!(limiter.try_acquire("user:bob"));
    }

    #[test]
    fn cleanup_keeps_recent_and_depleted_buckets() {
        let limiter = TokenBucketRateLimiter::new(100, 0.001);
        limiter.try_acquire("user:bob");
        limiter.cleanup();
        // Recently used: kept even though nearly full.
        assert_eq!(limiter.bucket_count(), 1);
    }
}

//! Token-bucket admission control.

use parking_lot::Mutex;
use std::time::Instant;

/// A token-bucket rate limiter shared across all inbound requests.
///
/// Constructed once at startup and handed into the request chain by
/// reference, so tests can instantiate independent limiters. The bucket
/// starts full (`burst` tokens) and refills continuously at
/// `rate_per_sec` tokens per second.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let capacity = f64::from(burst).max(1.0);
        Self {
            capacity,
            refill_per_sec: rate_per_sec.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token. Returns `false` when the bucket is exhausted, in
    /// which case the request must be rejected with 429.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

//! Token-bucket admission control for the webhook path.
//!
//! Bounds the accepted request rate independently of downstream failure
//! state: admission is consulted before the circuit breaker, so shed load
//! never pollutes the breaker's failure counts.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// A token bucket refilled continuously at a fixed rate.
///
/// Internally synchronized; safe to share across concurrent requests.
/// The bucket starts full, so a burst of up to `burst` requests is admitted
/// immediately from a cold start.
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter admitting `rate_per_sec` sustained requests with the
    /// given burst capacity.
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate_per_sec: rate_per_sec.max(0.0),
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_admitted_then_excess_rejected() {
        // Near-zero refill rate so the test only observes the burst.
        let limiter = RateLimiter::new(0.000_001, 5);
        for i in 0..5 {
            assert!(limiter.try_acquire(), "request {i} within burst must pass");
        }
        assert!(!limiter.try_acquire(), "request past burst must be shed");
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = RateLimiter::new(1_000.0, 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(limiter.try_acquire(), "bucket must refill at the given rate");
    }

    #[test]
    fn zero_burst_is_clamped_to_one() {
        let limiter = RateLimiter::new(0.000_001, 0);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn concurrent_acquires_never_exceed_burst() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(0.000_001, 8));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                (0..8).filter(|_| limiter.try_acquire()).count()
            }));
        }
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
        assert_eq!(admitted, 8, "exactly the burst capacity must be admitted");
    }
}

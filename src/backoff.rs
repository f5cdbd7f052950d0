//! Exponential backoff with jitter for poll retries.
//!
//! Delay for the n-th consecutive error is
//! `min(max, initial * factor^(n-1))` plus 0–25% additive jitter drawn from
//! the operating system's CSPRNG, so many client instances retrying at once
//! do not synchronize into a retry storm.

use std::time::Duration;

use rand::rngs::OsRng;
use rand::Rng;

/// Fraction of the base delay added as random jitter, at most.
const JITTER_FRACTION: f64 = 0.25;

/// Exponential backoff policy.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl BackoffPolicy {
    /// Create a policy. A factor below 1.0 is clamped to 1.0 so delays never
    /// shrink with the error count.
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor: factor.max(1.0),
        }
    }

    /// Deterministic base delay for the given consecutive-error count
    /// (1-based), capped at the configured maximum.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = f64::from(attempt.saturating_sub(1));
        let secs = self.initial.as_secs_f64() * self.factor.powf(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }

    /// Base delay plus up to 25% additive jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_range = base.as_secs_f64() * JITTER_FRACTION;
        if jitter_range <= 0.0 {
            return base;
        }
        let jitter = OsRng.gen_range(0.0..jitter_range);
        base + Duration::from_secs_f64(jitter)
    }
}

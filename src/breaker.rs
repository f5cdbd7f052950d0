//! Circuit breaker isolating the risky unit of work on both ingress paths.
//!
//! State machine: Closed → Open when the rolling interval has seen at least
//! [`TRIP_MIN_REQUESTS`] requests with a failure ratio of
//! [`TRIP_FAILURE_RATIO`] or more; Open → HalfOpen after the cool-down;
//! HalfOpen → Closed once the trial quota completes without failure, or back
//! to Open on the first trial failure.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

/// Minimum requests the rolling interval must have seen before tripping.
const TRIP_MIN_REQUESTS: u32 = 3;

/// Failure ratio at or above which the breaker trips.
const TRIP_FAILURE_RATIO: f64 = 0.6;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow through; failures are counted over a rolling interval.
    Closed,
    /// Calls fast-fail without I/O until the cool-down elapses.
    Open,
    /// A bounded number of trial calls probe the dependency.
    HalfOpen,
}

impl BreakerState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    requests: u32,
    failures: u32,
    successes: u32,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    counts: Counts,
    interval_start: Instant,
    opened_at: Instant,
}

/// A circuit breaker safe for concurrent use.
///
/// Callers ask for admission with [`try_call`](Self::try_call) and report the
/// outcome with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure).
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    half_open_max_requests: u32,
    interval: Duration,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker.
    ///
    /// `half_open_max_requests` bounds trial calls while half-open,
    /// `interval` is the rolling window for closed-state counts, and
    /// `cooldown` is how long the breaker stays open before probing.
    pub fn new(
        name: &'static str,
        half_open_max_requests: u32,
        interval: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            name,
            half_open_max_requests: half_open_max_requests.max(1),
            interval,
            cooldown,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                counts: Counts::default(),
                interval_start: Instant::now(),
                opened_at: Instant::now(),
            }),
        }
    }

    /// Ask for admission. Returns false while open (or while the half-open
    /// trial quota is exhausted); the caller must not perform the call then.
    pub fn try_call(&self) -> bool {
        let mut inner = self.lock();
        let now = Instant::now();

        if inner.state == BreakerState::Open && now.duration_since(inner.opened_at) >= self.cooldown
        {
            self.transition(&mut inner, BreakerState::HalfOpen);
        }

        match inner.state {
            BreakerState::Closed => {
                if !self.interval.is_zero()
                    && now.duration_since(inner.interval_start) >= self.interval
                {
                    inner.counts = Counts::default();
                    inner.interval_start = now;
                }
                inner.counts.requests = inner.counts.requests.saturating_add(1);
                true
            }
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.counts.requests >= self.half_open_max_requests {
                    return false;
                }
                inner.counts.requests = inner.counts.requests.saturating_add(1);
                true
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.counts.successes = inner.counts.successes.saturating_add(1);
        if inner.state == BreakerState::HalfOpen
            && inner.counts.successes >= self.half_open_max_requests
        {
            self.transition(&mut inner, BreakerState::Closed);
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.counts.failures = inner.counts.failures.saturating_add(1);
                if ready_to_trip(inner.counts) {
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            // Any trial failure reopens immediately.
            BreakerState::HalfOpen => self.transition(&mut inner, BreakerState::Open),
            BreakerState::Open => {}
        }
    }

    /// Current state, for observability.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        // Reflect cool-down expiry so probes see half-open, not stale open.
        if inner.state == BreakerState::Open
            && Instant::now().duration_since(inner.opened_at) >= self.cooldown
        {
            self.transition(&mut inner, BreakerState::HalfOpen);
        }
        inner.state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        inner.counts = Counts::default();
        let now = Instant::now();
        inner.interval_start = now;
        if to == BreakerState::Open {
            inner.opened_at = now;
        }
        info!(
            name = self.name,
            from = from.as_str(),
            to = to.as_str(),
            "circuit breaker state changed"
        );
    }
}

fn ready_to_trip(counts: Counts) -> bool {
    if counts.requests < TRIP_MIN_REQUESTS {
        return false;
    }
    f64::from(counts.failures) / f64::from(counts.requests) >= TRIP_FAILURE_RATIO
}

//! Circuit breaker guarding outbound engine calls.
//!
//! `closed -> open -> half_open -> closed`. The breaker opens after
//! `failure_threshold` failures inside `monitoring_window`, fails fast
//! while open, and after `reset_timeout` admits a bounded number of
//! half-open probes; one success closes it again.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within the window that open the breaker.
    pub failure_threshold: u32,
    /// Sliding window over which failures are counted.
    pub monitoring_window: Duration,
    /// How long the breaker stays open before probing.
    pub reset_timeout: Duration,
    /// Probes admitted per half-open cycle.
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            monitoring_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            half_open_max_attempts: 1,
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast.
    Open,
    /// A bounded number of probes may pass.
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open_probes: u32,
}

/// The breaker itself. Cheap to share behind the pool.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                half_open_probes: 0,
            }),
        }
    }

    /// Current state (transitions open->half-open lazily on observation).
    pub fn state(&self) -> BreakerState {
        self.state_at(Instant::now())
    }

    /// State with an explicit clock.
    pub fn state_at(&self, now: Instant) -> BreakerState {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner, now);
        inner.state
    }

    /// Ask permission for one call. Fails fast while open.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Permission check with an explicit clock.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner, now);
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.half_open_probes < self.config.half_open_max_attempts {
                    inner.half_open_probes += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!("circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.half_open_probes = 0;
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// Failure report with an explicit clock.
    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                // A failed probe re-opens immediately.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.half_open_probes = 0;
                warn!("circuit breaker re-opened after failed probe");
            }
            BreakerState::Open => {}
            BreakerState::Closed => {
                inner.failures.push_back(now);
                let window_start = now - self.config.monitoring_window;
                while inner
                    .failures
                    .front()
                    .is_some_and(|&at| at < window_start)
                {
                    inner.failures.pop_front();
                }
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    warn!(
                        failures = inner.failures.len(),
                        "circuit breaker opened"
                    );
                }
            }
        }
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if now.duration_since(opened_at) >= self.config.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_probes = 0;
                    info!("circuit breaker half-open");
                }
            }
        }
    }
}

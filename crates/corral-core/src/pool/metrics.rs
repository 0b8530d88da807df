//! Pool metrics.
//!
//! Counters are monotonic atomics; latency and error observations feed
//! bounded rings used by the scaling loop for p95 and error-rate signals.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Observations retained for percentile math.
const LATENCY_SAMPLE_CAP: usize = 256;

/// Outcome observations retained for error-rate math.
const OUTCOME_SAMPLE_CAP: usize = 512;

#[derive(Debug, Default)]
pub(crate) struct MetricsInner {
    latencies: VecDeque<Duration>,
    outcomes: VecDeque<(Instant, bool)>,
}

/// Live metric collection for the pool.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    launches: AtomicU64,
    launch_failures: AtomicU64,
    acquisitions: AtomicU64,
    acquisition_timeouts: AtomicU64,
    releases: AtomicU64,
    recycled: AtomicU64,
    engine_errors: AtomicU64,
    inner: Mutex<MetricsInner>,
}

impl PoolMetrics {
    /// Record a successful launch.
    pub fn record_launch(&self) {
        self.launches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed launch.
    pub fn record_launch_failure(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
        self.record_outcome(false);
    }

    /// Record a completed acquisition and its wait latency.
    pub fn record_acquisition(&self, waited: Duration) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        if inner.latencies.len() == LATENCY_SAMPLE_CAP {
            inner.latencies.pop_front();
        }
        inner.latencies.push_back(waited);
        drop(inner);
        self.record_outcome(true);
    }

    /// Record an acquisition that expired in the queue.
    pub fn record_acquisition_timeout(&self) {
        self.acquisition_timeouts.fetch_add(1, Ordering::Relaxed);
        self.record_outcome(false);
    }

    /// Record a lease release.
    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a recycled instance.
    pub fn record_recycled(&self) {
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an engine-level error.
    pub fn record_engine_error(&self) {
        self.engine_errors.fetch_add(1, Ordering::Relaxed);
        self.record_outcome(false);
    }

    fn record_outcome(&self, ok: bool) {
        let mut inner = self.inner.lock();
        if inner.outcomes.len() == OUTCOME_SAMPLE_CAP {
            inner.outcomes.pop_front();
        }
        inner.outcomes.push_back((Instant::now(), ok));
    }

    /// p95 of recent acquisition latencies.
    pub fn p95_latency(&self) -> Duration {
        let inner = self.inner.lock();
        if inner.latencies.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<Duration> = inner.latencies.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * 95).div_ceil(100).saturating_sub(1);
        sorted[index.min(sorted.len() - 1)]
    }

    /// Fraction of failed outcomes within the window.
    pub fn error_rate(&self, window: Duration) -> f64 {
        let inner = self.inner.lock();
        let cutoff = Instant::now() - window;
        let recent: Vec<bool> = inner
            .outcomes
            .iter()
            .filter(|(at, _)| *at >= cutoff)
            .map(|(_, ok)| *ok)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        let failures = recent.iter().filter(|ok| !**ok).count();
        failures as f64 / recent.len() as f64
    }

    /// Point-in-time snapshot for the metrics surface.
    pub fn snapshot(&self, gauges: PoolGauges) -> MetricsSnapshot {
        MetricsSnapshot {
            total: gauges.total,
            idle: gauges.idle,
            active: gauges.active,
            launching: gauges.launching,
            unhealthy: gauges.unhealthy,
            queue_length: gauges.queue_length,
            utilization: gauges.utilization(),
            launches: self.launches.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            acquisition_timeouts: self.acquisition_timeouts.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            p95_latency_ms: self.p95_latency().as_millis() as u64,
            error_rate: self.error_rate(Duration::from_secs(60)),
        }
    }
}

/// Instantaneous pool occupancy, supplied by the pool under its lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolGauges {
    /// All instances.
    pub total: usize,
    /// Idle instances.
    pub idle: usize,
    /// Leased instances.
    pub active: usize,
    /// Launch slots reserved.
    pub launching: usize,
    /// Instances marked unhealthy.
    pub unhealthy: usize,
    /// Queued acquisitions.
    pub queue_length: usize,
}

impl PoolGauges {
    /// Active share of the current pool size.
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.active as f64 / self.total as f64
    }
}

/// Exported metrics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Instances in the pool.
    pub total: usize,
    /// Idle instances.
    pub idle: usize,
    /// Leased instances.
    pub active: usize,
    /// Launch slots in flight.
    pub launching: usize,
    /// Unhealthy instances.
    pub unhealthy: usize,
    /// Queued acquisitions.
    pub queue_length: usize,
    /// active / total.
    pub utilization: f64,
    /// Successful launches.
    pub launches: u64,
    /// Failed launches.
    pub launch_failures: u64,
    /// Completed acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that timed out in the queue.
    pub acquisition_timeouts: u64,
    /// Lease releases.
    pub releases: u64,
    /// Instances recycled.
    pub recycled: u64,
    /// Engine errors.
    pub engine_errors: u64,
    /// p95 acquisition latency.
    pub p95_latency_ms: u64,
    /// Failure share over the last minute.
    pub error_rate: f64,
}

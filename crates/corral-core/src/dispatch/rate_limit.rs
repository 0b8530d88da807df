//! Admission rate limiting.
//!
//! A token bucket per key (`principal.userId` or the remote IP). Buckets
//! refill lazily on check; a background sweep drops idle buckets so the
//! map stays bounded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::shutdown::ShutdownSignal;

/// Buckets idle longer than this are dropped by the sweep.
const BUCKET_IDLE_TTL: Duration = Duration::from_secs(10 * 60);

/// Sweep interval.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A rejected admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// When the caller's budget resets.
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// The limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn capacity(&self) -> f64 {
        f64::from(self.config.per_minute + self.config.burst)
    }

    fn rate_per_second(&self) -> f64 {
        f64::from(self.config.per_minute) / 60.0
    }

    /// Take one token for the key.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] with the reset time when the bucket is
    /// empty.
    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity(),
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second()).min(self.capacity());
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait = deficit / self.rate_per_second();
            Err(RateLimited {
                reset_at: Utc::now()
                    + chrono::Duration::milliseconds((wait * 1000.0).ceil() as i64),
            })
        }
    }

    /// Charge extra tokens against a key (security penalty).
    pub fn penalize(&self, key: &str, tokens: u32) {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get_mut(key) {
            bucket.tokens = (bucket.tokens - f64::from(tokens)).max(0.0);
        }
    }

    /// Drop buckets idle beyond the TTL; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, b| b.last_seen.elapsed() < BUCKET_IDLE_TTL);
        before - buckets.len()
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Spawn the idle-bucket sweep loop.
    pub fn start_sweep(
        self: &std::sync::Arc<Self>,
        signal: &ShutdownSignal,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        let mut signal = signal.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = signal.wait() => break,
                    () = tokio::time::sleep(SWEEP_INTERVAL) => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(removed, "rate-limit buckets swept");
                        }
                    }
                }
            }
        })
    }
}

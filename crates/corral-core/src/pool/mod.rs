//! # Browser Pool
//!
//! A shared, finite pool of headless browser engines. The pool leases one
//! engine to at most one session at a time, queues acquisitions FIFO when
//! saturated, and runs three cooperative loops: scaling (grow/shrink on a
//! signal vector), recycling (composite-score driven graceful
//! replacement) and health checking (probe, three strikes, recycle).
//! Outbound engine calls are guarded by a circuit breaker.

pub mod breaker;
pub mod instance;
pub mod metrics;
pub mod queue;
pub mod recycling;
pub mod scaling;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Timelike;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::{Mutex, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::engine::{
    EngineBackend, EngineError, EngineHandle, EnginePage, LaunchOptions, PageOptions,
};
use crate::envelope::{
    ErrorCategory, ErrorEnvelope, ErrorSeverity, RecoverySuggestion, RetryAdvice, codes,
};
use crate::shutdown::ShutdownSignal;

use breaker::CircuitBreaker;
use instance::{BrowserInstance, BrowserState};
use metrics::{MetricsSnapshot, PoolGauges, PoolMetrics};
use queue::{AcquireQueue, GrantedLease};
use recycling::InstanceSnapshot;
use scaling::{ScalingDecision, ScalingLoopState, ScalingSignals};

/// Pool-level failures.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The acquisition deadline elapsed while queued.
    #[error("browser pool exhausted after waiting {waited:?}")]
    Exhausted {
        /// How long the caller waited.
        waited: Duration,
    },
    /// The pool cannot serve requests (shutdown or launch failure).
    #[error("browser pool unavailable: {0}")]
    Unavailable(String),
    /// The circuit breaker is open.
    #[error("engine calls are failing; circuit breaker open")]
    CircuitOpen,
    /// The browser is not leased by the calling session.
    #[error("browser {browser_id} is not leased by this session")]
    NotLeased {
        /// The browser in question.
        browser_id: String,
    },
    /// The per-browser page limit was reached.
    #[error("page limit of {max} reached for this browser")]
    PageLimit {
        /// The configured limit.
        max: usize,
    },
    /// No such browser.
    #[error("browser {0} not found")]
    NotFound(String),
    /// The engine failed the operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl PoolError {
    /// Project onto the canonical envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::Exhausted { .. } => ErrorEnvelope::new(
                codes::RESOURCE_EXHAUSTED,
                ErrorCategory::Resource,
                "All browsers are busy; please retry shortly",
            )
            .severity(ErrorSeverity::Medium)
            .retry(RetryAdvice::transient())
            .suggest(RecoverySuggestion::WaitAndRetry)
            .suggest(RecoverySuggestion::ReduceRequestRate),
            Self::CircuitOpen => ErrorEnvelope::new(
                codes::BROWSER_UNAVAILABLE,
                ErrorCategory::Browser,
                "The browser engine is temporarily unavailable",
            )
            .severity(ErrorSeverity::High)
            .retry(RetryAdvice::transient())
            .suggest(RecoverySuggestion::WaitAndRetry),
            Self::Unavailable(reason) => ErrorEnvelope::new(
                codes::BROWSER_UNAVAILABLE,
                ErrorCategory::Browser,
                "The browser pool is unavailable",
            )
            .severity(ErrorSeverity::High)
            .details(serde_json::json!({ "reason": reason }))
            .suggest(RecoverySuggestion::WaitAndRetry),
            Self::NotLeased { browser_id } => ErrorEnvelope::new(
                codes::AUTH_RESOURCE_ACCESS_DENIED,
                ErrorCategory::Authorization,
                "This browser is not leased by your session",
            )
            .severity(ErrorSeverity::Medium)
            .tag("resource", browser_id.clone()),
            Self::PageLimit { max } => ErrorEnvelope::new(
                codes::RESOURCE_EXHAUSTED,
                ErrorCategory::Resource,
                format!("At most {max} pages are allowed per browser"),
            )
            .suggest(RecoverySuggestion::ReduceRequestRate),
            Self::NotFound(id) => ErrorEnvelope::new(
                codes::RESOURCE_NOT_FOUND,
                ErrorCategory::Resource,
                "The requested browser does not exist",
            )
            .tag("resource", id.clone()),
            Self::Engine(err) => ErrorEnvelope::new(
                codes::BROWSER_ACTION_FAILED,
                ErrorCategory::Browser,
                "The browser engine failed the operation",
            )
            .severity(ErrorSeverity::High)
            .details(serde_json::json!({ "engine": err.to_string() })),
        }
    }
}

/// An exclusive claim on one browser.
#[derive(Clone, Debug)]
pub struct PoolLease {
    /// Pool-assigned browser id.
    pub browser_id: String,
    /// The engine process.
    pub handle: Arc<dyn EngineHandle>,
}

struct PoolState {
    instances: HashMap<String, BrowserInstance>,
    queue: AcquireQueue,
    launching: usize,
    shutting_down: bool,
}

struct PoolInner {
    config: PoolConfig,
    launch_options: LaunchOptions,
    backend: Arc<dyn EngineBackend>,
    state: Mutex<PoolState>,
    breaker: CircuitBreaker,
    metrics: PoolMetrics,
}

/// The browser pool.
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

enum AcquirePlan {
    Granted(PoolLease),
    Launch,
    Wait {
        rx: oneshot::Receiver<Result<GrantedLease, PoolError>>,
        ticket: u64,
    },
}

impl BrowserPool {
    /// Create a pool. No engines are launched until first use or until the
    /// scaling loop grows the pool to `min_browsers`.
    pub fn new(
        config: PoolConfig,
        launch_options: LaunchOptions,
        backend: Arc<dyn EngineBackend>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self {
            inner: Arc::new(PoolInner {
                config,
                launch_options,
                backend,
                state: Mutex::new(PoolState {
                    instances: HashMap::new(),
                    queue: AcquireQueue::default(),
                    launching: 0,
                    shutting_down: false,
                }),
                breaker,
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// Lease a browser for a session.
    ///
    /// Reuses the session's existing lease, then an idle instance, then
    /// launches (capacity permitting), and otherwise queues until an
    /// instance frees up or `acquisition_timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`PoolError::Exhausted`] when the deadline elapses,
    /// [`PoolError::Unavailable`] during shutdown, and breaker/engine
    /// failures from the launch path.
    #[instrument(level = "debug", skip(self))]
    pub async fn acquire(&self, session_id: &str) -> Result<PoolLease, PoolError> {
        let started = Instant::now();
        let deadline = started + self.inner.config.acquisition_timeout;

        let plan = {
            let mut state = self.inner.state.lock().await;
            if state.shutting_down {
                return Err(PoolError::Unavailable("shutting down".to_string()));
            }

            // A session keeps at most one lease; reuse it.
            if let Some(existing) = state
                .instances
                .values_mut()
                .find(|i| i.leased_by(session_id))
            {
                existing.use_count += 1;
                existing.last_used_at = Instant::now();
                AcquirePlan::Granted(PoolLease {
                    browser_id: existing.id.clone(),
                    handle: existing.handle.clone(),
                })
            } else if let Some(idle) = state
                .instances
                .values_mut()
                .find(|i| i.state == BrowserState::Idle)
            {
                idle.activate(session_id);
                AcquirePlan::Granted(PoolLease {
                    browser_id: idle.id.clone(),
                    handle: idle.handle.clone(),
                })
            } else if state.instances.len() + state.launching < self.inner.config.max_browsers {
                state.launching += 1;
                AcquirePlan::Launch
            } else {
                let (tx, rx) = oneshot::channel();
                let ticket = state.queue.push(session_id.to_string(), deadline, tx);
                AcquirePlan::Wait { rx, ticket }
            }
        };

        match plan {
            AcquirePlan::Granted(lease) => {
                self.inner.metrics.record_acquisition(started.elapsed());
                Ok(lease)
            }
            AcquirePlan::Launch => {
                let result = self.launch_instance(Some(session_id)).await;
                match result {
                    Ok(lease) => {
                        self.inner.metrics.record_acquisition(started.elapsed());
                        Ok(lease)
                    }
                    Err(err) => Err(err),
                }
            }
            AcquirePlan::Wait { rx, ticket } => {
                debug!(session_id, "pool saturated, queueing acquire");
                match timeout(self.inner.config.acquisition_timeout, rx).await {
                    Ok(Ok(Ok(granted))) => {
                        self.inner.metrics.record_acquisition(started.elapsed());
                        Ok(PoolLease {
                            browser_id: granted.browser_id,
                            handle: granted.handle,
                        })
                    }
                    Ok(Ok(Err(err))) => Err(err),
                    // Sender dropped (expired pop) or deadline elapsed.
                    Ok(Err(_)) | Err(_) => {
                        let mut state = self.inner.state.lock().await;
                        state.queue.remove(ticket);
                        drop(state);
                        self.inner.metrics.record_acquisition_timeout();
                        Err(PoolError::Exhausted {
                            waited: started.elapsed(),
                        })
                    }
                }
            }
        }
    }

    /// Launch one instance, leased to `session_id` when given, idle
    /// otherwise. The launching slot must already be reserved.
    async fn launch_instance(&self, session_id: Option<&str>) -> Result<PoolLease, PoolError> {
        if !self.inner.breaker.allow() {
            let mut state = self.inner.state.lock().await;
            state.launching = state.launching.saturating_sub(1);
            return Err(PoolError::CircuitOpen);
        }

        let launched = self
            .inner
            .backend
            .launch(&self.inner.launch_options)
            .await;

        let mut state = self.inner.state.lock().await;
        state.launching = state.launching.saturating_sub(1);

        let handle = match launched {
            Ok(handle) => {
                self.inner.breaker.record_success();
                self.inner.metrics.record_launch();
                handle
            }
            Err(err) => {
                self.inner.breaker.record_failure();
                self.inner.metrics.record_launch_failure();
                warn!(error = %err, "engine launch failed");
                return Err(PoolError::Unavailable(err.to_string()));
            }
        };

        if state.shutting_down {
            drop(state);
            let _ = handle.close().await;
            return Err(PoolError::Unavailable("shutting down".to_string()));
        }

        let id = format!("browser-{}", Uuid::new_v4());
        let mut inst = BrowserInstance::idle(id.clone(), handle.clone());
        if let Some(session) = session_id {
            inst.activate(session);
        }
        info!(browser_id = %id, leased = session_id.is_some(), "engine joined the pool");
        state.instances.insert(id.clone(), inst);
        Ok(PoolLease {
            browser_id: id,
            handle,
        })
    }

    /// Return a lease. The freed instance is granted to the queue head
    /// (FIFO among non-expired waiters) or parked idle.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] for unknown browsers.
    #[instrument(level = "debug", skip(self))]
    pub async fn release(&self, browser_id: &str) -> Result<(), PoolError> {
        let mut state = self.inner.state.lock().await;
        let Some(inst) = state.instances.get_mut(browser_id) else {
            return Err(PoolError::NotFound(browser_id.to_string()));
        };
        if inst.state != BrowserState::Active {
            return Ok(());
        }
        inst.deactivate();
        inst.page_count = 0;
        self.inner.metrics.record_release();
        Self::grant_from_queue(&mut state, browser_id);
        Ok(())
    }

    /// Release whatever lease a session holds, if any.
    ///
    /// Used when a session or its last context is destroyed.
    pub async fn release_session(&self, session_id: &str) {
        let browser_id = {
            let state = self.inner.state.lock().await;
            state
                .instances
                .values()
                .find(|i| i.leased_by(session_id))
                .map(|i| i.id.clone())
        };
        if let Some(browser_id) = browser_id {
            let _ = self.release(&browser_id).await;
        }
    }

    /// Hand a freed instance to the first live waiter, if any.
    fn grant_from_queue(state: &mut PoolState, browser_id: &str) {
        let now = Instant::now();
        loop {
            let Some(waiter) = state.queue.pop_live(now) else {
                return;
            };
            let Some(inst) = state.instances.get_mut(browser_id) else {
                return;
            };
            if inst.state != BrowserState::Idle {
                return;
            }
            inst.activate(&waiter.session_id);
            let lease = GrantedLease {
                browser_id: inst.id.clone(),
                handle: inst.handle.clone(),
            };
            if waiter.tx.send(Ok(lease)).is_ok() {
                return;
            }
            // Receiver gave up between pop and send; undo and try the next.
            if let Some(inst) = state.instances.get_mut(browser_id) {
                inst.deactivate();
            }
        }
    }

    /// Create a page under a lease.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotLeased`] when the session does not hold the lease,
    /// [`PoolError::PageLimit`] at the per-browser cap, and engine errors.
    pub async fn create_page(
        &self,
        browser_id: &str,
        session_id: &str,
        options: &PageOptions,
    ) -> Result<Arc<dyn EnginePage>, PoolError> {
        let handle = {
            let state = self.inner.state.lock().await;
            let inst = state
                .instances
                .get(browser_id)
                .ok_or_else(|| PoolError::NotFound(browser_id.to_string()))?;
            if !inst.leased_by(session_id) {
                return Err(PoolError::NotLeased {
                    browser_id: browser_id.to_string(),
                });
            }
            if inst.page_count >= self.inner.config.max_pages_per_browser {
                return Err(PoolError::PageLimit {
                    max: self.inner.config.max_pages_per_browser,
                });
            }
            inst.handle.clone()
        };

        if !self.inner.breaker.allow() {
            return Err(PoolError::CircuitOpen);
        }
        match handle.new_page(options).await {
            Ok(page) => {
                self.inner.breaker.record_success();
                let mut state = self.inner.state.lock().await;
                if let Some(inst) = state.instances.get_mut(browser_id) {
                    inst.page_count += 1;
                    inst.last_used_at = Instant::now();
                }
                Ok(page)
            }
            Err(err) => {
                self.inner.breaker.record_failure();
                self.inner.metrics.record_engine_error();
                let mut state = self.inner.state.lock().await;
                if let Some(inst) = state.instances.get_mut(browser_id) {
                    inst.error_count += 1;
                }
                Err(PoolError::Engine(err))
            }
        }
    }

    /// Note a closed page under a lease.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotLeased`] when the session does not hold the lease.
    pub async fn close_page(&self, browser_id: &str, session_id: &str) -> Result<(), PoolError> {
        let mut state = self.inner.state.lock().await;
        let Some(inst) = state.instances.get_mut(browser_id) else {
            return Err(PoolError::NotFound(browser_id.to_string()));
        };
        if !inst.leased_by(session_id) {
            return Err(PoolError::NotLeased {
                browser_id: browser_id.to_string(),
            });
        }
        inst.page_count = inst.page_count.saturating_sub(1);
        inst.last_used_at = Instant::now();
        Ok(())
    }

    /// Note an engine error attributed to a browser.
    pub async fn record_error(&self, browser_id: &str) {
        self.inner.metrics.record_engine_error();
        let mut state = self.inner.state.lock().await;
        if let Some(inst) = state.instances.get_mut(browser_id) {
            inst.error_count += 1;
        }
    }

    /// Gracefully close and replace an instance.
    ///
    /// The instance is removed from service immediately; a replacement is
    /// launched when the pool would otherwise fall below `min_browsers`
    /// or waiters are queued.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] for unknown browsers.
    #[instrument(level = "info", skip(self))]
    pub async fn recycle(&self, browser_id: &str) -> Result<(), PoolError> {
        let handle = {
            let mut state = self.inner.state.lock().await;
            let Some(inst) = state.instances.get_mut(browser_id) else {
                return Err(PoolError::NotFound(browser_id.to_string()));
            };
            if !inst.state.can_transition_to(BrowserState::Recycling) {
                return Ok(());
            }
            inst.state = BrowserState::Recycling;
            inst.session_id = None;
            inst.handle.clone()
        };

        let _ = handle.close().await;

        {
            let mut state = self.inner.state.lock().await;
            state.instances.remove(browser_id);
        }
        self.inner.metrics.record_recycled();
        self.replenish().await;
        Ok(())
    }

    /// Launch instances to satisfy queued waiters and the minimum size.
    async fn replenish(&self) {
        loop {
            let plan = {
                let mut state = self.inner.state.lock().await;
                if state.shutting_down {
                    return;
                }
                let total = state.instances.len() + state.launching;
                let has_waiters = !state.queue.is_empty();
                if has_waiters && total < self.inner.config.max_browsers {
                    state.launching += 1;
                    Some(true)
                } else if total < self.inner.config.min_browsers {
                    state.launching += 1;
                    Some(false)
                } else {
                    None
                }
            };
            let Some(for_waiter) = plan else {
                return;
            };

            match self.launch_instance(None).await {
                Ok(lease) => {
                    if for_waiter {
                        let mut state = self.inner.state.lock().await;
                        Self::grant_from_queue(&mut state, &lease.browser_id);
                    }
                }
                Err(err) => {
                    debug!(error = %err, "replenish launch failed");
                    return;
                }
            }
        }
    }

    /// Probe every instance; three consecutive failures mark it unhealthy
    /// and hand it to the recycler. Returns ids marked unhealthy this run.
    pub async fn health_check(&self) -> Vec<String> {
        let probes: Vec<(String, Arc<dyn EngineHandle>)> = {
            let state = self.inner.state.lock().await;
            state
                .instances
                .values()
                .filter(|i| {
                    matches!(i.state, BrowserState::Idle | BrowserState::Active)
                })
                .map(|i| (i.id.clone(), i.handle.clone()))
                .collect()
        };

        let mut results = Vec::with_capacity(probes.len());
        for (id, handle) in probes {
            let alive = handle.is_alive().await;
            let usage = handle.resource_usage().await;
            let within_policy = usage.memory_bytes
                < self.inner.config.recycling.memory_ceiling_bytes
                && usage.cpu_percent < self.inner.config.recycling.cpu_ceiling_percent;
            results.push((id, alive && within_policy, usage));
        }

        let mut marked = Vec::new();
        let mut state = self.inner.state.lock().await;
        for (id, healthy, usage) in results {
            let Some(inst) = state.instances.get_mut(&id) else {
                continue;
            };
            inst.last_usage = usage;
            if healthy {
                inst.health_failures = 0;
            } else {
                inst.health_failures += 1;
                if inst.health_failures >= self.inner.config.recycling.max_health_failures
                    && inst.state.can_transition_to(BrowserState::Unhealthy)
                {
                    warn!(browser_id = %id, "instance marked unhealthy");
                    inst.state = BrowserState::Unhealthy;
                    marked.push(id);
                }
            }
        }
        marked
    }

    /// Current metrics snapshot.
    pub async fn metrics(&self) -> MetricsSnapshot {
        let gauges = {
            let state = self.inner.state.lock().await;
            let mut gauges = PoolGauges {
                total: state.instances.len(),
                launching: state.launching,
                queue_length: state.queue.len(),
                ..PoolGauges::default()
            };
            for inst in state.instances.values() {
                match inst.state {
                    BrowserState::Idle => gauges.idle += 1,
                    BrowserState::Active => gauges.active += 1,
                    BrowserState::Unhealthy => gauges.unhealthy += 1,
                    _ => {}
                }
            }
            gauges
        };
        self.inner.metrics.snapshot(gauges)
    }

    /// Breaker state, for readiness checks.
    pub fn breaker_state(&self) -> breaker::BreakerState {
        self.inner.breaker.state()
    }

    /// Stop serving: fail queued waiters with `unavailable`, close every
    /// engine, and refuse further acquisitions.
    pub async fn shutdown(&self) {
        let (handles, drained) = {
            let mut state = self.inner.state.lock().await;
            state.shutting_down = true;
            let drained = state.queue.len();
            state
                .queue
                .drain_with(|| PoolError::Unavailable("shutting down".to_string()));
            let handles: Vec<Arc<dyn EngineHandle>> = state
                .instances
                .drain()
                .map(|(_, inst)| inst.handle)
                .collect();
            (handles, drained)
        };
        info!(engines = handles.len(), drained, "browser pool shutting down");
        for handle in handles {
            let _ = handle.close().await;
        }
    }

    /// Spawn the scaling, recycling and health loops.
    pub fn start_loops(&self, signal: &ShutdownSignal) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tokio::spawn(scaling_loop(self.clone(), signal.clone())),
            tokio::spawn(recycling_loop(self.clone(), signal.clone())),
            tokio::spawn(health_loop(self.clone(), signal.clone())),
        ]
    }

    /// One scaling cycle; factored out for tests.
    pub async fn scaling_cycle(&self, loop_state: &mut ScalingLoopState) -> ScalingDecision {
        let (gauges, total) = {
            let state = self.inner.state.lock().await;
            let mut gauges = PoolGauges {
                total: state.instances.len(),
                launching: state.launching,
                queue_length: state.queue.len(),
                ..PoolGauges::default()
            };
            for inst in state.instances.values() {
                match inst.state {
                    BrowserState::Idle => gauges.idle += 1,
                    BrowserState::Active => gauges.active += 1,
                    BrowserState::Unhealthy => gauges.unhealthy += 1,
                    _ => {}
                }
            }
            (gauges, state.instances.len() + state.launching)
        };

        let (memory_pressure, cpu_pressure) = system_pressure();
        let utilization = gauges.utilization();
        let signals = ScalingSignals {
            current_size: total,
            utilization,
            queue_length: gauges.queue_length,
            error_rate: self
                .inner
                .metrics
                .error_rate(self.inner.config.scaling.cooldown),
            p95_latency: self.inner.metrics.p95_latency(),
            memory_pressure,
            cpu_pressure,
            trend: utilization - loop_state.previous_utilization,
        };
        loop_state.previous_utilization = utilization;

        let now = Instant::now();
        let decision = scaling::decide(
            &self.inner.config.scaling,
            &signals,
            loop_state,
            self.inner.config.min_browsers,
            self.inner.config.max_browsers,
            now,
        );

        match decision {
            ScalingDecision::ScaleUp(n) | ScalingDecision::EmergencyScaleUp(n) => {
                info!(add = n, ?decision, "scaling up");
                for _ in 0..n {
                    {
                        let mut state = self.inner.state.lock().await;
                        if state.shutting_down
                            || state.instances.len() + state.launching
                                >= self.inner.config.max_browsers
                        {
                            break;
                        }
                        state.launching += 1;
                    }
                    if let Ok(lease) = self.launch_instance(None).await {
                        let mut state = self.inner.state.lock().await;
                        Self::grant_from_queue(&mut state, &lease.browser_id);
                    } else {
                        break;
                    }
                }
                loop_state.changed(now);
            }
            ScalingDecision::ScaleDown(n) | ScalingDecision::ForceScaleDown(n) => {
                info!(remove = n, ?decision, "scaling down");
                let victims: Vec<String> = {
                    let state = self.inner.state.lock().await;
                    let mut idle: Vec<&BrowserInstance> = state
                        .instances
                        .values()
                        .filter(|i| i.state == BrowserState::Idle)
                        .collect();
                    idle.sort_by_key(|i| i.last_used_at);
                    idle.iter().take(n).map(|i| i.id.clone()).collect()
                };
                for id in victims {
                    let _ = self.recycle(&id).await;
                }
                loop_state.changed(now);
            }
            ScalingDecision::Maintain => {}
        }
        decision
    }

    /// One recycling cycle; factored out for tests. Returns recycled ids.
    pub async fn recycling_cycle(&self, last_round: &mut Option<Instant>) -> Vec<String> {
        let config = &self.inner.config.recycling;
        let now = Instant::now();
        if last_round.is_some_and(|at| now.duration_since(at) < config.cooldown) {
            return Vec::new();
        }

        let in_window =
            recycling::in_maintenance_window(config, chrono::Local::now().hour());
        let candidates: Vec<(String, f64)> = {
            let state = self.inner.state.lock().await;
            let mut scored: Vec<(String, f64)> = state
                .instances
                .values()
                .filter(|i| {
                    matches!(i.state, BrowserState::Idle | BrowserState::Unhealthy)
                })
                .map(|i| {
                    let score = recycling::composite_score(
                        config,
                        &InstanceSnapshot {
                            age: i.age(),
                            use_count: i.use_count,
                            health_failures: i.health_failures,
                            usage: i.last_usage,
                        },
                    );
                    (i.id.clone(), score)
                })
                .filter(|(_, score)| {
                    *score >= config.recycling_threshold
                        || (in_window && *score >= config.recycling_threshold / 2.0)
                })
                .collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            scored.truncate(config.max_batch_size);
            scored
        };

        if candidates.is_empty() {
            return Vec::new();
        }
        *last_round = Some(now);

        let mut recycled = Vec::new();
        for (id, score) in candidates {
            info!(browser_id = %id, score, "recycling instance");
            if self.recycle(&id).await.is_ok() {
                recycled.push(id);
            }
        }
        recycled
    }
}

/// System-wide memory and CPU pressure in [0, 1].
fn system_pressure() -> (f64, f64) {
    let refresh = RefreshKind::new()
        .with_memory(MemoryRefreshKind::new().with_ram())
        .with_cpu(CpuRefreshKind::new().with_cpu_usage());
    let system = System::new_with_specifics(refresh);
    let memory = if system.total_memory() == 0 {
        0.0
    } else {
        system.used_memory() as f64 / system.total_memory() as f64
    };
    let cpu = f64::from(system.global_cpu_usage()) / 100.0;
    (memory.clamp(0.0, 1.0), cpu.clamp(0.0, 1.0))
}

async fn scaling_loop(pool: BrowserPool, mut signal: ShutdownSignal) {
    let interval = pool.inner.config.health_check_interval;
    let mut loop_state = ScalingLoopState::default();
    loop {
        tokio::select! {
            () = signal.wait() => break,
            () = tokio::time::sleep(interval) => {
                pool.scaling_cycle(&mut loop_state).await;
            }
        }
    }
    debug!("scaling loop stopped");
}

async fn recycling_loop(pool: BrowserPool, mut signal: ShutdownSignal) {
    let interval = pool.inner.config.health_check_interval;
    let mut last_round = None;
    loop {
        tokio::select! {
            () = signal.wait() => break,
            () = tokio::time::sleep(interval) => {
                pool.recycling_cycle(&mut last_round).await;
            }
        }
    }
    debug!("recycling loop stopped");
}

async fn health_loop(pool: BrowserPool, mut signal: ShutdownSignal) {
    let interval = pool.inner.config.health_check_interval;
    loop {
        tokio::select! {
            () = signal.wait() => break,
            () = tokio::time::sleep(interval) => {
                let marked = pool.health_check().await;
                for id in marked {
                    let _ = pool.recycle(&id).await;
                }
            }
        }
    }
    debug!("health loop stopped");
}

#[cfg(test)]
mod tests;

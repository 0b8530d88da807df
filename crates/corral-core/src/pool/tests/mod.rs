use std::sync::Arc;
use std::time::{Duration, Instant};

use super::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use super::instance::BrowserState;
use super::queue::AcquireQueue;
use super::recycling::{self, InstanceSnapshot, RecyclingConfig};
use super::scaling::{self, ScalingConfig, ScalingDecision, ScalingLoopState, ScalingSignals};
use super::*;
use crate::config::PoolConfig;
use crate::engine::mock::MockEngine;
use crate::engine::{LaunchOptions, PageOptions, ResourceUsage};

fn pool_with(max: usize, engine: Arc<MockEngine>) -> BrowserPool {
    let config = PoolConfig {
        min_browsers: 0,
        max_browsers: max,
        max_pages_per_browser: 2,
        acquisition_timeout: Duration::from_millis(200),
        ..PoolConfig::default()
    };
    BrowserPool::new(config, LaunchOptions::default(), engine)
}

// --- state machine ---

#[test]
fn state_machine_allows_documented_transitions() {
    use BrowserState::{Active, Closed, Idle, Launching, Recycling, Unhealthy};
    assert!(Launching.can_transition_to(Idle));
    assert!(Idle.can_transition_to(Active));
    assert!(Active.can_transition_to(Idle));
    assert!(Idle.can_transition_to(Unhealthy));
    assert!(Active.can_transition_to(Unhealthy));
    assert!(Unhealthy.can_transition_to(Recycling));
    assert!(Recycling.can_transition_to(Closed));

    // Recycling is absorbing with respect to service.
    assert!(!Recycling.can_transition_to(Idle));
    assert!(!Recycling.can_transition_to(Active));
    assert!(!Closed.can_transition_to(Idle));
    assert!(!Unhealthy.can_transition_to(Active));
}

// --- queue ---

#[test]
fn queue_pops_in_fifo_order_skipping_expired() {
    let mut queue = AcquireQueue::default();
    let now = Instant::now();
    let later = now + Duration::from_secs(30);

    let (tx1, _rx1) = tokio::sync::oneshot::channel();
    let (tx2, _rx2) = tokio::sync::oneshot::channel();
    let (tx3, _rx3) = tokio::sync::oneshot::channel();
    queue.push("s1".to_string(), now - Duration::from_secs(1), tx1); // expired
    queue.push("s2".to_string(), later, tx2);
    queue.push("s3".to_string(), later, tx3);

    let first = queue.pop_live(now).unwrap();
    assert_eq!(first.session_id, "s2");
    let second = queue.pop_live(now).unwrap();
    assert_eq!(second.session_id, "s3");
    assert!(queue.pop_live(now).is_none());
}

#[test]
fn queue_remove_by_ticket() {
    let mut queue = AcquireQueue::default();
    let later = Instant::now() + Duration::from_secs(30);
    let (tx, _rx) = tokio::sync::oneshot::channel();
    let ticket = queue.push("s1".to_string(), later, tx);
    assert!(queue.remove(ticket));
    assert!(!queue.remove(ticket));
    assert!(queue.is_empty());
}

// --- circuit breaker ---

#[test]
fn breaker_opens_after_threshold_and_recovers() {
    let breaker = CircuitBreaker::new(BreakerConfig {
        failure_threshold: 3,
        monitoring_window: Duration::from_secs(60),
        reset_timeout: Duration::from_secs(30),
        half_open_max_attempts: 1,
    });
    let t0 = Instant::now();

    assert!(breaker.allow_at(t0));
    for _ in 0..3 {
        breaker.record_failure_at(t0);
    }
    assert_eq!(breaker.state_at(t0), BreakerState::Open);
    assert!(!breaker.allow_at(t0 + Duration::from_secs(1)));

    // After the reset timeout exactly one probe is admitted.
    let probe_time = t0 + Duration::from_secs(31);
    assert!(breaker.allow_at(probe_time));
    assert!(!breaker.allow_at(probe_time));
    assert_eq!(breaker.state_at(probe_time), BreakerState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state_at(probe_time), BreakerState::Closed);
}

#[test]
fn breaker_reopens_on_failed_probe() {
    let breaker = CircuitBreaker::new(BreakerConfig {
        failure_threshold: 1,
        monitoring_window: Duration::from_secs(60),
        reset_timeout: Duration::from_secs(10),
        half_open_max_attempts: 1,
    });
    let t0 = Instant::now();
    breaker.record_failure_at(t0);
    assert_eq!(breaker.state_at(t0), BreakerState::Open);

    let probe_time = t0 + Duration::from_secs(11);
    assert!(breaker.allow_at(probe_time));
    breaker.record_failure_at(probe_time);
    assert_eq!(breaker.state_at(probe_time), BreakerState::Open);
    assert!(!breaker.allow_at(probe_time + Duration::from_secs(1)));
}

#[test]
fn breaker_window_expires_old_failures() {
    let breaker = CircuitBreaker::new(BreakerConfig {
        failure_threshold: 3,
        monitoring_window: Duration::from_secs(10),
        reset_timeout: Duration::from_secs(30),
        half_open_max_attempts: 1,
    });
    let t0 = Instant::now();
    breaker.record_failure_at(t0);
    breaker.record_failure_at(t0 + Duration::from_secs(1));
    // Third failure lands after the first left the window.
    breaker.record_failure_at(t0 + Duration::from_secs(15));
    assert_eq!(breaker.state_at(t0 + Duration::from_secs(15)), BreakerState::Closed);
}

// --- acquire / release ---

#[tokio::test]
async fn acquire_launches_then_reuses_for_same_session() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(2, engine.clone());

    let first = pool.acquire("session-a").await.unwrap();
    let second = pool.acquire("session-a").await.unwrap();
    assert_eq!(first.browser_id, second.browser_id);
    assert_eq!(engine.launch_count(), 1);
}

#[tokio::test]
async fn acquire_prefers_idle_over_launch() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(2, engine.clone());

    let lease = pool.acquire("session-a").await.unwrap();
    pool.release(&lease.browser_id).await.unwrap();

    let again = pool.acquire("session-b").await.unwrap();
    assert_eq!(lease.browser_id, again.browser_id);
    assert_eq!(engine.launch_count(), 1);
}

#[tokio::test]
async fn saturated_pool_queues_fifo_and_completes_on_release() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(2, engine.clone());

    let a = pool.acquire("session-a").await.unwrap();
    let _b = pool.acquire("session-b").await.unwrap();

    // Third acquire must wait.
    let pool_c = pool.clone();
    let waiter = tokio::spawn(async move { pool_c.acquire("session-c").await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    pool.release(&a.browser_id).await.unwrap();
    let granted = waiter.await.unwrap().unwrap();
    assert_eq!(granted.browser_id, a.browser_id);
    // No extra engine was launched for the waiter.
    assert_eq!(engine.launch_count(), 2);
}

#[tokio::test]
async fn queue_grants_in_enqueue_order() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(1, engine);

    let lease = pool.acquire("first").await.unwrap();

    let pool_a = pool.clone();
    let early = tokio::spawn(async move { pool_a.acquire("early").await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let pool_b = pool.clone();
    let late = tokio::spawn(async move { pool_b.acquire("late").await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    pool.release(&lease.browser_id).await.unwrap();
    let first_grant = early.await.unwrap().unwrap();
    assert_eq!(first_grant.browser_id, lease.browser_id);

    pool.release(&first_grant.browser_id).await.unwrap();
    let second_grant = late.await.unwrap().unwrap();
    assert_eq!(second_grant.browser_id, lease.browser_id);
}

#[tokio::test]
async fn exhausted_acquire_times_out_with_resource_exhausted() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(1, engine);

    let _held = pool.acquire("holder").await.unwrap();
    let err = pool.acquire("queued").await.unwrap_err();
    assert!(matches!(err, PoolError::Exhausted { .. }));

    let envelope = err.to_envelope();
    assert_eq!(envelope.code, crate::envelope::codes::RESOURCE_EXHAUSTED);
    assert_eq!(envelope.status_code(), 429);
    let retry = envelope.retry_config.unwrap();
    assert!(retry.max_attempts >= 1);
}

#[tokio::test]
async fn pool_never_exceeds_max_browsers() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(3, engine.clone());

    let mut leases = Vec::new();
    for i in 0..3 {
        leases.push(pool.acquire(&format!("s{i}")).await.unwrap());
    }
    assert!(pool.acquire("overflow").await.is_err());
    assert_eq!(engine.launch_count(), 3);

    let snapshot = pool.metrics().await;
    assert!(snapshot.active + snapshot.idle <= 3);
}

#[tokio::test]
async fn launch_failure_surfaces_as_unavailable() {
    let engine = Arc::new(MockEngine::new());
    engine.fail_next_launches(1);
    let pool = pool_with(2, engine);

    let err = pool.acquire("session-a").await.unwrap_err();
    assert!(matches!(err, PoolError::Unavailable(_)));
}

#[tokio::test]
async fn breaker_opens_after_repeated_launch_failures() {
    let engine = Arc::new(MockEngine::new());
    engine.fail_next_launches(10);
    let config = PoolConfig {
        min_browsers: 0,
        max_browsers: 2,
        acquisition_timeout: Duration::from_millis(100),
        breaker: BreakerConfig {
            failure_threshold: 5,
            monitoring_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            half_open_max_attempts: 1,
        },
        ..PoolConfig::default()
    };
    let pool = BrowserPool::new(config, LaunchOptions::default(), engine);

    for _ in 0..5 {
        let err = pool.acquire("s").await.unwrap_err();
        assert!(matches!(err, PoolError::Unavailable(_)));
    }

    // Sixth call fails fast on the open breaker.
    let started = Instant::now();
    let err = pool.acquire("s").await.unwrap_err();
    assert!(matches!(err, PoolError::CircuitOpen));
    assert!(started.elapsed() < Duration::from_millis(50));

    let envelope = err.to_envelope();
    assert!(
        envelope
            .recovery_suggestions
            .contains(&crate::envelope::RecoverySuggestion::WaitAndRetry)
    );
    assert_eq!(envelope.status_code(), 503);
}

// --- pages under lease ---

#[tokio::test]
async fn create_page_requires_lease_ownership() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(2, engine);
    let lease = pool.acquire("owner").await.unwrap();

    let page = pool
        .create_page(&lease.browser_id, "owner", &PageOptions::default())
        .await
        .unwrap();
    assert!(!page.id().is_empty());

    let err = pool
        .create_page(&lease.browser_id, "intruder", &PageOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::NotLeased { .. }));
}

#[tokio::test]
async fn page_limit_is_enforced_and_released() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(2, engine);
    let lease = pool.acquire("owner").await.unwrap();

    for _ in 0..2 {
        pool.create_page(&lease.browser_id, "owner", &PageOptions::default())
            .await
            .unwrap();
    }
    let err = pool
        .create_page(&lease.browser_id, "owner", &PageOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::PageLimit { max: 2 }));

    pool.close_page(&lease.browser_id, "owner").await.unwrap();
    pool.create_page(&lease.browser_id, "owner", &PageOptions::default())
        .await
        .unwrap();
}

// --- recycling / health ---

#[tokio::test]
async fn recycle_removes_instance_and_serves_waiters() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(1, engine.clone());
    let lease = pool.acquire("a").await.unwrap();
    pool.release(&lease.browser_id).await.unwrap();

    pool.recycle(&lease.browser_id).await.unwrap();
    let snapshot = pool.metrics().await;
    assert_eq!(snapshot.recycled, 1);
    assert_eq!(snapshot.total, 0);

    // The pool can launch a fresh engine afterwards.
    let fresh = pool.acquire("b").await.unwrap();
    assert_ne!(fresh.browser_id, lease.browser_id);
}

#[tokio::test]
async fn health_check_marks_dead_engines_after_three_strikes() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(2, engine.clone());
    let lease = pool.acquire("a").await.unwrap();

    engine.handles()[0].kill();
    assert!(pool.health_check().await.is_empty());
    assert!(pool.health_check().await.is_empty());
    let marked = pool.health_check().await;
    assert_eq!(marked, vec![lease.browser_id.clone()]);
}

#[tokio::test]
async fn resource_policy_violations_count_as_unhealthy() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(2, engine.clone());
    let _lease = pool.acquire("a").await.unwrap();

    engine.handles()[0].set_usage(ResourceUsage {
        memory_bytes: u64::MAX,
        cpu_percent: 1.0,
    });
    pool.health_check().await;
    pool.health_check().await;
    let marked = pool.health_check().await;
    assert_eq!(marked.len(), 1);
}

// --- scaling policy ---

fn signals(size: usize, utilization: f64) -> ScalingSignals {
    ScalingSignals {
        current_size: size,
        utilization,
        ..ScalingSignals::default()
    }
}

#[test]
fn scaling_up_on_high_utilization() {
    let config = ScalingConfig::default();
    let mut state = ScalingLoopState::default();
    let decision = decide_now(&config, &signals(4, 0.9), &mut state, 1, 8);
    assert!(matches!(decision, ScalingDecision::ScaleUp(_)));
}

#[test]
fn scaling_up_on_queued_waiters() {
    let config = ScalingConfig::default();
    let mut state = ScalingLoopState::default();
    let mut s = signals(2, 0.5);
    s.queue_length = 3;
    let decision = decide_now(&config, &s, &mut state, 1, 8);
    assert_eq!(decision, ScalingDecision::ScaleUp(2)); // capped by max_scale_step
}

#[test]
fn scale_down_requires_consecutive_low_cycles() {
    let config = ScalingConfig::default();
    let mut state = ScalingLoopState::default();
    let low = signals(4, 0.1);
    assert_eq!(
        decide_now(&config, &low, &mut state, 1, 8),
        ScalingDecision::Maintain
    );
    assert!(matches!(
        decide_now(&config, &low, &mut state, 1, 8),
        ScalingDecision::ScaleDown(_)
    ));
}

#[test]
fn cooldown_suppresses_routine_scaling() {
    let config = ScalingConfig::default();
    let mut state = ScalingLoopState::default();
    state.changed(Instant::now());
    let decision = decide_now(&config, &signals(4, 0.95), &mut state, 1, 8);
    assert_eq!(decision, ScalingDecision::Maintain);
}

#[test]
fn emergency_scale_up_bypasses_cooldown() {
    let config = ScalingConfig::default();
    let mut state = ScalingLoopState::default();
    state.changed(Instant::now());
    let mut s = signals(4, 0.5);
    s.error_rate = 0.9;
    let decision = decide_now(&config, &s, &mut state, 1, 8);
    assert!(matches!(decision, ScalingDecision::EmergencyScaleUp(_)));
}

#[test]
fn force_scale_down_under_memory_pressure() {
    let config = ScalingConfig::default();
    let mut state = ScalingLoopState::default();
    let mut s = signals(4, 0.5);
    s.memory_pressure = 0.95;
    let decision = decide_now(&config, &s, &mut state, 1, 8);
    assert!(matches!(decision, ScalingDecision::ForceScaleDown(_)));
}

#[test]
fn scaling_respects_bounds() {
    let config = ScalingConfig::default();
    let mut state = ScalingLoopState::default();
    // Full pool cannot grow.
    assert_eq!(
        decide_now(&config, &signals(8, 0.95), &mut state, 1, 8),
        ScalingDecision::Maintain
    );
    // Minimum-size pool cannot shrink.
    let mut state = ScalingLoopState::default();
    let low = signals(1, 0.0);
    decide_now(&config, &low, &mut state, 1, 8);
    assert_eq!(
        decide_now(&config, &low, &mut state, 1, 8),
        ScalingDecision::Maintain
    );
}

fn decide_now(
    config: &ScalingConfig,
    signals: &ScalingSignals,
    state: &mut ScalingLoopState,
    min: usize,
    max: usize,
) -> ScalingDecision {
    scaling::decide(config, signals, state, min, max, Instant::now())
}

// --- recycling policy ---

#[test]
fn composite_score_saturates_at_100() {
    let config = RecyclingConfig::default();
    let snapshot = InstanceSnapshot {
        age: config.max_lifetime * 10,
        use_count: config.max_use_count * 10,
        health_failures: config.max_health_failures * 10,
        usage: ResourceUsage {
            memory_bytes: config.memory_ceiling_bytes * 10,
            cpu_percent: 100.0,
        },
    };
    let score = recycling::composite_score(&config, &snapshot);
    assert!((score - 100.0).abs() < 1e-9);
}

#[test]
fn fresh_instance_scores_near_zero() {
    let config = RecyclingConfig::default();
    let snapshot = InstanceSnapshot {
        age: Duration::ZERO,
        use_count: 0,
        health_failures: 0,
        usage: ResourceUsage::default(),
    };
    assert!(recycling::composite_score(&config, &snapshot) < 1.0);
}

#[test]
fn aged_instance_crosses_threshold() {
    let config = RecyclingConfig::default();
    let snapshot = InstanceSnapshot {
        age: config.max_lifetime * 2,
        use_count: config.max_use_count,
        health_failures: config.max_health_failures,
        usage: ResourceUsage {
            memory_bytes: config.memory_ceiling_bytes,
            cpu_percent: 0.0,
        },
    };
    assert!(recycling::composite_score(&config, &snapshot) >= config.recycling_threshold);
}

#[test]
fn maintenance_window_handles_wrap() {
    let mut config = RecyclingConfig::default();
    assert!(!recycling::in_maintenance_window(&config, 3));

    config.maintenance_window = Some((2, 5));
    assert!(recycling::in_maintenance_window(&config, 3));
    assert!(!recycling::in_maintenance_window(&config, 5));

    config.maintenance_window = Some((22, 4));
    assert!(recycling::in_maintenance_window(&config, 23));
    assert!(recycling::in_maintenance_window(&config, 1));
    assert!(!recycling::in_maintenance_window(&config, 12));
}

// --- shutdown ---

#[tokio::test]
async fn shutdown_drains_queue_with_unavailable() {
    let engine = Arc::new(MockEngine::new());
    let pool = pool_with(1, engine);
    let _held = pool.acquire("holder").await.unwrap();

    let pool_w = pool.clone();
    let waiter = tokio::spawn(async move { pool_w.acquire("queued").await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.shutdown().await;
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, PoolError::Unavailable(_)));

    // Further acquisitions are refused.
    let err = pool.acquire("later").await.unwrap_err();
    assert!(matches!(err, PoolError::Unavailable(_)));
}

//! Pool scaling policy.
//!
//! The scaling loop computes a signal vector every health-check interval
//! and feeds it to [`decide`], a pure function so the policy is testable
//! without a running pool. Any applied size change starts a cooldown.

use std::str::FromStr;
use std::time::{Duration, Instant};

/// Named threshold presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingStrategy {
    /// Scale late, shrink eagerly.
    Conservative,
    /// Middle ground.
    #[default]
    Balanced,
    /// Scale early, shrink late.
    Aggressive,
}

impl FromStr for ScalingStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            _ => Err(()),
        }
    }
}

/// Scaling thresholds and limits.
#[derive(Debug, Clone)]
pub struct ScalingConfig {
    /// Preset the thresholds came from.
    pub strategy: ScalingStrategy,
    /// Utilization above which the pool grows.
    pub scale_up_threshold: f64,
    /// Utilization below which the pool shrinks.
    pub scale_down_threshold: f64,
    /// Quiet period after any size change.
    pub cooldown: Duration,
    /// Cap on instances added or removed per decision.
    pub max_scale_step: usize,
    /// Error rate that triggers emergency scaling.
    pub critical_error_rate: f64,
    /// p95 latency that triggers emergency scaling.
    pub p95_ceiling: Duration,
    /// Consecutive low-utilization cycles required before shrinking.
    pub scale_down_cycles: u32,
    /// Memory pressure that forces shedding idle instances.
    pub force_down_memory_pressure: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self::preset(ScalingStrategy::Balanced)
    }
}

impl ScalingConfig {
    /// Thresholds for a named preset.
    pub fn preset(strategy: ScalingStrategy) -> Self {
        match strategy {
            ScalingStrategy::Conservative => Self {
                strategy,
                scale_up_threshold: 0.9,
                scale_down_threshold: 0.2,
                cooldown: Duration::from_secs(120),
                max_scale_step: 1,
                critical_error_rate: 0.6,
                p95_ceiling: Duration::from_secs(20),
                scale_down_cycles: 3,
                force_down_memory_pressure: 0.92,
            },
            ScalingStrategy::Balanced => Self {
                strategy,
                scale_up_threshold: 0.8,
                scale_down_threshold: 0.3,
                cooldown: Duration::from_secs(60),
                max_scale_step: 2,
                critical_error_rate: 0.5,
                p95_ceiling: Duration::from_secs(10),
                scale_down_cycles: 2,
                force_down_memory_pressure: 0.9,
            },
            ScalingStrategy::Aggressive => Self {
                strategy,
                scale_up_threshold: 0.6,
                scale_down_threshold: 0.2,
                cooldown: Duration::from_secs(30),
                max_scale_step: 4,
                critical_error_rate: 0.4,
                p95_ceiling: Duration::from_secs(5),
                scale_down_cycles: 2,
                force_down_memory_pressure: 0.9,
            },
        }
    }
}

/// The signal vector one scaling cycle observes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalingSignals {
    /// Instances currently in the pool (including launching).
    pub current_size: usize,
    /// active / current.
    pub utilization: f64,
    /// Queued acquisitions.
    pub queue_length: usize,
    /// Failure share over the recent window.
    pub error_rate: f64,
    /// p95 acquisition latency.
    pub p95_latency: Duration,
    /// System memory pressure [0, 1].
    pub memory_pressure: f64,
    /// System CPU pressure [0, 1].
    pub cpu_pressure: f64,
    /// Utilization delta against the previous cycle.
    pub trend: f64,
}

/// Outcome of one scaling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    /// Add this many instances.
    ScaleUp(usize),
    /// Remove this many idle instances.
    ScaleDown(usize),
    /// Do nothing.
    Maintain,
    /// Add instances bypassing the cooldown.
    EmergencyScaleUp(usize),
    /// Shed idle instances bypassing the cooldown (resource pressure).
    ForceScaleDown(usize),
}

/// Mutable state the scaling loop carries between cycles.
#[derive(Debug, Default)]
pub struct ScalingLoopState {
    /// When the last size change was applied.
    pub last_change: Option<Instant>,
    /// Consecutive cycles below the scale-down threshold.
    pub low_cycles: u32,
    /// Utilization observed last cycle, for the trend signal.
    pub previous_utilization: f64,
}

impl ScalingLoopState {
    /// Note an applied size change, starting the cooldown.
    pub fn changed(&mut self, now: Instant) {
        self.last_change = Some(now);
        self.low_cycles = 0;
    }

    fn in_cooldown(&self, cooldown: Duration, now: Instant) -> bool {
        self.last_change
            .is_some_and(|at| now.duration_since(at) < cooldown)
    }
}

/// Decide what this cycle should do.
///
/// `min_size`/`max_size` bound the result; emergency paths ignore the
/// cooldown but never the bounds.
pub fn decide(
    config: &ScalingConfig,
    signals: &ScalingSignals,
    state: &mut ScalingLoopState,
    min_size: usize,
    max_size: usize,
    now: Instant,
) -> ScalingDecision {
    let headroom = max_size.saturating_sub(signals.current_size);
    let shrinkable = signals.current_size.saturating_sub(min_size);

    // Emergency paths first; they bypass the cooldown.
    if (signals.error_rate > config.critical_error_rate
        || signals.p95_latency > config.p95_ceiling)
        && headroom > 0
    {
        state.low_cycles = 0;
        return ScalingDecision::EmergencyScaleUp(headroom.min(config.max_scale_step));
    }
    if signals.memory_pressure > config.force_down_memory_pressure && shrinkable > 0 {
        state.low_cycles = 0;
        return ScalingDecision::ForceScaleDown(shrinkable.min(config.max_scale_step));
    }

    if state.in_cooldown(config.cooldown, now) {
        return ScalingDecision::Maintain;
    }

    if (signals.utilization > config.scale_up_threshold || signals.queue_length > 0)
        && headroom > 0
    {
        state.low_cycles = 0;
        let wanted = signals.queue_length.max(1);
        return ScalingDecision::ScaleUp(wanted.min(headroom).min(config.max_scale_step));
    }

    if signals.utilization < config.scale_down_threshold && shrinkable > 0 {
        state.low_cycles += 1;
        if state.low_cycles >= config.scale_down_cycles {
            state.low_cycles = 0;
            return ScalingDecision::ScaleDown(shrinkable.min(config.max_scale_step));
        }
        return ScalingDecision::Maintain;
    }

    state.low_cycles = 0;
    ScalingDecision::Maintain
}

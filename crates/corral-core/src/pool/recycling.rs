//! Instance recycling policy.
//!
//! Every instance receives a composite score (0-100) weighted across age,
//! use count, health failures and resource pressure. Crossing the
//! threshold enqueues the instance for graceful replacement; a global
//! cooldown and a batch cap prevent thrash.

use std::time::Duration;

use crate::engine::ResourceUsage;

/// Weights of the four sub-scores. Must sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    /// Share of the age sub-score.
    pub age: f64,
    /// Share of the use-count sub-score.
    pub usage: f64,
    /// Share of the health sub-score.
    pub health: f64,
    /// Share of the resource-pressure sub-score.
    pub resource: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            age: 0.3,
            usage: 0.25,
            health: 0.25,
            resource: 0.2,
        }
    }
}

/// Recycling tuning.
#[derive(Debug, Clone)]
pub struct RecyclingConfig {
    /// Age at which the age sub-score saturates.
    pub max_lifetime: Duration,
    /// Use count at which the usage sub-score saturates.
    pub max_use_count: u64,
    /// Health failures at which the health sub-score saturates.
    pub max_health_failures: u32,
    /// Memory at which the resource sub-score saturates.
    pub memory_ceiling_bytes: u64,
    /// CPU share at which the resource sub-score saturates.
    pub cpu_ceiling_percent: f32,
    /// Composite score that triggers recycling.
    pub recycling_threshold: f64,
    /// Quiet period between recycling rounds.
    pub cooldown: Duration,
    /// Instances recycled per round at most.
    pub max_batch_size: usize,
    /// Local-time hour window (inclusive start, exclusive end) during
    /// which scheduled maintenance recycling is permitted.
    pub maintenance_window: Option<(u32, u32)>,
    /// Sub-score weights.
    pub weights: ScoreWeights,
}

impl Default for RecyclingConfig {
    fn default() -> Self {
        Self {
            max_lifetime: Duration::from_secs(60 * 60),
            max_use_count: 100,
            max_health_failures: 3,
            memory_ceiling_bytes: 1_500 * 1024 * 1024,
            cpu_ceiling_percent: 90.0,
            recycling_threshold: 70.0,
            cooldown: Duration::from_secs(5 * 60),
            max_batch_size: 2,
            maintenance_window: None,
            weights: ScoreWeights::default(),
        }
    }
}

/// The per-instance facts the score is computed from.
#[derive(Debug, Clone, Copy)]
pub struct InstanceSnapshot {
    /// Instance age.
    pub age: Duration,
    /// Lease count.
    pub use_count: u64,
    /// Consecutive health failures.
    pub health_failures: u32,
    /// Latest resource reading.
    pub usage: ResourceUsage,
}

fn ratio(value: f64, ceiling: f64) -> f64 {
    if ceiling <= 0.0 {
        return 0.0;
    }
    (value / ceiling).clamp(0.0, 1.0)
}

/// Composite recycling score in [0, 100].
pub fn composite_score(config: &RecyclingConfig, snapshot: &InstanceSnapshot) -> f64 {
    let age = ratio(
        snapshot.age.as_secs_f64(),
        config.max_lifetime.as_secs_f64(),
    );
    let usage = ratio(snapshot.use_count as f64, config.max_use_count as f64);
    let health = ratio(
        f64::from(snapshot.health_failures),
        f64::from(config.max_health_failures),
    );
    let memory = ratio(
        snapshot.usage.memory_bytes as f64,
        config.memory_ceiling_bytes as f64,
    );
    let cpu = ratio(
        f64::from(snapshot.usage.cpu_percent),
        f64::from(config.cpu_ceiling_percent),
    );
    let resource = memory.max(cpu);

    let weights = &config.weights;
    100.0
        * (age * weights.age
            + usage * weights.usage
            + health * weights.health
            + resource * weights.resource)
}

/// Whether the hour falls inside the configured maintenance window.
pub fn in_maintenance_window(config: &RecyclingConfig, hour: u32) -> bool {
    match config.maintenance_window {
        None => false,
        Some((start, end)) if start <= end => hour >= start && hour < end,
        // Window wraps midnight.
        Some((start, end)) => hour >= start || hour < end,
    }
}

//! Error tracking: fingerprinting, threshold watching and correlation.
//!
//! The tracker retains recent envelopes in a bounded ring, indexes them by
//! category/severity/code, and runs two analyses on every insert: per
//! category threshold watching within a time window, and regex-driven
//! correlation detection that links related entries under a generated
//! correlation group id.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::broadcast;
use tracing::warn;

use super::{ErrorCategory, ErrorEnvelope, ErrorSeverity};

/// Maximum retained entries.
const RING_CAPACITY: usize = 10_000;

/// Entries older than this are removed by cleanup.
const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Channel capacity for tracker alerts.
const ALERT_CHANNEL_SIZE: usize = 64;

/// 64-bit FNV-1a over the identity-bearing fields of an envelope.
///
/// Deterministic across processes: identical `(code, category, message,
/// operation, resource)` tuples always produce the same fingerprint.
pub fn fingerprint(
    code: &str,
    category: ErrorCategory,
    message: &str,
    operation: &str,
    resource: &str,
) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for part in [code, &category.to_string(), message, operation, resource] {
        for byte in part.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        // Field separator so ("ab","c") never collides with ("a","bc").
        hash ^= 0x1f;
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{hash:016x}")
}

/// Fingerprint derived from an envelope's fields and tags.
pub fn fingerprint_envelope(envelope: &ErrorEnvelope) -> String {
    fingerprint(
        &envelope.code,
        envelope.category,
        &envelope.user_message,
        envelope.operation().unwrap_or(""),
        envelope.resource().unwrap_or(""),
    )
}

/// A retained tracker entry.
#[derive(Debug, Clone)]
pub struct TrackedError {
    /// Deterministic fingerprint.
    pub fingerprint: String,
    /// Stable code.
    pub code: String,
    /// Category.
    pub category: ErrorCategory,
    /// Severity.
    pub severity: ErrorSeverity,
    /// User message.
    pub message: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Correlation group, when one was assigned.
    pub correlation_group: Option<String>,
}

/// A rule linking related errors by message pattern within a window.
#[derive(Debug, Clone)]
pub struct CorrelationRule {
    /// Rule name, used in the generated group id.
    pub name: String,
    /// Pattern matched against `CODE: message`.
    pub pattern: Regex,
    /// Window within which matches accumulate.
    pub window: Duration,
    /// Matches required before a group is emitted.
    pub min_count: usize,
}

impl CorrelationRule {
    /// The default saturation rule from the shipped configuration.
    pub fn saturation() -> Self {
        Self {
            name: "saturation".to_string(),
            pattern: Regex::new(r"TIMEOUT|UNAVAILABLE|EXHAUSTED").expect("static regex"),
            window: Duration::from_secs(60),
            min_count: 3,
        }
    }
}

/// Alerts emitted by the tracker analyses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAlert {
    /// A category exceeded its ceiling within the time window.
    ThresholdExceeded {
        /// The offending category.
        category: ErrorCategory,
        /// Observed count within the window.
        count: usize,
        /// Configured ceiling.
        ceiling: usize,
    },
    /// A correlation rule accumulated enough matches.
    CorrelationFound {
        /// Generated correlation group id.
        group_id: String,
        /// Rule that fired.
        rule: String,
        /// Fingerprints of the linked entries.
        members: Vec<String>,
    },
}

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Per-category ceilings within [`TrackerConfig::time_window`].
    pub ceilings: HashMap<ErrorCategory, usize>,
    /// Threshold-watching window.
    pub time_window: Duration,
    /// Correlation rules.
    pub rules: Vec<CorrelationRule>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let mut ceilings = HashMap::new();
        ceilings.insert(ErrorCategory::Browser, 25);
        ceilings.insert(ErrorCategory::Network, 50);
        ceilings.insert(ErrorCategory::System, 10);
        ceilings.insert(ErrorCategory::Security, 5);
        Self {
            ceilings,
            time_window: Duration::from_secs(60),
            rules: vec![CorrelationRule::saturation()],
        }
    }
}

#[derive(Default)]
struct TrackerState {
    ring: VecDeque<TrackedError>,
    by_category: HashMap<ErrorCategory, usize>,
    by_code: HashMap<String, usize>,
    by_severity: HashMap<ErrorSeverity, usize>,
    groups: HashMap<String, Vec<String>>,
    group_counter: u64,
}

/// The error tracker.
pub struct ErrorTracker {
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    alerts: broadcast::Sender<TrackerAlert>,
}

impl ErrorTracker {
    /// Create a tracker with the given configuration.
    pub fn new(config: TrackerConfig) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_SIZE);
        Self {
            config,
            state: Mutex::new(TrackerState::default()),
            alerts,
        }
    }

    /// Subscribe to threshold and correlation alerts.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerAlert> {
        self.alerts.subscribe()
    }

    /// Record an envelope; returns its fingerprint.
    pub fn record(&self, envelope: &ErrorEnvelope) -> String {
        self.record_at(envelope, Utc::now())
    }

    /// Record with an explicit timestamp (the testable entry point).
    pub fn record_at(&self, envelope: &ErrorEnvelope, now: DateTime<Utc>) -> String {
        let fp = fingerprint_envelope(envelope);
        let entry = TrackedError {
            fingerprint: fp.clone(),
            code: envelope.code.clone(),
            category: envelope.category,
            severity: envelope.severity,
            message: envelope.user_message.clone(),
            recorded_at: now,
            correlation_group: None,
        };

        if envelope.category == ErrorCategory::Security {
            warn!(
                target: "audit",
                event = "SECURITY_ERROR",
                code = %envelope.code,
                fingerprint = %fp,
                request_id = %envelope.request_id,
                "security-category error recorded"
            );
        }

        let mut state = self.state.lock();
        if state.ring.len() == RING_CAPACITY {
            if let Some(evicted) = state.ring.pop_front() {
                decrement(&mut state.by_category, &evicted.category);
                decrement(&mut state.by_code, &evicted.code);
                decrement(&mut state.by_severity, &evicted.severity);
            }
        }
        *state.by_category.entry(entry.category).or_default() += 1;
        *state.by_code.entry(entry.code.clone()).or_default() += 1;
        *state.by_severity.entry(entry.severity).or_default() += 1;
        state.ring.push_back(entry);

        self.watch_threshold(&mut state, envelope.category, now);
        self.detect_correlation(&mut state, now);
        fp
    }

    /// Count of retained entries.
    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    /// Whether the tracker holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries currently assigned to the given correlation group.
    pub fn group_members(&self, group_id: &str) -> Vec<String> {
        self.state
            .lock()
            .groups
            .get(group_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Count of retained entries in a category.
    pub fn count_by_category(&self, category: ErrorCategory) -> usize {
        self.state
            .lock()
            .by_category
            .get(&category)
            .copied()
            .unwrap_or(0)
    }

    /// Count of retained entries with a code.
    pub fn count_by_code(&self, code: &str) -> usize {
        self.state.lock().by_code.get(code).copied().unwrap_or(0)
    }

    /// Remove entries older than the 7-day retention period.
    ///
    /// Returns the number of removed entries.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// Cleanup with an explicit clock (the testable entry point).
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::from_std(RETENTION).unwrap_or(chrono::Duration::days(7));
        let mut state = self.state.lock();
        let mut removed = 0;
        while let Some(front) = state.ring.front() {
            if front.recorded_at >= cutoff {
                break;
            }
            if let Some(evicted) = state.ring.pop_front() {
                decrement(&mut state.by_category, &evicted.category);
                decrement(&mut state.by_code, &evicted.code);
                decrement(&mut state.by_severity, &evicted.severity);
                removed += 1;
            }
        }
        removed
    }

    fn watch_threshold(
        &self,
        state: &mut TrackerState,
        category: ErrorCategory,
        now: DateTime<Utc>,
    ) {
        let Some(&ceiling) = self.config.ceilings.get(&category) else {
            return;
        };
        let window = chrono::Duration::from_std(self.config.time_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let count = state
            .ring
            .iter()
            .rev()
            .take_while(|e| now - e.recorded_at <= window)
            .filter(|e| e.category == category)
            .count();
        if count > ceiling {
            warn!(
                target: "audit",
                event = "ERROR_THRESHOLD_EXCEEDED",
                category = %category,
                count,
                ceiling,
                "error threshold exceeded"
            );
            let _ = self.alerts.send(TrackerAlert::ThresholdExceeded {
                category,
                count,
                ceiling,
            });
        }
    }

    fn detect_correlation(&self, state: &mut TrackerState, now: DateTime<Utc>) {
        for rule in &self.config.rules {
            let window = chrono::Duration::from_std(rule.window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            let matching: Vec<usize> = state
                .ring
                .iter()
                .enumerate()
                .rev()
                .take_while(|(_, e)| now - e.recorded_at <= window)
                .filter(|(_, e)| {
                    e.correlation_group.is_none()
                        && rule.pattern.is_match(&format!("{}: {}", e.code, e.message))
                })
                .map(|(i, _)| i)
                .collect();
            if matching.len() < rule.min_count {
                continue;
            }

            state.group_counter += 1;
            let group_id = format!("corr-{}-{:06}", rule.name, state.group_counter);
            let mut members = Vec::with_capacity(matching.len());
            for index in matching {
                if let Some(entry) = state.ring.get_mut(index) {
                    entry.correlation_group = Some(group_id.clone());
                    members.push(entry.fingerprint.clone());
                }
            }
            state.groups.insert(group_id.clone(), members.clone());
            warn!(
                target: "audit",
                event = "ERROR_CORRELATION_FOUND",
                group_id = %group_id,
                rule = %rule.name,
                members = members.len(),
                "correlated error group detected"
            );
            let _ = self.alerts.send(TrackerAlert::CorrelationFound {
                group_id,
                rule: rule.name.clone(),
                members,
            });
        }
    }
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

fn decrement<K: std::hash::Hash + Eq + Clone>(map: &mut HashMap<K, usize>, key: &K) {
    if let Some(count) = map.get_mut(key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests;

use chrono::{Duration as ChronoDuration, Utc};

use super::*;
use crate::envelope::codes;

fn envelope(code: &str, category: ErrorCategory, message: &str) -> ErrorEnvelope {
    ErrorEnvelope::new(code, category, message)
}

#[test]
fn fingerprint_is_deterministic() {
    let a = fingerprint(
        codes::ACTION_TIMEOUT,
        ErrorCategory::Browser,
        "navigation timed out",
        "navigate",
        "page-1",
    );
    let b = fingerprint(
        codes::ACTION_TIMEOUT,
        ErrorCategory::Browser,
        "navigation timed out",
        "navigate",
        "page-1",
    );
    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
}

#[test]
fn fingerprint_distinguishes_fields() {
    let base = fingerprint("C", ErrorCategory::Browser, "m", "op", "res");
    assert_ne!(
        base,
        fingerprint("C2", ErrorCategory::Browser, "m", "op", "res")
    );
    assert_ne!(
        base,
        fingerprint("C", ErrorCategory::Network, "m", "op", "res")
    );
    assert_ne!(base, fingerprint("C", ErrorCategory::Browser, "m2", "op", "res"));
    // Field boundaries matter: ("ab","c") != ("a","bc").
    assert_ne!(
        fingerprint("ab", ErrorCategory::Browser, "c", "", ""),
        fingerprint("a", ErrorCategory::Browser, "bc", "", "")
    );
}

#[test]
fn record_indexes_by_category_and_code() {
    let tracker = ErrorTracker::default();
    tracker.record(&envelope(
        codes::NAVIGATION_FAILED,
        ErrorCategory::Browser,
        "bad gateway",
    ));
    tracker.record(&envelope(
        codes::NAVIGATION_FAILED,
        ErrorCategory::Browser,
        "bad gateway",
    ));
    tracker.record(&envelope(
        codes::VALIDATION_FAILED,
        ErrorCategory::Validation,
        "bad selector",
    ));

    assert_eq!(tracker.len(), 3);
    assert_eq!(tracker.count_by_category(ErrorCategory::Browser), 2);
    assert_eq!(tracker.count_by_code(codes::NAVIGATION_FAILED), 2);
    assert_eq!(tracker.count_by_code(codes::VALIDATION_FAILED), 1);
}

#[test]
fn threshold_alert_fires_above_ceiling() {
    let mut config = TrackerConfig::default();
    config.ceilings.insert(ErrorCategory::Browser, 2);
    let tracker = ErrorTracker::new(config);
    let mut alerts = tracker.subscribe();

    for _ in 0..3 {
        tracker.record(&envelope(
            codes::BROWSER_ACTION_FAILED,
            ErrorCategory::Browser,
            "engine failed",
        ));
    }

    let alert = alerts.try_recv().unwrap();
    match alert {
        TrackerAlert::ThresholdExceeded {
            category,
            count,
            ceiling,
        } => {
            assert_eq!(category, ErrorCategory::Browser);
            assert_eq!(ceiling, 2);
            assert!(count > ceiling);
        }
        other => panic!("unexpected alert {other:?}"),
    }
}

#[test]
fn threshold_ignores_entries_outside_window() {
    let mut config = TrackerConfig::default();
    config.ceilings.insert(ErrorCategory::Browser, 1);
    let tracker = ErrorTracker::new(config);
    let mut alerts = tracker.subscribe();

    let old = Utc::now() - ChronoDuration::seconds(300);
    tracker.record_at(
        &envelope(codes::BROWSER_ACTION_FAILED, ErrorCategory::Browser, "x"),
        old,
    );
    tracker.record_at(
        &envelope(codes::BROWSER_ACTION_FAILED, ErrorCategory::Browser, "x"),
        Utc::now(),
    );

    assert!(alerts.try_recv().is_err());
}

#[test]
fn correlation_links_saturation_errors() {
    let tracker = ErrorTracker::default();
    let mut alerts = tracker.subscribe();

    for _ in 0..3 {
        tracker.record(&envelope(
            codes::RESOURCE_EXHAUSTED,
            ErrorCategory::Resource,
            "pool exhausted",
        ));
    }

    let found = std::iter::from_fn(|| alerts.try_recv().ok())
        .find(|a| matches!(a, TrackerAlert::CorrelationFound { .. }));
    let Some(TrackerAlert::CorrelationFound { group_id, members, .. }) = found else {
        panic!("expected a correlation alert");
    };
    assert_eq!(members.len(), 3);
    assert_eq!(tracker.group_members(&group_id).len(), 3);
}

#[test]
fn correlation_does_not_relink_grouped_entries() {
    let tracker = ErrorTracker::default();
    let mut alerts = tracker.subscribe();

    for _ in 0..3 {
        tracker.record(&envelope(
            codes::RESOURCE_EXHAUSTED,
            ErrorCategory::Resource,
            "pool exhausted",
        ));
    }
    // Drain the first group alert.
    let first: Vec<TrackerAlert> = std::iter::from_fn(|| alerts.try_recv().ok()).collect();
    assert!(
        first
            .iter()
            .any(|a| matches!(a, TrackerAlert::CorrelationFound { .. }))
    );

    // Two more matches are below min_count on their own.
    for _ in 0..2 {
        tracker.record(&envelope(
            codes::RESOURCE_EXHAUSTED,
            ErrorCategory::Resource,
            "pool exhausted",
        ));
    }
    let second: Vec<TrackerAlert> = std::iter::from_fn(|| alerts.try_recv().ok()).collect();
    assert!(
        !second
            .iter()
            .any(|a| matches!(a, TrackerAlert::CorrelationFound { .. }))
    );
}

#[test]
fn cleanup_removes_only_stale_entries() {
    let tracker = ErrorTracker::default();
    let now = Utc::now();
    tracker.record_at(
        &envelope(codes::INTERNAL_ERROR, ErrorCategory::System, "old"),
        now - ChronoDuration::days(8),
    );
    tracker.record_at(
        &envelope(codes::INTERNAL_ERROR, ErrorCategory::System, "fresh"),
        now,
    );

    let removed = tracker.cleanup_at(now);
    assert_eq!(removed, 1);
    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.count_by_category(ErrorCategory::System), 1);
}

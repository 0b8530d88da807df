use std::collections::HashMap;
use std::time::Duration;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults_apply_with_empty_environment() {
    let config = Config::from_lookup(|_| None).unwrap();
    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.pool.max_browsers, 5);
    assert_eq!(config.pool.max_pages_per_browser, 10);
    assert_eq!(config.pool.acquisition_timeout, Duration::from_secs(30));
    assert_eq!(config.pages.idle_timeout, Duration::from_secs(1800));
    assert!(config.jwt_secret.is_none());
}

#[test]
fn production_requires_jwt_secret() {
    let lookup = lookup_from(&[("ENVIRONMENT", "production")]);
    let err = Config::from_lookup(lookup).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
}

#[test]
fn production_with_secret_boots() {
    let lookup = lookup_from(&[("ENVIRONMENT", "production"), ("JWT_SECRET", "s3cret")]);
    let config = Config::from_lookup(lookup).unwrap();
    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
}

#[test]
fn pool_knobs_parse() {
    let lookup = lookup_from(&[
        ("MAX_BROWSERS", "12"),
        ("MAX_PAGES_PER_BROWSER", "4"),
        ("ACQUISITION_TIMEOUT", "5"),
        ("HEALTH_CHECK_INTERVAL", "10"),
        ("IDLE_TIMEOUT", "120"),
    ]);
    let config = Config::from_lookup(lookup).unwrap();
    assert_eq!(config.pool.max_browsers, 12);
    assert_eq!(config.pool.max_pages_per_browser, 4);
    assert_eq!(config.pool.acquisition_timeout, Duration::from_secs(5));
    assert_eq!(config.pool.health_check_interval, Duration::from_secs(10));
    assert_eq!(config.pages.idle_timeout, Duration::from_secs(120));
}

#[test]
fn invalid_numeric_falls_back_to_default() {
    let lookup = lookup_from(&[("MAX_BROWSERS", "not-a-number")]);
    let config = Config::from_lookup(lookup).unwrap();
    assert_eq!(config.pool.max_browsers, 5);
}

#[test]
fn database_block_parses() {
    let lookup = lookup_from(&[
        ("DATABASE_TYPE", "postgres"),
        ("DATABASE_HOST", "db.internal"),
        ("DATABASE_PORT", "5432"),
        ("DATABASE_NAME", "corral"),
        ("DATABASE_SSL", "true"),
        ("DATABASE_POOL_MAX", "16"),
    ]);
    let config = Config::from_lookup(lookup).unwrap();
    assert_eq!(config.store.database.db_type, "postgres");
    assert_eq!(config.store.database.host.as_deref(), Some("db.internal"));
    assert_eq!(config.store.database.port, Some(5432));
    assert!(config.store.database.ssl);
    assert_eq!(config.store.database.pool_max, 16);
}

#[test]
fn dev_secret_fallback_is_stable() {
    let config = Config::default();
    assert_eq!(config.jwt_secret_or_dev(), "corral-development-secret");
}

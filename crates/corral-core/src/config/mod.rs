//! Environment-derived configuration.
//!
//! All knobs have defaults suitable for local development; production
//! deployments override them through environment variables. Invalid numeric
//! values fall back to the default with a warning rather than failing boot.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::pool::breaker::BreakerConfig;
use crate::pool::recycling::RecyclingConfig;
use crate::pool::scaling::{ScalingConfig, ScalingStrategy};
use crate::store::strategy::StoreStrategy;

/// Configuration errors that are fatal at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is missing.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    /// A setting holds a value that cannot be used.
    #[error("invalid configuration for {key}: {reason}")]
    Invalid {
        /// The environment variable at fault.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development; relaxed requirements.
    #[default]
    Development,
    /// Production; a JWT secret is mandatory.
    Production,
}

/// Relational database settings, retained for pluggable store backends.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database flavor: sqlite, postgres or mysql.
    pub db_type: String,
    /// File path for sqlite.
    pub path: Option<String>,
    /// Server host for postgres/mysql.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Database name.
    pub name: Option<String>,
    /// Database user.
    pub user: Option<String>,
    /// Database password.
    pub password: Option<String>,
    /// Whether to require TLS.
    pub ssl: bool,
    /// Connection pool bounds.
    pub pool_min: u32,
    /// Connection pool bounds.
    pub pool_max: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            path: None,
            host: None,
            port: None,
            name: None,
            user: None,
            password: None,
            ssl: false,
            pool_min: 1,
            pool_max: 8,
        }
    }
}

/// Browser pool sizing and timing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Lower bound the pool never scales below.
    pub min_browsers: usize,
    /// Upper bound on concurrent engine processes.
    pub max_browsers: usize,
    /// Pages allowed per leased browser.
    pub max_pages_per_browser: usize,
    /// How long an acquire may wait in the queue.
    pub acquisition_timeout: Duration,
    /// Interval of the health-check and scaling loops.
    pub health_check_interval: Duration,
    /// Scaling loop behavior.
    pub scaling: ScalingConfig,
    /// Recycling loop behavior.
    pub recycling: RecyclingConfig,
    /// Circuit breaker guarding engine calls.
    pub breaker: BreakerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_browsers: 1,
            max_browsers: 5,
            max_pages_per_browser: 10,
            acquisition_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(30),
            scaling: ScalingConfig::default(),
            recycling: RecyclingConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Page manager behavior.
#[derive(Debug, Clone)]
pub struct PageConfig {
    /// Idle pages older than this are closed by the cleanup loop.
    pub idle_timeout: Duration,
    /// Cleanup loop interval.
    pub cleanup_interval: Duration,
    /// How long a closed page id is tombstoned against late events.
    pub tombstone_grace: Duration,
    /// Cap on retained navigation history entries per page.
    pub history_cap: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            tombstone_grace: Duration::from_secs(60),
            history_cap: 50,
        }
    }
}

/// Admission rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per key per minute.
    pub per_minute: u32,
    /// Extra burst capacity above the steady rate.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 120,
            burst: 20,
        }
    }
}

/// Store backend selection.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Preferred backend strategy.
    pub strategy: StoreStrategy,
    /// Relational settings for persistent backends.
    pub database: DatabaseConfig,
    /// Session time-to-live.
    pub session_ttl: Duration,
    /// Interval of the expired-session sweeper.
    pub sweep_interval: Duration,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Deployment environment.
    pub environment: Environment,
    /// Default tracing filter when none is set by the subscriber.
    pub log_level: Option<String>,
    /// HS256 secret for bearer tokens. Mandatory in production.
    pub jwt_secret: Option<String>,
    /// Store selection and TTLs.
    pub store: StoreConfig,
    /// Browser pool knobs.
    pub pool: PoolConfig,
    /// Page manager knobs.
    pub pages: PageConfig,
    /// Admission rate limits.
    pub rate_limit: RateLimitConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strategy: StoreStrategy::default(),
            database: DatabaseConfig::default(),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a mandatory setting is missing for the
    /// selected environment (e.g. `JWT_SECRET` in production).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary lookup function.
    ///
    /// This is the testable entry point behind [`Config::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error when a mandatory setting is missing for the
    /// selected environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("ENVIRONMENT").as_deref() {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        };

        let jwt_secret = lookup("JWT_SECRET");
        if environment == Environment::Production && jwt_secret.is_none() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }

        let mut pool = PoolConfig {
            max_browsers: parse_or(&lookup, "MAX_BROWSERS", 5),
            max_pages_per_browser: parse_or(&lookup, "MAX_PAGES_PER_BROWSER", 10),
            acquisition_timeout: secs_or(&lookup, "ACQUISITION_TIMEOUT", 30),
            health_check_interval: secs_or(&lookup, "HEALTH_CHECK_INTERVAL", 30),
            ..PoolConfig::default()
        };
        pool.min_browsers = pool.min_browsers.min(pool.max_browsers);
        if let Some(strategy) = lookup("SCALING_STRATEGY") {
            match strategy.parse::<ScalingStrategy>() {
                Ok(preset) => pool.scaling = ScalingConfig::preset(preset),
                Err(()) => warn!(value = %strategy, "unknown SCALING_STRATEGY, using balanced"),
            }
        }

        let pages = PageConfig {
            idle_timeout: secs_or(&lookup, "IDLE_TIMEOUT", 30 * 60),
            ..PageConfig::default()
        };

        let store = StoreConfig {
            strategy: lookup("SESSION_STORE")
                .and_then(|raw| match raw.parse::<StoreStrategy>() {
                    Ok(strategy) => Some(strategy),
                    Err(()) => {
                        warn!(value = %raw, "unknown SESSION_STORE strategy, using auto");
                        None
                    }
                })
                .unwrap_or_default(),
            database: database_from_lookup(&lookup),
            session_ttl: secs_or(&lookup, "SESSION_TTL", 24 * 60 * 60),
            ..StoreConfig::default()
        };

        Ok(Self {
            environment,
            log_level: lookup("LOG_LEVEL"),
            jwt_secret,
            store,
            pool,
            pages,
            rate_limit: RateLimitConfig {
                per_minute: parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 120),
                ..RateLimitConfig::default()
            },
        })
    }

    /// The JWT secret, falling back to a fixed development-only value.
    pub fn jwt_secret_or_dev(&self) -> &str {
        self.jwt_secret
            .as_deref()
            .unwrap_or("corral-development-secret")
    }
}

fn database_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> DatabaseConfig {
    let defaults = DatabaseConfig::default();
    DatabaseConfig {
        db_type: lookup("DATABASE_TYPE").unwrap_or(defaults.db_type),
        path: lookup("DATABASE_PATH"),
        host: lookup("DATABASE_HOST"),
        port: lookup("DATABASE_PORT").and_then(|raw| raw.parse().ok()),
        name: lookup("DATABASE_NAME"),
        user: lookup("DATABASE_USER"),
        password: lookup("DATABASE_PASSWORD"),
        ssl: lookup("DATABASE_SSL").is_some_and(|raw| raw == "true" || raw == "1"),
        pool_min: parse_or(lookup, "DATABASE_POOL_MIN", defaults.pool_min),
        pool_max: parse_or(lookup, "DATABASE_POOL_MAX", defaults.pool_max),
    }
}

/// Parse an environment value, warning and falling back on garbage.
fn parse_or<T: std::str::FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid numeric value, using default");
            default
        }),
    }
}

fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(parse_or(lookup, key, default_secs))
}

#[cfg(test)]
mod tests;

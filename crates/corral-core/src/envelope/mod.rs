//! # Canonical Error Envelope
//!
//! Every failure in the control plane is expressed as one [`ErrorEnvelope`]
//! regardless of which front-end carried the request. The envelope is
//! projected onto the wire per protocol by [`projection`], and recorded for
//! threshold and correlation analysis by [`tracker`].

pub mod projection;
pub mod tracker;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable error codes used across all four protocols.
pub mod codes {
    /// Credential missing or malformed.
    pub const AUTH_MISSING_CREDENTIAL: &str = "AUTH_MISSING_CREDENTIAL";
    /// Token signature or expiry check failed.
    pub const AUTH_INVALID_TOKEN: &str = "AUTH_INVALID_TOKEN";
    /// API key unknown or revoked.
    pub const AUTH_INVALID_API_KEY: &str = "AUTH_INVALID_API_KEY";
    /// Session not found or expired.
    pub const AUTH_INVALID_SESSION: &str = "AUTH_INVALID_SESSION";
    /// Principal does not own the target resource.
    pub const AUTH_RESOURCE_ACCESS_DENIED: &str = "AUTH_RESOURCE_ACCESS_DENIED";
    /// Principal lacks a required role.
    pub const AUTH_INSUFFICIENT_ROLE: &str = "AUTH_INSUFFICIENT_ROLE";
    /// Request payload failed schema or range validation.
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    /// Script rejected by the sanitizer.
    pub const VALIDATION_UNSAFE_SCRIPT: &str = "VALIDATION_UNSAFE_SCRIPT";
    /// URL rejected by scheme or allow-list rules.
    pub const VALIDATION_UNSAFE_URL: &str = "VALIDATION_UNSAFE_URL";
    /// File upload rejected.
    pub const VALIDATION_UNSAFE_FILE: &str = "VALIDATION_UNSAFE_FILE";
    /// Unknown action type.
    pub const VALIDATION_UNKNOWN_ACTION: &str = "VALIDATION_UNKNOWN_ACTION";
    /// CSRF check failed.
    pub const SECURITY_CSRF_REJECTED: &str = "SECURITY_CSRF_REJECTED";
    /// Per-principal rate limit exceeded.
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    /// Pool saturated and the acquisition deadline elapsed.
    pub const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";
    /// Requested resource does not exist.
    pub const RESOURCE_NOT_FOUND: &str = "RESOURCE_NOT_FOUND";
    /// Engine call rejected by an open circuit breaker.
    pub const BROWSER_UNAVAILABLE: &str = "BROWSER_UNAVAILABLE";
    /// Engine reported a failure executing the action.
    pub const BROWSER_ACTION_FAILED: &str = "BROWSER_ACTION_FAILED";
    /// Action exceeded its deadline.
    pub const ACTION_TIMEOUT: &str = "ACTION_TIMEOUT";
    /// Navigation completed with an error status.
    pub const NAVIGATION_FAILED: &str = "NAVIGATION_FAILED";
    /// Request cancelled by the caller.
    pub const REQUEST_CANCELLED: &str = "REQUEST_CANCELLED";
    /// Endpoint exists but is not implemented.
    pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";
    /// Control plane is shutting down.
    pub const SHUTTING_DOWN: &str = "SHUTTING_DOWN";
    /// Unexpected internal failure.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Failure category; drives the HTTP status taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credential could not be verified.
    Authentication,
    /// Principal is not allowed to touch the resource.
    Authorization,
    /// Request payload is malformed or unsafe.
    Validation,
    /// Upstream network failure.
    Network,
    /// Browser engine failure.
    Browser,
    /// Session missing or expired.
    Session,
    /// Server-side configuration problem.
    Configuration,
    /// Domain rule violated.
    BusinessLogic,
    /// Unexpected internal failure.
    System,
    /// Security policy violation.
    Security,
    /// Latency or capacity degradation.
    Performance,
    /// Admission rate limit hit.
    RateLimit,
    /// Resource missing, conflicted or exhausted.
    Resource,
}

impl ErrorCategory {
    /// Default HTTP status for the category.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Authentication | Self::Session => 401,
            Self::Authorization | Self::Security => 403,
            Self::Validation | Self::BusinessLogic => 400,
            Self::RateLimit => 429,
            Self::Resource => 404,
            Self::Browser => 503,
            Self::Network => 502,
            Self::Performance => 503,
            Self::Configuration | Self::System => 500,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Browser => "browser",
            Self::Session => "session",
            Self::Configuration => "configuration",
            Self::BusinessLogic => "business_logic",
            Self::System => "system",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::RateLimit => "rate_limit",
            Self::Resource => "resource",
        })
    }
}

/// Failure severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Routine, expected failure (bad input, missing resource).
    Low,
    /// Degraded behavior worth watching.
    Medium,
    /// Failure of a subsystem.
    High,
    /// Requires immediate operator attention.
    Critical,
}

/// Machine-readable hints attached to an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySuggestion {
    /// Back off and retry the same request.
    WaitAndRetry,
    /// Re-authenticate or fix the credential.
    CheckCredentials,
    /// Fix the request payload.
    CheckRequestFormat,
    /// Confirm the referenced resource exists and is yours.
    VerifyResourceExists,
    /// Send fewer requests.
    ReduceRequestRate,
    /// Escalate to the operator.
    ContactSupport,
}

/// Retry guidance surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryAdvice {
    /// Whether retrying can help at all.
    pub retryable: bool,
    /// Suggested maximum attempts.
    pub max_attempts: u32,
    /// Suggested initial delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Suggested backoff multiplier.
    pub backoff_multiplier: f64,
    /// When the limit resets (rate limiting only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl RetryAdvice {
    /// Standard advice for transient failures.
    pub fn transient() -> Self {
        Self {
            retryable: true,
            max_attempts: 3,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            reset_at: None,
        }
    }
}

/// Maximum recovery suggestions carried on the wire.
const MAX_SUGGESTIONS: usize = 3;

/// The canonical error model shared by all four front-ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Stable machine-readable code (see [`codes`]).
    pub code: String,
    /// Failure category.
    pub category: ErrorCategory,
    /// Failure severity.
    pub severity: ErrorSeverity,
    /// Human-readable message safe to show end users.
    pub user_message: String,
    /// Structured diagnostic details; omitted on the wire when sensitive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Up to three recovery suggestions.
    pub recovery_suggestions: Vec<RecoverySuggestion>,
    /// Retry guidance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryAdvice>,
    /// Documentation links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub help_links: Vec<String>,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// Request id the failure belongs to.
    pub request_id: String,
    /// Correlation group ids linking related failures.
    #[serde(default)]
    pub correlation_ids: Vec<String>,
    /// Free-form tags (operation, resource, protocol).
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Suppress `details` in wire projections.
    #[serde(default)]
    pub contains_sensitive_data: bool,
    /// Whether the failure is a programmer error worth reporting.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub should_report: bool,
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.category, self.code, self.user_message)
    }
}

impl std::error::Error for ErrorEnvelope {}

impl ErrorEnvelope {
    /// Start building an envelope from the identity-bearing fields.
    pub fn new(
        code: impl Into<String>,
        category: ErrorCategory,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            category,
            severity: ErrorSeverity::Low,
            user_message: user_message.into(),
            details: None,
            recovery_suggestions: Vec::new(),
            retry_config: None,
            help_links: Vec::new(),
            timestamp: Utc::now(),
            request_id: String::new(),
            correlation_ids: Vec::new(),
            tags: HashMap::new(),
            contains_sensitive_data: false,
            should_report: false,
        }
    }

    /// Set the severity.
    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach structured details.
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Append a recovery suggestion (capped at three).
    pub fn suggest(mut self, suggestion: RecoverySuggestion) -> Self {
        if self.recovery_suggestions.len() < MAX_SUGGESTIONS
            && !self.recovery_suggestions.contains(&suggestion)
        {
            self.recovery_suggestions.push(suggestion);
        }
        self
    }

    /// Attach retry guidance.
    pub fn retry(mut self, advice: RetryAdvice) -> Self {
        self.retry_config = Some(advice);
        self
    }

    /// Set the owning request id.
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Add a free-form tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Mark the details as sensitive, suppressing them on the wire.
    pub fn sensitive(mut self) -> Self {
        self.contains_sensitive_data = true;
        self
    }

    /// Mark as a programmer error that should be reported.
    pub fn report(mut self) -> Self {
        self.should_report = true;
        self
    }

    /// HTTP status for this envelope.
    ///
    /// Mostly category-driven, with code-level refinements where the
    /// taxonomy needs them (exhaustion is 429, conflicts are 409).
    pub fn status_code(&self) -> u16 {
        match self.code.as_str() {
            codes::RESOURCE_EXHAUSTED => 429,
            codes::REQUEST_CANCELLED => 499,
            codes::NOT_IMPLEMENTED => 501,
            codes::SHUTTING_DOWN | codes::BROWSER_UNAVAILABLE => 503,
            codes::ACTION_TIMEOUT => 504,
            _ => self.category.status_code(),
        }
    }

    /// Copy of the envelope with sensitive details stripped, as projected
    /// onto any wire format.
    pub fn wire_safe(&self) -> Self {
        let mut safe = self.clone();
        if safe.contains_sensitive_data {
            safe.details = None;
        }
        safe
    }

    /// The operation tag, when set.
    pub fn operation(&self) -> Option<&str> {
        self.tags.get("operation").map(String::as_str)
    }

    /// The resource tag, when set.
    pub fn resource(&self) -> Option<&str> {
        self.tags.get("resource").map(String::as_str)
    }

    /// A generic internal-error envelope for programmer errors.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            ErrorCategory::System,
            "An unexpected internal error occurred",
        )
        .severity(ErrorSeverity::High)
        .details(serde_json::json!({ "detail": detail.into() }))
        .sensitive()
        .report()
        .suggest(RecoverySuggestion::ContactSupport)
    }
}

#[cfg(test)]
mod tests;

//! Audit event emission.
//!
//! Audit events go to the `audit` tracing target with structured fields,
//! and to an in-process broadcast channel so tests and pluggable sinks can
//! observe them. Sensitive header values are never included.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use super::RequestOrigin;

/// Channel capacity for audit subscribers.
const AUDIT_CHANNEL_SIZE: usize = 256;

/// Kinds of audit events the control plane emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    /// A credential was accepted.
    AccessGranted,
    /// A credential or ownership check was rejected.
    AccessDenied,
    /// An action payload failed validation.
    ValidationFailure,
    /// An action completed.
    ActionExecuted,
    /// An action failed at execution time.
    ActionFailed,
    /// A session was explicitly destroyed.
    SessionRevoked,
}

impl AuditKind {
    /// Stable event name.
    pub fn name(self) -> &'static str {
        match self {
            Self::AccessGranted => "ACCESS_GRANTED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::ActionExecuted => "ACTION_EXECUTED",
            Self::ActionFailed => "ACTION_FAILED",
            Self::SessionRevoked => "SESSION_REVOKED",
        }
    }
}

/// A recorded audit event.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event kind.
    pub kind: AuditKind,
    /// Resource the event refers to.
    pub resource: String,
    /// Operation attempted on the resource.
    pub action: String,
    /// Outcome ("success" / "failure").
    pub result: &'static str,
    /// Reason for denial or failure, when applicable.
    pub reason: Option<String>,
    /// Remote IP, when known.
    pub ip: Option<String>,
    /// User agent, when known.
    pub user_agent: Option<String>,
    /// Protocol method.
    pub method: String,
    /// When the event occurred.
    pub at: DateTime<Utc>,
}

/// Audit sink shared across subsystems.
#[derive(Debug)]
pub struct AuditLog {
    tx: broadcast::Sender<AuditEvent>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// Create a log with no subscribers yet.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(AUDIT_CHANNEL_SIZE);
        Self { tx }
    }

    /// Subscribe to audit events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.tx.subscribe()
    }

    /// Record an event.
    pub fn record(
        &self,
        kind: AuditKind,
        resource: impl Into<String>,
        action: impl Into<String>,
        result: &'static str,
        reason: Option<String>,
        origin: &RequestOrigin,
    ) {
        let event = AuditEvent {
            kind,
            resource: resource.into(),
            action: action.into(),
            result,
            reason,
            ip: origin.ip.clone(),
            user_agent: origin.user_agent.clone(),
            method: origin.method.clone(),
            at: Utc::now(),
        };
        info!(
            target: "audit",
            event = event.kind.name(),
            resource = %event.resource,
            action = %event.action,
            result = %event.result,
            reason = event.reason.as_deref().unwrap_or(""),
            ip = event.ip.as_deref().unwrap_or(""),
            method = %event.method,
            "audit"
        );
        let _ = self.tx.send(event);
    }
}

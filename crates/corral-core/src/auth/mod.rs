//! Authentication: credentials, principals and the auth gate.
//!
//! The gate turns a raw credential into a [`Principal`] and emits audit
//! events for every decision. Credential *verification mechanisms* live at
//! the edges (a password verifier and an API-key store are injected); the
//! gate consumes their outcomes and owns session handling.

pub mod apikey;
pub mod audit;
pub mod gate;
pub mod token;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::{ErrorCategory, ErrorEnvelope, ErrorSeverity, RecoverySuggestion, codes};
use crate::store::StoreError;

/// A raw credential as extracted from the wire.
#[derive(Debug, Clone)]
pub enum Credential {
    /// `Authorization: Bearer ...` token.
    Bearer(String),
    /// `X-API-Key` header value.
    ApiKey(String),
    /// Direct session id (WebSocket and MCP only).
    SessionId(String),
}

/// The authenticated identity attached to an invocation.
///
/// Immutable for the duration of the invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// User id.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Assigned roles.
    pub roles: Vec<String>,
    /// The session this principal was derived from.
    pub session_id: String,
}

impl Principal {
    /// Whether the principal carries the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the principal is an admin.
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}

/// Transport-level facts about the request, used in audit events.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    /// Remote IP, when known.
    pub ip: Option<String>,
    /// User-Agent header, when present.
    pub user_agent: Option<String>,
    /// Protocol method or HTTP verb.
    pub method: String,
}

/// Authentication and authorization failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("no credential provided")]
    MissingCredential,
    /// The bearer token failed verification.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The API key is unknown or revoked.
    #[error("invalid API key")]
    InvalidApiKey,
    /// The session does not exist or has expired.
    #[error("invalid or expired session")]
    InvalidSession,
    /// The principal does not own the target resource.
    #[error("access to {resource} denied")]
    AccessDenied {
        /// The resource that was protected.
        resource: String,
    },
    /// The principal lacks a required role.
    #[error("role {required} required")]
    InsufficientRole {
        /// The missing role.
        required: String,
    },
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Project onto the canonical envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::MissingCredential => ErrorEnvelope::new(
                codes::AUTH_MISSING_CREDENTIAL,
                ErrorCategory::Authentication,
                "Authentication required",
            )
            .suggest(RecoverySuggestion::CheckCredentials),
            Self::InvalidToken(_) => ErrorEnvelope::new(
                codes::AUTH_INVALID_TOKEN,
                ErrorCategory::Authentication,
                "The provided token is invalid or expired",
            )
            .suggest(RecoverySuggestion::CheckCredentials),
            Self::InvalidApiKey => ErrorEnvelope::new(
                codes::AUTH_INVALID_API_KEY,
                ErrorCategory::Authentication,
                "The provided API key is not valid",
            )
            .suggest(RecoverySuggestion::CheckCredentials),
            Self::InvalidSession => ErrorEnvelope::new(
                codes::AUTH_INVALID_SESSION,
                ErrorCategory::Session,
                "The session is invalid or has expired",
            )
            .suggest(RecoverySuggestion::CheckCredentials),
            Self::AccessDenied { resource } => ErrorEnvelope::new(
                codes::AUTH_RESOURCE_ACCESS_DENIED,
                ErrorCategory::Authorization,
                "You do not have access to this resource",
            )
            .severity(ErrorSeverity::Medium)
            .tag("resource", resource.clone())
            .suggest(RecoverySuggestion::VerifyResourceExists),
            Self::InsufficientRole { required } => ErrorEnvelope::new(
                codes::AUTH_INSUFFICIENT_ROLE,
                ErrorCategory::Authorization,
                format!("The {required} role is required for this operation"),
            )
            .severity(ErrorSeverity::Medium),
            Self::Store(err) => ErrorEnvelope::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests;

//! Session and context stores.
//!
//! The stores are the single source of truth for the ownership chain:
//! subsystems pass ids around and look records up on demand, so there are
//! no cyclic references between sessions, contexts and pages. All
//! implementations must be safe under concurrent access and expose only
//! atomic operations.

pub mod memory;
pub mod strategy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),
    /// The backend is not reachable.
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// Payload of a session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Owning user id.
    pub user_id: String,
    /// Display name of the principal.
    pub username: String,
    /// Assigned roles ("admin", "user", "guest").
    pub roles: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiry time; must be after `created_at`.
    pub expires_at: DateTime<Utc>,
    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// An authenticated principal binding with TTL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id.
    pub id: String,
    /// Session payload.
    pub data: SessionData,
    /// Last time an authenticated invocation touched the session.
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    /// Create a session for a user with the given TTL.
    pub fn issue(
        user_id: impl Into<String>,
        username: impl Into<String>,
        roles: Vec<String>,
        ttl: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        Self {
            id: Uuid::new_v4().to_string(),
            data: SessionData {
                user_id: user_id.into(),
                username: username.into(),
                roles,
                created_at: now,
                expires_at: now + ttl,
                metadata: None,
            },
            last_accessed_at: now,
        }
    }

    /// Whether the session expired at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.data.expires_at < now
    }

    /// Whether the session is expired now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextStatus {
    /// Context accepts page creation and actions.
    #[default]
    Active,
    /// Context is destroyed; kept only transiently.
    Closed,
}

/// A per-session container for pages and per-context configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Context id.
    pub id: String,
    /// Owning session id. Must reference an existing session whose
    /// user matches `user_id`.
    pub session_id: String,
    /// Display name.
    pub name: String,
    /// Context flavor (free-form; "browser" by default).
    #[serde(rename = "type")]
    pub context_type: String,
    /// Per-context configuration (viewport, user agent, locale, headers).
    pub config: Value,
    /// Lifecycle state.
    pub status: ContextStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Owning user id, denormalized for the ownership check.
    pub user_id: String,
}

impl Context {
    /// Create an active context owned by the given session.
    pub fn create(
        session: &Session,
        name: impl Into<String>,
        config: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            name: name.into(),
            context_type: "browser".to_string(),
            config,
            status: ContextStatus::Active,
            created_at: now,
            updated_at: now,
            user_id: session.data.user_id.clone(),
        }
    }

    /// Whether this context is owned by the given session.
    pub fn owned_by(&self, session: &Session) -> bool {
        self.session_id == session.id && self.user_id == session.data.user_id
    }
}

/// Persistent store of sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session.
    async fn create(&self, session: Session) -> Result<(), StoreError>;
    /// Fetch a session by id. Expired sessions are treated as absent.
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;
    /// All sessions for a user.
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError>;
    /// Replace an existing session.
    async fn update(&self, session: Session) -> Result<(), StoreError>;
    /// Atomically update `last_accessed_at` without extending expiry.
    ///
    /// Returns false when the session does not exist.
    async fn touch(&self, id: &str) -> Result<bool, StoreError>;
    /// Delete a session. Returns false when it did not exist.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
    /// Remove sessions whose expiry has passed; returns how many.
    async fn delete_expired(&self) -> Result<usize, StoreError>;
    /// Remove everything.
    async fn clear(&self) -> Result<(), StoreError>;
    /// Whether a live session with this id exists.
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;
}

/// Persistent store of contexts.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Insert a new context.
    async fn create(&self, context: Context) -> Result<(), StoreError>;
    /// Fetch a context by id.
    async fn get(&self, id: &str) -> Result<Option<Context>, StoreError>;
    /// All contexts owned by a user.
    async fn get_by_user(&self, user_id: &str) -> Result<Vec<Context>, StoreError>;
    /// All contexts owned by a session.
    async fn get_by_session(&self, session_id: &str) -> Result<Vec<Context>, StoreError>;
    /// Replace an existing context, bumping `updated_at`.
    async fn update(&self, context: Context) -> Result<(), StoreError>;
    /// Atomically bump `updated_at`. Returns false when the context does
    /// not exist.
    async fn touch(&self, id: &str) -> Result<bool, StoreError>;
    /// Delete a context. Returns false when it did not exist.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
    /// Delete every context owned by a session; returns how many.
    async fn delete_by_session(&self, session_id: &str) -> Result<usize, StoreError>;
    /// Remove everything.
    async fn clear(&self) -> Result<(), StoreError>;
    /// Whether a context with this id exists.
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests;

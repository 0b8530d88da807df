//! In-memory store implementations.
//!
//! The default backend, and the fallback when a distributed backend is
//! configured but unavailable. Suitable for single-process deployments and
//! all tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Context, ContextStore, Session, SessionStore, StoreError};

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        // Lazy expiry: an expired record is removed on first sight.
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(session) if session.is_expired() => {
                sessions.remove(id);
                Ok(None)
            }
            Some(session) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn get_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.data.user_id == user_id && !s.is_expired())
            .cloned()
            .collect())
    }

    async fn update(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.id) {
            return Err(StoreError::Backend(format!(
                "session {} does not exist",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn touch(&self, id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if !session.is_expired() => {
                session.last_accessed_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(id).is_some())
    }

    async fn delete_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        Ok(before - sessions.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.sessions.write().await.clear();
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }
}

/// In-memory context store.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    contexts: RwLock<HashMap<String, Context>>,
}

impl MemoryContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn create(&self, context: Context) -> Result<(), StoreError> {
        let mut contexts = self.contexts.write().await;
        contexts.insert(context.id.clone(), context);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Context>, StoreError> {
        let contexts = self.contexts.read().await;
        Ok(contexts.get(id).cloned())
    }

    async fn get_by_user(&self, user_id: &str) -> Result<Vec<Context>, StoreError> {
        let contexts = self.contexts.read().await;
        Ok(contexts
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Vec<Context>, StoreError> {
        let contexts = self.contexts.read().await;
        Ok(contexts
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn update(&self, mut context: Context) -> Result<(), StoreError> {
        let mut contexts = self.contexts.write().await;
        if !contexts.contains_key(&context.id) {
            return Err(StoreError::Backend(format!(
                "context {} does not exist",
                context.id
            )));
        }
        context.updated_at = Utc::now();
        contexts.insert(context.id.clone(), context);
        Ok(())
    }

    async fn touch(&self, id: &str) -> Result<bool, StoreError> {
        let mut contexts = self.contexts.write().await;
        match contexts.get_mut(id) {
            Some(context) => {
                context.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut contexts = self.contexts.write().await;
        Ok(contexts.remove(id).is_some())
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<usize, StoreError> {
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        contexts.retain(|_, c| c.session_id != session_id);
        Ok(before - contexts.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.contexts.write().await.clear();
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let contexts = self.contexts.read().await;
        Ok(contexts.contains_key(id))
    }
}

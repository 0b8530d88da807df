//! API-key store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::StoreError;

/// A provisioned API key.
#[derive(Debug, Clone)]
pub struct ApiKeyData {
    /// Key id (not the secret).
    pub id: String,
    /// Human-readable key name.
    pub name: String,
    /// Owning user id.
    pub user_id: String,
    /// Roles granted to callers of this key.
    pub roles: Vec<String>,
    /// When the key was created.
    pub created_at: DateTime<Utc>,
    /// Whether the key has been revoked.
    pub revoked: bool,
}

/// Lookup of API keys by their secret value.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Resolve a raw key value; revoked keys resolve to `None`.
    async fn lookup(&self, raw_key: &str) -> Result<Option<ApiKeyData>, StoreError>;
    /// Insert a key.
    async fn insert(&self, raw_key: &str, data: ApiKeyData) -> Result<(), StoreError>;
    /// Revoke a key by id. Returns false when no key matched.
    async fn revoke(&self, key_id: &str) -> Result<bool, StoreError>;
}

/// In-memory API-key store.
#[derive(Debug, Default)]
pub struct MemoryApiKeyStore {
    keys: RwLock<HashMap<String, ApiKeyData>>,
}

impl MemoryApiKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn lookup(&self, raw_key: &str) -> Result<Option<ApiKeyData>, StoreError> {
        let keys = self.keys.read().await;
        Ok(keys.get(raw_key).filter(|k| !k.revoked).cloned())
    }

    async fn insert(&self, raw_key: &str, data: ApiKeyData) -> Result<(), StoreError> {
        let mut keys = self.keys.write().await;
        keys.insert(raw_key.to_string(), data);
        Ok(())
    }

    async fn revoke(&self, key_id: &str) -> Result<bool, StoreError> {
        let mut keys = self.keys.write().await;
        let mut revoked = false;
        for data in keys.values_mut() {
            if data.id == key_id {
                data.revoked = true;
                revoked = true;
            }
        }
        Ok(revoked)
    }
}

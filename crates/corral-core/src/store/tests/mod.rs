use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use super::memory::{MemoryContextStore, MemorySessionStore};
use super::strategy::{self, StoreStrategy};
use super::*;
use crate::config::StoreConfig;

fn session(ttl: Duration) -> Session {
    Session::issue("user-1", "alice", vec!["user".to_string()], ttl)
}

#[tokio::test]
async fn create_get_delete_round_trip() {
    let store = MemorySessionStore::new();
    let s = session(Duration::from_secs(60));
    let id = s.id.clone();

    store.create(s.clone()).await.unwrap();
    assert!(store.exists(&id).await.unwrap());
    assert_eq!(store.get(&id).await.unwrap().unwrap().data.username, "alice");
    assert!(store.delete(&id).await.unwrap());
    assert!(!store.exists(&id).await.unwrap());
    assert!(!store.delete(&id).await.unwrap());
}

#[tokio::test]
async fn expired_sessions_are_invisible_and_swept() {
    let store = MemorySessionStore::new();
    let mut expired = session(Duration::from_secs(60));
    expired.data.expires_at = Utc::now() - chrono::Duration::seconds(5);
    let expired_id = expired.id.clone();
    let live = session(Duration::from_secs(60));

    store.create(expired).await.unwrap();
    store.create(live.clone()).await.unwrap();

    // Lazy expiry on get.
    assert!(store.get(&expired_id).await.unwrap().is_none());

    // And the sweeper removes nothing further for that id.
    assert_eq!(store.delete_expired().await.unwrap(), 0);
    assert!(store.get(&live.id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_expired_counts_removals() {
    let store = MemorySessionStore::new();
    for _ in 0..3 {
        let mut s = session(Duration::from_secs(60));
        s.data.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.create(s).await.unwrap();
    }
    store.create(session(Duration::from_secs(60))).await.unwrap();
    assert_eq!(store.delete_expired().await.unwrap(), 3);
}

#[tokio::test]
async fn touch_updates_access_time_without_extending_expiry() {
    let store = MemorySessionStore::new();
    let s = session(Duration::from_secs(60));
    let id = s.id.clone();
    let original_expiry = s.data.expires_at;
    let original_access = s.last_accessed_at;
    store.create(s).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(store.touch(&id).await.unwrap());

    let touched = store.get(&id).await.unwrap().unwrap();
    assert!(touched.last_accessed_at > original_access);
    assert_eq!(touched.data.expires_at, original_expiry);

    assert!(!store.touch("missing").await.unwrap());
}

#[tokio::test]
async fn get_by_user_filters() {
    let store = MemorySessionStore::new();
    store.create(session(Duration::from_secs(60))).await.unwrap();
    store.create(session(Duration::from_secs(60))).await.unwrap();
    let other = Session::issue("user-2", "bob", vec!["user".to_string()], Duration::from_secs(60));
    store.create(other).await.unwrap();

    assert_eq!(store.get_by_user("user-1").await.unwrap().len(), 2);
    assert_eq!(store.get_by_user("user-2").await.unwrap().len(), 1);
    assert!(store.get_by_user("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_rejects_missing_session() {
    let store = MemorySessionStore::new();
    let err = store.update(session(Duration::from_secs(60))).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn context_ownership_and_cascade() {
    let sessions = MemorySessionStore::new();
    let contexts = MemoryContextStore::new();
    let s = session(Duration::from_secs(60));
    sessions.create(s.clone()).await.unwrap();

    let c1 = Context::create(&s, "scraping", json!({"viewport": {"width": 1280}}));
    let c2 = Context::create(&s, "testing", json!({}));
    assert!(c1.owned_by(&s));
    contexts.create(c1.clone()).await.unwrap();
    contexts.create(c2).await.unwrap();

    assert_eq!(contexts.get_by_session(&s.id).await.unwrap().len(), 2);
    assert_eq!(contexts.get_by_user("user-1").await.unwrap().len(), 2);

    // Destroying the session destroys its contexts.
    assert_eq!(contexts.delete_by_session(&s.id).await.unwrap(), 2);
    assert!(!contexts.exists(&c1.id).await.unwrap());
}

#[tokio::test]
async fn context_touch_bumps_updated_at() {
    let contexts = MemoryContextStore::new();
    let s = session(Duration::from_secs(60));
    let context = Context::create(&s, "ctx", json!({}));
    let id = context.id.clone();
    let before = context.updated_at;
    contexts.create(context).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(contexts.touch(&id).await.unwrap());
    assert!(contexts.get(&id).await.unwrap().unwrap().updated_at > before);
    assert!(!contexts.touch("missing").await.unwrap());
}

#[tokio::test]
async fn context_not_owned_by_other_session() {
    let s = session(Duration::from_secs(60));
    let other = Session::issue("user-2", "bob", vec!["user".to_string()], Duration::from_secs(60));
    let context = Context::create(&s, "ctx", json!({}));
    assert!(!context.owned_by(&other));
}

#[test]
fn strategy_parses() {
    assert_eq!("redis".parse::<StoreStrategy>().unwrap(), StoreStrategy::Redis);
    assert_eq!("MEMORY".parse::<StoreStrategy>().unwrap(), StoreStrategy::Memory);
    assert_eq!("auto".parse::<StoreStrategy>().unwrap(), StoreStrategy::Auto);
    assert!("mongo".parse::<StoreStrategy>().is_err());
}

#[test]
fn auto_strategy_records_fallback() {
    let config = StoreConfig::default();
    let selected = strategy::select(&config);
    assert_eq!(selected.backend, "memory");
    assert!(selected.fallback_reason.is_some());
}

#[test]
fn memory_strategy_has_no_fallback_reason() {
    let config = StoreConfig {
        strategy: StoreStrategy::Memory,
        ..StoreConfig::default()
    };
    let selected = strategy::select(&config);
    assert_eq!(selected.backend, "memory");
    assert!(selected.fallback_reason.is_none());
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use super::*;
use crate::auth::Principal;
use crate::config::{PageConfig, PoolConfig};
use crate::engine::mock::MockEngine;
use crate::engine::{LaunchOptions, LoadPhase, PageOptions};
use crate::store::memory::{MemoryContextStore, MemorySessionStore};
use crate::store::{Context, Session};

struct Fixture {
    manager: Arc<PageManager>,
    sessions: Arc<MemorySessionStore>,
    contexts: Arc<MemoryContextStore>,
    engine: Arc<MockEngine>,
    principal: Principal,
    context_id: String,
}

async fn fixture() -> Fixture {
    fixture_with_config(PageConfig::default()).await
}

async fn fixture_with_config(config: PageConfig) -> Fixture {
    let sessions = Arc::new(MemorySessionStore::new());
    let contexts = Arc::new(MemoryContextStore::new());
    let engine = Arc::new(MockEngine::new());
    let pool = crate::pool::BrowserPool::new(
        PoolConfig {
            min_browsers: 0,
            max_browsers: 2,
            acquisition_timeout: Duration::from_millis(200),
            ..PoolConfig::default()
        },
        LaunchOptions::default(),
        engine.clone(),
    );

    let session = Session::issue("user-1", "alice", vec!["user".to_string()], Duration::from_secs(3600));
    sessions.create(session.clone()).await.unwrap();
    let context = Context::create(&session, "ctx", json!({}));
    contexts.create(context.clone()).await.unwrap();

    let principal = Principal {
        user_id: "user-1".to_string(),
        username: "alice".to_string(),
        roles: vec!["user".to_string()],
        session_id: session.id.clone(),
    };

    Fixture {
        manager: Arc::new(PageManager::new(
            sessions.clone(),
            contexts.clone(),
            pool,
            config,
        )),
        sessions,
        contexts,
        engine,
        principal,
        context_id: context.id,
    }
}

#[tokio::test]
async fn create_and_get_page() {
    let f = fixture().await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();
    assert_eq!(info.state, PageState::Active);
    assert_eq!(info.context_id, f.context_id);
    assert_eq!(info.session_id, f.principal.session_id);

    let fetched = f.manager.get(&f.principal, &info.id).await.unwrap();
    assert_eq!(fetched.id, info.id);
    assert_eq!(f.manager.page_count().await, 1);
}

#[tokio::test]
async fn create_page_rejects_foreign_context() {
    let f = fixture().await;
    let other = Session::issue("user-2", "bob", vec!["user".to_string()], Duration::from_secs(3600));
    f.sessions.create(other.clone()).await.unwrap();
    let foreign_context = Context::create(&other, "theirs", json!({}));
    f.contexts.create(foreign_context.clone()).await.unwrap();

    let err = f
        .manager
        .create_page(&f.principal, &foreign_context.id, PageOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PageError::OwnershipViolation));
}

#[tokio::test]
async fn resolve_rejects_principal_without_session() {
    let f = fixture().await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    let ghost = Principal {
        user_id: "user-1".to_string(),
        username: "alice".to_string(),
        roles: vec![],
        session_id: "missing".to_string(),
    };
    let err = f.manager.resolve(&ghost, &info.id).await.unwrap_err();
    assert!(matches!(err, PageError::SessionInvalid));
}

#[tokio::test]
async fn resolve_rejects_other_users_page() {
    let f = fixture().await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    let other = Session::issue("user-2", "bob", vec!["user".to_string()], Duration::from_secs(3600));
    f.sessions.create(other.clone()).await.unwrap();
    let intruder = Principal {
        user_id: "user-2".to_string(),
        username: "bob".to_string(),
        roles: vec![],
        session_id: other.id,
    };
    let err = f.manager.resolve(&intruder, &info.id).await.unwrap_err();
    assert!(matches!(err, PageError::OwnershipViolation));

    let envelope = err.to_envelope();
    assert_eq!(envelope.code, crate::envelope::codes::AUTH_RESOURCE_ACCESS_DENIED);
    assert_eq!(envelope.status_code(), 403);
}

#[tokio::test]
async fn navigate_updates_url_and_history() {
    let f = fixture().await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    let outcome = f
        .manager
        .navigate(
            &f.principal,
            &info.id,
            "https://example.com",
            LoadPhase::Load,
            Duration::from_secs(30),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.final_url, "https://example.com");

    let fetched = f.manager.get(&f.principal, &info.id).await.unwrap();
    assert_eq!(fetched.url, "https://example.com");
    assert!(
        fetched
            .navigation_history
            .contains(&"https://example.com".to_string())
    );
    assert_eq!(fetched.state, PageState::Active);
}

#[tokio::test]
async fn navigation_failure_increments_error_count() {
    let f = fixture().await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();
    f.engine.fail_next_navigations(1);

    let err = f
        .manager
        .navigate(
            &f.principal,
            &info.id,
            "https://example.com",
            LoadPhase::Load,
            Duration::from_secs(30),
        )
        .await;
    assert!(err.is_err());

    let fetched = f.manager.get(&f.principal, &info.id).await.unwrap();
    assert_eq!(fetched.error_count, 1);
}

#[tokio::test]
async fn history_is_capped() {
    let config = PageConfig {
        history_cap: 3,
        ..PageConfig::default()
    };
    let f = fixture_with_config(config).await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    for i in 0..5 {
        f.manager
            .navigate(
                &f.principal,
                &info.id,
                &format!("https://example.com/{i}"),
                LoadPhase::Load,
                Duration::from_secs(30),
            )
            .await
            .unwrap();
    }
    let fetched = f.manager.get(&f.principal, &info.id).await.unwrap();
    assert!(fetched.navigation_history.len() <= 3);
    assert_eq!(
        fetched.navigation_history.last().unwrap(),
        "https://example.com/4"
    );
}

#[tokio::test]
async fn close_tombstones_the_page() {
    let f = fixture().await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    f.manager.close(&f.principal, &info.id).await.unwrap();
    assert_eq!(f.manager.page_count().await, 0);
    assert!(f.manager.is_tombstoned(&info.id).await);

    let err = f.manager.get(&f.principal, &info.id).await.unwrap_err();
    assert!(matches!(err, PageError::NotFound(_)));
}

#[tokio::test]
async fn idle_cleanup_skips_navigating_pages() {
    let config = PageConfig {
        idle_timeout: Duration::from_millis(10),
        ..PageConfig::default()
    };
    let f = fixture_with_config(config).await;

    let idle = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();
    let navigating = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    // Backdate both and mark one as navigating.
    {
        let mut state = f.manager.state.lock().await;
        for entry in state.pages.values_mut() {
            entry.info.last_activity_at = Utc::now() - chrono::Duration::seconds(60);
        }
        state
            .pages
            .get_mut(&navigating.id)
            .unwrap()
            .info
            .state = PageState::Navigating;
    }

    let closed = f.manager.cleanup_idle().await;
    assert_eq!(closed, vec![idle.id.clone()]);
    assert_eq!(f.manager.page_count().await, 1);
    assert!(f.manager.is_tombstoned(&idle.id).await);
}

#[tokio::test]
async fn list_by_session_and_context() {
    let f = fixture().await;
    f.manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();
    f.manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    assert_eq!(
        f.manager.list_by_session(&f.principal.session_id).await.len(),
        2
    );
    assert_eq!(f.manager.list_by_context(&f.context_id).await.len(), 2);
    assert!(f.manager.list_by_context("other").await.is_empty());
}

#[tokio::test]
async fn lifecycle_events_update_the_record() {
    let f = fixture().await;
    let info = f
        .manager
        .create_page(&f.principal, &f.context_id, PageOptions::default())
        .await
        .unwrap();

    // Drive the engine page directly; the watcher should mirror the event.
    let mock_page = f.engine.pages().into_iter().next().unwrap();
    use crate::engine::EnginePage as _;
    mock_page
        .goto(
            "https://mirror.example",
            LoadPhase::Load,
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    // Give the watcher task a moment.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fetched = f.manager.get(&f.principal, &info.id).await.unwrap();
    assert_eq!(fetched.url, "https://mirror.example");
}

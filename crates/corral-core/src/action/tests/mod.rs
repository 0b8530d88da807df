use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::executor::ActionExecutor;
use super::retry::RetryPolicy;
use super::*;
use crate::auth::Principal;
use crate::auth::audit::AuditLog;
use crate::config::{PageConfig, PoolConfig};
use crate::engine::mock::MockEngine;
use crate::engine::{LaunchOptions, PageOptions};
use crate::envelope::codes;
use crate::envelope::tracker::ErrorTracker;
use crate::page::{PageManager, PageState};
use crate::store::memory::{MemoryContextStore, MemorySessionStore};
use crate::store::{Context, Session, SessionStore as _, ContextStore as _};

struct Fixture {
    executor: ActionExecutor,
    manager: Arc<PageManager>,
    engine: Arc<MockEngine>,
    principal: Principal,
    page_id: String,
}

async fn fixture() -> Fixture {
    fixture_with_retry(RetryPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..RetryPolicy::default()
    })
    .await
}

async fn fixture_with_retry(retry: RetryPolicy) -> Fixture {
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

    let manager = Arc::new(PageManager::new(
        sessions,
        contexts,
        pool,
        PageConfig::default(),
    ));
    let info = manager
        .create_page(&principal, &context.id, PageOptions::default())
        .await
        .unwrap();

    Fixture {
        executor: ActionExecutor::new(
            manager.clone(),
            retry,
            Arc::new(AuditLog::new()),
            Arc::new(ErrorTracker::default()),
        ),
        manager,
        engine,
        principal,
        page_id: info.id,
    }
}

fn invocation(f: &Fixture, action_type: &str, parameters: serde_json::Value) -> ActionInvocation {
    ActionInvocation {
        action_type: action_type.to_string(),
        page_id: f.page_id.clone(),
        parameters,
        timeout: None,
        principal: f.principal.clone(),
        correlation_id: "corr-1".to_string(),
    }
}

#[tokio::test]
async fn navigate_succeeds_with_2xx() {
    let f = fixture().await;
    let result = f
        .executor
        .execute(invocation(
            &f,
            "navigate",
            json!({"url": "https://example.com", "waitUntil": "networkidle0"}),
        ))
        .await;
    assert!(result.success, "{:?}", result.error);
    let data = result.data.unwrap();
    assert_eq!(data["status"], 200);
    assert_eq!(data["finalUrl"], "https://example.com");

    // The page record mirrors the navigation.
    let info = f.manager.get(&f.principal, &f.page_id).await.unwrap();
    assert_eq!(info.url, "https://example.com");
    assert_eq!(info.state, PageState::Active);
}

#[tokio::test]
async fn navigate_with_error_status_fails() {
    let f = fixture().await;
    f.engine.set_navigation_status(503);
    let result = f
        .executor
        .execute(invocation(&f, "navigate", json!({"url": "https://example.com"})))
        .await;
    assert!(!result.success);
    let envelope = result.error.unwrap();
    assert_eq!(envelope.code, codes::NAVIGATION_FAILED);
}

#[tokio::test]
async fn transient_navigation_failures_are_retried() {
    let f = fixture().await;
    f.engine.fail_next_navigations(2);
    let result = f
        .executor
        .execute(invocation(&f, "navigate", json!({"url": "https://example.com"})))
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.metadata["attempts"], 3);
}

#[tokio::test]
async fn retries_are_bounded_by_max_attempts() {
    let f = fixture().await;
    f.engine.fail_next_navigations(10);
    let result = f
        .executor
        .execute(invocation(&f, "navigate", json!({"url": "https://example.com"})))
        .await;
    assert!(!result.success);
    assert_eq!(result.metadata["attempts"], 3);
}

#[test]
fn retry_classification_distinguishes_cookie_reads() {
    let get = ActionRequest::Cookie {
        op: CookieOp::Get { urls: None },
    };
    assert!(get.is_retryable());

    let set = ActionRequest::Cookie {
        op: CookieOp::Set { cookies: vec![] },
    };
    assert!(!set.is_retryable());
    let delete = ActionRequest::Cookie {
        op: CookieOp::Delete {
            name: "sid".to_string(),
            url: None,
        },
    };
    assert!(!delete.is_retryable());
    let clear = ActionRequest::Cookie { op: CookieOp::Clear };
    assert!(!clear.is_retryable());

    assert!(!ActionRequest::Evaluate {
        script: "1".to_string()
    }
    .is_retryable());
    assert!(ActionRequest::Upload {
        selector: "input".to_string(),
        files: vec![],
    }
    .is_retryable());
    assert!(ActionRequest::Content.is_retryable());
}

#[tokio::test]
async fn evaluate_is_never_retried() {
    let f = fixture().await;
    let result = f
        .executor
        .execute(invocation(&f, "evaluate", json!({"script": "throw 1"})))
        .await;
    assert!(!result.success);
    assert_eq!(result.metadata["attempts"], 1);
}

#[tokio::test]
async fn unsafe_script_is_rejected_without_echo() {
    let f = fixture().await;
    let result = f
        .executor
        .execute(invocation(&f, "evaluate", json!({"script": "eval('2+2')"})))
        .await;
    assert!(!result.success);
    let envelope = result.error.unwrap();
    assert_eq!(envelope.code, codes::VALIDATION_UNSAFE_SCRIPT);
    assert_eq!(envelope.status_code(), 400);
    // Sensitive: the wire form omits details entirely.
    assert!(envelope.wire_safe().details.is_none());

    // The engine was never touched.
    let page = f.engine.pages().into_iter().next().unwrap();
    assert!(page.recorded_actions().is_empty());
}

#[tokio::test]
async fn unknown_action_type_is_a_validation_error() {
    let f = fixture().await;
    let result = f
        .executor
        .execute(invocation(&f, "teleport", json!({})))
        .await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, codes::VALIDATION_UNKNOWN_ACTION);
}

#[tokio::test]
async fn registered_extension_serves_unknown_type() {
    let f = fixture().await;
    f.executor.register_extension(
        "teleport",
        Arc::new(|params, _page| {
            Box::pin(async move { Ok(json!({"where": params["to"], "done": true})) })
        }),
    );
    let result = f
        .executor
        .execute(invocation(&f, "teleport", json!({"to": "mars"})))
        .await;
    assert!(result.success);
    assert_eq!(result.data.unwrap()["where"], "mars");
}

#[tokio::test]
async fn missing_page_is_not_found() {
    let f = fixture().await;
    let mut inv = invocation(&f, "content", json!({}));
    inv.page_id = "page-missing".to_string();
    let result = f.executor.execute(inv).await;
    assert!(!result.success);
    let envelope = result.error.unwrap();
    assert_eq!(envelope.code, codes::RESOURCE_NOT_FOUND);
    assert_eq!(envelope.status_code(), 404);
}

#[tokio::test]
async fn foreign_principal_is_denied() {
    let f = fixture().await;
    let mut inv = invocation(&f, "content", json!({}));
    inv.principal = Principal {
        user_id: "user-9".to_string(),
        username: "mallory".to_string(),
        roles: vec!["user".to_string()],
        session_id: "no-such-session".to_string(),
    };
    let result = f.executor.execute(inv).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().status_code(), 401);
}

#[tokio::test]
async fn click_scrolls_out_of_view_elements() {
    let f = fixture().await;
    f.engine.add_outside_viewport("#below-fold");
    let result = f
        .executor
        .execute(invocation(&f, "click", json!({"selector": "#below-fold"})))
        .await;
    assert!(result.success, "{:?}", result.error);

    let page = f.engine.pages().into_iter().next().unwrap();
    let actions = page.recorded_actions();
    assert!(actions.iter().any(|a| a.starts_with("scroll_into_view")));
    assert!(actions.iter().any(|a| a.starts_with("click")));
}

#[tokio::test]
async fn missing_selector_is_not_found() {
    let f = fixture().await;
    f.engine.add_missing_selector("#ghost");
    let result = f
        .executor
        .execute(invocation(&f, "click", json!({"selector": "#ghost"})))
        .await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, codes::RESOURCE_NOT_FOUND);
}

#[tokio::test]
async fn screenshot_returns_base64() {
    let f = fixture().await;
    let result = f
        .executor
        .execute(invocation(&f, "screenshot", json!({"format": "png"})))
        .await;
    assert!(result.success);
    let data = result.data.unwrap();
    assert_eq!(data["encoding"], "base64");
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(&bytes[1..4], b"PNG");
}

#[tokio::test]
async fn cookie_round_trip_through_executor() {
    let f = fixture().await;
    let set = f
        .executor
        .execute(invocation(
            &f,
            "cookie",
            json!({"operation": "set", "cookies": [{"name": "sid", "value": "42"}]}),
        ))
        .await;
    assert!(set.success);

    let get = f
        .executor
        .execute(invocation(&f, "cookie", json!({"operation": "get"})))
        .await;
    let cookies = get.data.unwrap()["cookies"].as_array().unwrap().clone();
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0]["name"], "sid");

    let clear = f
        .executor
        .execute(invocation(&f, "cookie", json!({"operation": "clear"})))
        .await;
    assert!(clear.success);

    let after = f
        .executor
        .execute(invocation(&f, "cookie", json!({"operation": "get"})))
        .await;
    assert!(after.data.unwrap()["cookies"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn timeout_override_above_cap_is_rejected() {
    let f = fixture().await;
    let mut inv = invocation(&f, "content", json!({}));
    inv.timeout = Some(Duration::from_secs(900));
    let result = f.executor.execute(inv).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().category, crate::envelope::ErrorCategory::Validation);
}

#[tokio::test]
async fn slow_actions_hit_the_timeout() {
    let f = fixture().await;
    f.engine.set_action_delay(Duration::from_millis(200));
    let mut inv = invocation(&f, "content", json!({}));
    inv.timeout = Some(Duration::from_millis(20));
    let result = f.executor.execute(inv).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, codes::ACTION_TIMEOUT);
}

#[tokio::test]
async fn wait_timeout_strategy_sleeps() {
    let f = fixture().await;
    let started = std::time::Instant::now();
    let result = f
        .executor
        .execute(invocation(
            &f,
            "wait",
            json!({"strategy": "timeout", "timeoutMs": 30}),
        ))
        .await;
    assert!(result.success);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn get_attribute_reads_configured_value() {
    let f = fixture().await;
    let page = f.engine.pages().into_iter().next().unwrap();
    page.set_attribute("#link", "href", "/docs");

    let result = f
        .executor
        .execute(invocation(
            &f,
            "getAttribute",
            json!({"selector": "#link", "name": "href"}),
        ))
        .await;
    assert!(result.success);
    assert_eq!(result.data.unwrap()["value"], "/docs");
}

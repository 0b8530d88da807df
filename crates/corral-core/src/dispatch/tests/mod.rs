use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use super::admission;
use super::rate_limit::RateLimiter;
use super::*;
use crate::config::{Config, PoolConfig, RateLimitConfig};
use crate::engine::mock::MockEngine;
use crate::auth::gate::VerifiedUser;
use crate::plane::ControlPlane;

fn test_config() -> Config {
    Config {
        pool: PoolConfig {
            min_browsers: 0,
            max_browsers: 2,
            acquisition_timeout: Duration::from_millis(200),
            ..PoolConfig::default()
        },
        ..Config::default()
    }
}

fn plane_with(config: Config) -> (ControlPlane, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::new());
    let verifier = Arc::new(crate::auth::gate::StaticPasswordVerifier::new());
    verifier.add_user(
        "alice",
        "pw",
        VerifiedUser {
            user_id: "user-1".to_string(),
            roles: vec!["user".to_string()],
        },
    );
    verifier.add_user(
        "bob",
        "pw",
        VerifiedUser {
            user_id: "user-2".to_string(),
            roles: vec!["user".to_string()],
        },
    );
    let plane = ControlPlane::builder(config)
        .engine(engine.clone())
        .password_verifier(verifier)
        .build();
    (plane, engine)
}

fn rest(method: &str, path: &str, body: Value) -> InvocationRecord {
    InvocationRecord {
        resource_path: Some(path.to_string()),
        body,
        ..InvocationRecord::new(Protocol::Rest, method)
    }
}

fn with_token(mut record: InvocationRecord, token: &str) -> InvocationRecord {
    record
        .headers
        .insert("authorization".to_string(), format!("Bearer {token}"));
    record
}

async fn login(plane: &ControlPlane, username: &str) -> (String, String) {
    let outcome = plane
        .dispatcher()
        .dispatch(rest(
            "POST",
            "/api/v1/sessions",
            json!({"username": username, "password": "pw"}),
        ))
        .await;
    assert_eq!(outcome.status, 201, "{:?}", outcome.body);
    let data = &outcome.body["data"];
    (
        data["sessionId"].as_str().unwrap().to_string(),
        data["token"].as_str().unwrap().to_string(),
    )
}

// --- admission ---

#[test]
fn request_id_is_assigned_and_propagated() {
    let mut record = rest("GET", "/api/v1/health", Value::Null);
    let id = admission::assign_request_id(&mut record);
    assert!(!id.is_empty());

    let mut with_header = rest("GET", "/api/v1/health", Value::Null);
    with_header
        .headers
        .insert("x-request-id".to_string(), "req-supplied".to_string());
    assert_eq!(admission::assign_request_id(&mut with_header), "req-supplied");
}

#[test]
fn csrf_rejects_foreign_origin_on_mutations() {
    let mut record = rest("POST", "/api/v1/contexts", json!({}));
    record
        .headers
        .insert("origin".to_string(), "https://evil.example".to_string());
    record
        .headers
        .insert("host".to_string(), "corral.internal".to_string());
    let err = admission::check_csrf(&record).unwrap_err();
    assert_eq!(err.code, crate::envelope::codes::SECURITY_CSRF_REJECTED);
    assert_eq!(err.status_code(), 403);
}

#[test]
fn csrf_exempts_safe_methods_and_health() {
    let mut get = rest("GET", "/api/v1/contexts", Value::Null);
    get.headers
        .insert("origin".to_string(), "https://evil.example".to_string());
    get.headers
        .insert("host".to_string(), "corral.internal".to_string());
    assert!(admission::check_csrf(&get).is_ok());

    let mut health = rest("POST", "/api/v1/health", Value::Null);
    health
        .headers
        .insert("origin".to_string(), "https://evil.example".to_string());
    health
        .headers
        .insert("host".to_string(), "corral.internal".to_string());
    assert!(admission::check_csrf(&health).is_ok());

    let mut same = rest("POST", "/api/v1/contexts", json!({}));
    same.headers
        .insert("origin".to_string(), "https://corral.internal".to_string());
    same.headers
        .insert("host".to_string(), "corral.internal".to_string());
    assert!(admission::check_csrf(&same).is_ok());
}

#[test]
fn rate_limiter_enforces_and_resets() {
    let limiter = RateLimiter::new(RateLimitConfig {
        per_minute: 60,
        burst: 2,
    });
    // Capacity is per_minute + burst.
    for _ in 0..62 {
        assert!(limiter.check("alice").is_ok());
    }
    let limited = limiter.check("alice").unwrap_err();
    assert!(limited.reset_at > chrono::Utc::now());

    // A different key has its own bucket.
    assert!(limiter.check("bob").is_ok());
}

#[test]
fn rate_limiter_sweeps_idle_buckets() {
    let limiter = RateLimiter::new(RateLimitConfig::default());
    limiter.check("alice").unwrap();
    assert_eq!(limiter.bucket_count(), 1);
    // Fresh buckets survive the sweep.
    assert_eq!(limiter.sweep(), 0);
}

// --- dispatch: auth and sessions ---

#[tokio::test]
async fn health_needs_no_credential() {
    let (plane, _) = plane_with(test_config());
    let outcome = plane
        .dispatcher()
        .dispatch(rest("GET", "/api/v1/health", Value::Null))
        .await;
    assert_eq!(outcome.status, 200);
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn authenticated_routes_reject_missing_credentials() {
    let (plane, _) = plane_with(test_config());
    let outcome = plane
        .dispatcher()
        .dispatch(rest("GET", "/api/v1/contexts", Value::Null))
        .await;
    assert_eq!(outcome.status, 401);
    assert_eq!(
        outcome.error.unwrap().code,
        crate::envelope::codes::AUTH_MISSING_CREDENTIAL
    );
}

#[tokio::test]
async fn login_and_session_lifecycle() {
    let (plane, _) = plane_with(test_config());
    let (session_id, token) = login(&plane, "alice").await;

    let fetched = plane
        .dispatcher()
        .dispatch(with_token(
            rest("GET", &format!("/api/v1/sessions/{session_id}"), Value::Null),
            &token,
        ))
        .await;
    assert_eq!(fetched.status, 200);

    let deleted = plane
        .dispatcher()
        .dispatch(with_token(
            rest("DELETE", &format!("/api/v1/sessions/{session_id}"), Value::Null),
            &token,
        ))
        .await;
    assert_eq!(deleted.status, 200);

    // The token now references a dead session.
    let after = plane
        .dispatcher()
        .dispatch(with_token(rest("GET", "/api/v1/contexts", Value::Null), &token))
        .await;
    assert_eq!(after.status, 401);
}

#[tokio::test]
async fn sessions_of_other_users_are_hidden() {
    let (plane, _) = plane_with(test_config());
    let (alice_session, _) = login(&plane, "alice").await;
    let (_, bob_token) = login(&plane, "bob").await;

    let outcome = plane
        .dispatcher()
        .dispatch(with_token(
            rest("GET", &format!("/api/v1/sessions/{alice_session}"), Value::Null),
            &bob_token,
        ))
        .await;
    assert_eq!(outcome.status, 403);
}

#[tokio::test]
async fn response_carries_request_id_header() {
    let (plane, _) = plane_with(test_config());
    let mut record = rest("GET", "/api/v1/health", Value::Null);
    record
        .headers
        .insert("x-request-id".to_string(), "req-42".to_string());
    let outcome = plane.dispatcher().dispatch(record).await;
    assert_eq!(outcome.request_id, "req-42");
    assert!(
        outcome
            .headers
            .iter()
            .any(|(k, v)| *k == "x-request-id" && v == "req-42")
    );
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (plane, _) = plane_with(test_config());
    let (_, token) = login(&plane, "alice").await;
    let outcome = plane
        .dispatcher()
        .dispatch(with_token(
            rest("GET", "/api/v1/unicorns", Value::Null),
            &token,
        ))
        .await;
    assert_eq!(outcome.status, 404);
}

#[tokio::test]
async fn admin_list_denial_is_audited_as_denied() {
    let (plane, _) = plane_with(test_config());
    // alice is not admin: the role check decides the audit outcome.
    let (_, token) = login(&plane, "alice").await;
    let mut audit_rx = plane.audit().subscribe();
    let outcome = plane
        .dispatcher()
        .dispatch(with_token(
            rest("GET", "/api/v1/admin/sessions", Value::Null),
            &token,
        ))
        .await;
    assert_eq!(outcome.status, 403);
    let seen: Vec<_> = std::iter::from_fn(|| audit_rx.try_recv().ok()).collect();
    let admin_events: Vec<_> = seen
        .iter()
        .filter(|e| e.resource == "admin:sessions")
        .collect();
    assert!(!admin_events.is_empty());
    // A denied caller never produces an ACCESS_GRANTED entry.
    assert!(
        admin_events
            .iter()
            .all(|e| e.kind == crate::auth::audit::AuditKind::AccessDenied)
    );
}

#[tokio::test]
async fn rate_limited_requests_get_retry_config() {
    let config = Config {
        rate_limit: RateLimitConfig {
            per_minute: 1,
            burst: 0,
        },
        ..test_config()
    };
    let (plane, _) = plane_with(config);
    let (_, token) = login(&plane, "alice").await;

    // First authenticated call eats the single token.
    let first = plane
        .dispatcher()
        .dispatch(with_token(rest("GET", "/api/v1/contexts", Value::Null), &token))
        .await;
    assert_eq!(first.status, 200);

    let second = plane
        .dispatcher()
        .dispatch(with_token(rest("GET", "/api/v1/contexts", Value::Null), &token))
        .await;
    assert_eq!(second.status, 429);
    let envelope = second.error.unwrap();
    assert_eq!(envelope.code, crate::envelope::codes::RATE_LIMIT_EXCEEDED);
    assert!(envelope.retry_config.unwrap().reset_at.is_some());
}

// --- dispatch: contexts and pages ---

#[tokio::test]
async fn context_and_page_flow() {
    let (plane, _) = plane_with(test_config());
    let (_, token) = login(&plane, "alice").await;

    let created = plane
        .dispatcher()
        .dispatch(with_token(
            rest("POST", "/api/v1/contexts", json!({"name": "scraping"})),
            &token,
        ))
        .await;
    assert_eq!(created.status, 201);
    let context_id = created.body["data"]["contextId"].as_str().unwrap().to_string();

    let page = plane
        .dispatcher()
        .dispatch(with_token(
            rest("POST", "/api/v1/pages", json!({"contextId": context_id})),
            &token,
        ))
        .await;
    assert_eq!(page.status, 201);
    let page_id = page.body["data"]["pageId"].as_str().unwrap().to_string();

    let navigated = plane
        .dispatcher()
        .dispatch(with_token(
            rest(
                "POST",
                &format!("/api/v1/pages/{page_id}/navigate"),
                json!({"url": "https://example.com", "waitUntil": "networkidle0"}),
            ),
            &token,
        ))
        .await;
    assert_eq!(navigated.status, 200, "{:?}", navigated.body);
    assert_eq!(navigated.body["data"]["data"]["status"], 200);
    assert_eq!(navigated.body["data"]["data"]["finalUrl"], "https://example.com");

    let listed = plane
        .dispatcher()
        .dispatch(with_token(rest("GET", "/api/v1/contexts", Value::Null), &token))
        .await;
    assert_eq!(listed.body["data"]["contexts"].as_array().unwrap().len(), 1);

    let deleted_page = plane
        .dispatcher()
        .dispatch(with_token(
            rest("DELETE", &format!("/api/v1/pages/{page_id}"), Value::Null),
            &token,
        ))
        .await;
    assert_eq!(deleted_page.status, 200);

    let deleted_context = plane
        .dispatcher()
        .dispatch(with_token(
            rest("DELETE", &format!("/api/v1/contexts/{context_id}"), Value::Null),
            &token,
        ))
        .await;
    assert_eq!(deleted_context.status, 200);
}

#[tokio::test]
async fn foreign_context_execute_is_denied() {
    let (plane, _) = plane_with(test_config());
    let (_, alice_token) = login(&plane, "alice").await;
    let (_, bob_token) = login(&plane, "bob").await;

    let created = plane
        .dispatcher()
        .dispatch(with_token(
            rest("POST", "/api/v1/contexts", json!({"name": "private"})),
            &alice_token,
        ))
        .await;
    let context_id = created.body["data"]["contextId"].as_str().unwrap().to_string();

    let outcome = plane
        .dispatcher()
        .dispatch(with_token(
            rest(
                "POST",
                &format!("/api/v1/contexts/{context_id}/execute"),
                json!({"action": "content", "params": {}}),
            ),
            &bob_token,
        ))
        .await;
    assert_eq!(outcome.status, 403);
    let envelope = outcome.error.unwrap();
    assert_eq!(envelope.code, crate::envelope::codes::AUTH_RESOURCE_ACCESS_DENIED);
    assert_eq!(envelope.category, crate::envelope::ErrorCategory::Authorization);
}

// --- protocol parsing ---

#[tokio::test]
async fn websocket_messages_route() {
    let (plane, _) = plane_with(test_config());
    let (session_id, _) = login(&plane, "alice").await;

    // Auth precedes any other message type, ping included.
    let mut ping = InvocationRecord::new(Protocol::Websocket, "ping");
    ping.message_id = Some(json!("m1"));
    ping.session_hint = Some(session_id.clone());
    let outcome = plane.dispatcher().dispatch(ping).await;
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["type"], "result");
    assert_eq!(outcome.body["id"], "m1");

    let mut auth = InvocationRecord::new(Protocol::Websocket, "auth");
    auth.session_hint = Some(session_id.clone());
    let outcome = plane.dispatcher().dispatch(auth).await;
    assert_eq!(outcome.status, 200, "{:?}", outcome.body);
    assert_eq!(outcome.body["data"]["userId"], "user-1");
}

#[tokio::test]
async fn websocket_unauthenticated_is_rejected() {
    let (plane, _) = plane_with(test_config());
    let mut record = InvocationRecord::new(Protocol::Websocket, "context");
    record.body = json!({"method": "list"});
    let outcome = plane.dispatcher().dispatch(record).await;
    assert_eq!(outcome.status, 401);
    assert_eq!(outcome.body["type"], "error");
    assert_eq!(outcome.body["meta"]["protocol"], "websocket");
}

#[tokio::test]
async fn grpc_methods_route() {
    let (plane, _) = plane_with(test_config());
    let (session_id, token) = login(&plane, "alice").await;
    let _ = session_id;

    let mut record = InvocationRecord::new(Protocol::Grpc, "CreateContext");
    record.operation = Some(json!({"service": "ContextService", "method": "CreateContext"}));
    record.body = json!({"name": "from-grpc"});
    record
        .headers
        .insert("authorization".to_string(), format!("Bearer {token}"));
    let outcome = plane.dispatcher().dispatch(record).await;
    assert_eq!(outcome.status, 201, "{:?}", outcome.body);
    assert_eq!(outcome.body["data"]["name"], "from-grpc");
}

#[tokio::test]
async fn grpc_errors_carry_grpc_status() {
    let (plane, _) = plane_with(test_config());
    let mut record = InvocationRecord::new(Protocol::Grpc, "ListContexts");
    record.operation = Some(json!({"service": "ContextService", "method": "ListContexts"}));
    let outcome = plane.dispatcher().dispatch(record).await;
    assert_eq!(outcome.status, 401);
    // UNAUTHENTICATED = 16.
    assert_eq!(outcome.body["grpcStatus"], 16);
}

#[tokio::test]
async fn mcp_tools_list_and_call() {
    let (plane, _) = plane_with(test_config());
    let (_, token) = login(&plane, "alice").await;

    let mut list = InvocationRecord::new(Protocol::Mcp, "tools/list");
    list.message_id = Some(json!(1));
    let outcome = plane.dispatcher().dispatch(list).await;
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body["jsonrpc"], "2.0");

    let mut call = InvocationRecord::new(Protocol::Mcp, "tools/call");
    call.message_id = Some(json!(2));
    call.operation = Some(json!({
        "name": "execute-api",
        "arguments": {
            "protocol": "rest",
            "operation": {"method": "POST", "path": "/api/v1/contexts", "body": {"name": "via-mcp"}},
        },
    }));
    call.headers
        .insert("authorization".to_string(), format!("Bearer {token}"));
    let outcome = plane.dispatcher().dispatch(call).await;
    assert_eq!(outcome.status, 201, "{:?}", outcome.body);
    let text = outcome.body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("via-mcp"));

    let mut catalog = InvocationRecord::new(Protocol::Mcp, "resources/read");
    catalog.body = json!({"uri": "api://catalog"});
    catalog.message_id = Some(json!(3));
    let outcome = plane.dispatcher().dispatch(catalog).await;
    assert_eq!(outcome.status, 200);
}

#[tokio::test]
async fn mcp_errors_are_jsonrpc_shaped() {
    let (plane, _) = plane_with(test_config());
    let mut record = InvocationRecord::new(Protocol::Mcp, "tools/call");
    record.message_id = Some(json!(7));
    record.operation = Some(json!({
        "name": "execute-api",
        "arguments": {
            "protocol": "rest",
            "operation": {"method": "GET", "path": "/api/v1/contexts"},
        },
    }));
    let outcome = plane.dispatcher().dispatch(record).await;
    assert_eq!(outcome.status, 401);
    assert_eq!(outcome.body["jsonrpc"], "2.0");
    assert_eq!(outcome.body["id"], 7);
    assert_eq!(outcome.body["error"]["code"], -32000);
}

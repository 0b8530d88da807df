use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::apikey::{ApiKeyData, ApiKeyStore, MemoryApiKeyStore};
use super::audit::{AuditKind, AuditLog};
use super::gate::{AuthGate, StaticPasswordVerifier, VerifiedUser};
use super::token::TokenCodec;
use super::*;
use crate::envelope::codes;
use crate::store::SessionStore;
use crate::store::memory::MemorySessionStore;

const SECRET: &str = "test-secret";

fn gate() -> (AuthGate, Arc<MemorySessionStore>, Arc<MemoryApiKeyStore>, Arc<AuditLog>) {
    let sessions = Arc::new(MemorySessionStore::new());
    let api_keys = Arc::new(MemoryApiKeyStore::new());
    let verifier = Arc::new(StaticPasswordVerifier::new());
    verifier.add_user(
        "alice",
        "pw",
        VerifiedUser {
            user_id: "user-1".to_string(),
            roles: vec!["user".to_string()],
        },
    );
    let audit = Arc::new(AuditLog::new());
    let gate = AuthGate::new(
        sessions.clone(),
        api_keys.clone(),
        verifier,
        TokenCodec::new(SECRET),
        audit.clone(),
        Duration::from_secs(3600),
    );
    (gate, sessions, api_keys, audit)
}

#[tokio::test]
async fn login_issues_session_and_token() {
    let (gate, sessions, _, _) = gate();
    let (session, token) = gate
        .login("alice", "pw", &RequestOrigin::default())
        .await
        .unwrap();
    assert_eq!(session.data.user_id, "user-1");
    assert!(session.data.expires_at > session.data.created_at);
    assert!(sessions.exists(&session.id).await.unwrap());

    let claims = TokenCodec::new(SECRET).verify(&token).unwrap();
    assert_eq!(claims.sub, "user-1");
    assert_eq!(claims.sid, session.id);
}

#[tokio::test]
async fn login_rejects_bad_password() {
    let (gate, _, _, audit) = gate();
    let mut events = audit.subscribe();
    let err = gate
        .login("alice", "wrong", &RequestOrigin::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, AuditKind::AccessDenied);
}

#[tokio::test]
async fn bearer_authentication_touches_session() {
    let (gate, sessions, _, _) = gate();
    let (session, token) = gate
        .login("alice", "pw", &RequestOrigin::default())
        .await
        .unwrap();
    let before = sessions.get(&session.id).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let principal = gate
        .authenticate(&Credential::Bearer(token), &RequestOrigin::default())
        .await
        .unwrap();
    assert_eq!(principal.user_id, "user-1");
    assert_eq!(principal.session_id, session.id);

    let after = sessions.get(&session.id).await.unwrap().unwrap();
    assert!(after.last_accessed_at > before.last_accessed_at);
    assert_eq!(after.data.expires_at, before.data.expires_at);
}

#[tokio::test]
async fn bearer_with_deleted_session_is_rejected() {
    let (gate, sessions, _, _) = gate();
    let (session, token) = gate
        .login("alice", "pw", &RequestOrigin::default())
        .await
        .unwrap();
    sessions.delete(&session.id).await.unwrap();

    let err = gate
        .authenticate(&Credential::Bearer(token), &RequestOrigin::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSession));
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let (gate, _, _, _) = gate();
    let err = gate
        .authenticate(
            &Credential::Bearer("not.a.jwt".to_string()),
            &RequestOrigin::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn api_key_synthesizes_principal() {
    let (gate, _, api_keys, _) = gate();
    api_keys
        .insert(
            "sk-live-123",
            ApiKeyData {
                id: "key-9".to_string(),
                name: "ci".to_string(),
                user_id: "user-7".to_string(),
                roles: vec!["user".to_string()],
                created_at: Utc::now(),
                revoked: false,
            },
        )
        .await
        .unwrap();

    let principal = gate
        .authenticate(
            &Credential::ApiKey("sk-live-123".to_string()),
            &RequestOrigin::default(),
        )
        .await
        .unwrap();
    assert_eq!(principal.user_id, "user-7");
    assert_eq!(principal.username, "apikey:ci");
    assert_eq!(principal.session_id, "apikey:key-9");
}

#[tokio::test]
async fn revoked_api_key_is_rejected() {
    let (gate, _, api_keys, _) = gate();
    api_keys
        .insert(
            "sk-live-456",
            ApiKeyData {
                id: "key-1".to_string(),
                name: "old".to_string(),
                user_id: "user-7".to_string(),
                roles: vec![],
                created_at: Utc::now(),
                revoked: false,
            },
        )
        .await
        .unwrap();
    assert!(api_keys.revoke("key-1").await.unwrap());

    let err = gate
        .authenticate(
            &Credential::ApiKey("sk-live-456".to_string()),
            &RequestOrigin::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidApiKey));
}

#[tokio::test]
async fn session_id_authentication_works() {
    let (gate, _, _, _) = gate();
    let (session, _) = gate
        .login("alice", "pw", &RequestOrigin::default())
        .await
        .unwrap();
    let principal = gate
        .authenticate(
            &Credential::SessionId(session.id.clone()),
            &RequestOrigin::default(),
        )
        .await
        .unwrap();
    assert_eq!(principal.session_id, session.id);
}

#[tokio::test]
async fn revoke_destroys_session() {
    let (gate, sessions, _, _) = gate();
    let (session, _) = gate
        .login("alice", "pw", &RequestOrigin::default())
        .await
        .unwrap();
    assert!(gate.revoke(&session.id, &RequestOrigin::default()).await.unwrap());
    assert!(!sessions.exists(&session.id).await.unwrap());
    assert!(!gate.revoke(&session.id, &RequestOrigin::default()).await.unwrap());
}

#[test]
fn principal_role_checks() {
    let principal = Principal {
        user_id: "u".to_string(),
        username: "n".to_string(),
        roles: vec!["admin".to_string(), "user".to_string()],
        session_id: "s".to_string(),
    };
    assert!(principal.is_admin());
    assert!(principal.has_role("user"));
    assert!(!principal.has_role("guest"));
}

#[test]
fn auth_errors_project_to_envelopes() {
    let denied = AuthError::AccessDenied {
        resource: "context-9".to_string(),
    }
    .to_envelope();
    assert_eq!(denied.code, codes::AUTH_RESOURCE_ACCESS_DENIED);
    assert_eq!(denied.status_code(), 403);
    assert_eq!(denied.resource(), Some("context-9"));

    let missing = AuthError::MissingCredential.to_envelope();
    assert_eq!(missing.status_code(), 401);

    let session = AuthError::InvalidSession.to_envelope();
    assert_eq!(session.status_code(), 401);
}

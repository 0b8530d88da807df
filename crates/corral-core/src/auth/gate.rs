//! The auth gate: raw credential in, principal out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::store::{Session, SessionStore, StoreError};

use super::apikey::ApiKeyStore;
use super::audit::{AuditKind, AuditLog};
use super::token::TokenCodec;
use super::{AuthError, Credential, Principal, RequestOrigin};

/// Verifies login credentials.
///
/// The verification mechanism itself (password hashing, directory lookup)
/// is an external collaborator; the gate only consumes the outcome.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// Verify a username/password pair, returning the user on success.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<VerifiedUser>, StoreError>;
}

/// Outcome of a successful credential verification.
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    /// User id.
    pub user_id: String,
    /// Assigned roles.
    pub roles: Vec<String>,
}

/// A verifier that accepts a fixed user table. Suitable for development
/// and tests.
#[derive(Debug, Default)]
pub struct StaticPasswordVerifier {
    users: parking_lot::RwLock<std::collections::HashMap<String, (String, VerifiedUser)>>,
}

impl StaticPasswordVerifier {
    /// Create an empty verifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user.
    pub fn add_user(&self, username: &str, password: &str, user: VerifiedUser) {
        self.users
            .write()
            .insert(username.to_string(), (password.to_string(), user));
    }
}

#[async_trait]
impl PasswordVerifier for StaticPasswordVerifier {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<VerifiedUser>, StoreError> {
        let users = self.users.read();
        Ok(users
            .get(username)
            .filter(|(expected, _)| expected == password)
            .map(|(_, user)| user.clone()))
    }
}

/// The gate in front of every authenticated invocation.
pub struct AuthGate {
    sessions: Arc<dyn SessionStore>,
    api_keys: Arc<dyn ApiKeyStore>,
    verifier: Arc<dyn PasswordVerifier>,
    codec: TokenCodec,
    audit: Arc<AuditLog>,
    session_ttl: Duration,
}

impl AuthGate {
    /// Assemble a gate from its collaborators.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        api_keys: Arc<dyn ApiKeyStore>,
        verifier: Arc<dyn PasswordVerifier>,
        codec: TokenCodec,
        audit: Arc<AuditLog>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            api_keys,
            verifier,
            codec,
            audit,
            session_ttl,
        }
    }

    /// Authenticate a raw credential into a principal.
    ///
    /// Emits `ACCESS_GRANTED` / `ACCESS_DENIED` audit events. On success
    /// the referenced session is touched.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing why the credential was rejected.
    pub async fn authenticate(
        &self,
        credential: &Credential,
        origin: &RequestOrigin,
    ) -> Result<Principal, AuthError> {
        let outcome = match credential {
            Credential::Bearer(token) => self.authenticate_bearer(token).await,
            Credential::ApiKey(key) => self.authenticate_api_key(key).await,
            Credential::SessionId(id) => self.authenticate_session(id).await,
        };

        match &outcome {
            Ok(principal) => {
                self.audit.record(
                    AuditKind::AccessGranted,
                    "auth",
                    "authenticate",
                    "success",
                    None,
                    origin,
                );
                debug!(user_id = %principal.user_id, "authentication succeeded");
            }
            Err(err) => {
                self.audit.record(
                    AuditKind::AccessDenied,
                    "auth",
                    "authenticate",
                    "failure",
                    Some(err.to_string()),
                    origin,
                );
            }
        }
        outcome
    }

    async fn authenticate_bearer(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.codec.verify(token)?;
        let session = self
            .sessions
            .get(&claims.sid)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        self.sessions.touch(&session.id).await?;
        Ok(Principal {
            user_id: session.data.user_id,
            username: session.data.username,
            roles: session.data.roles,
            session_id: session.id,
        })
    }

    async fn authenticate_api_key(&self, raw_key: &str) -> Result<Principal, AuthError> {
        let key = self
            .api_keys
            .lookup(raw_key)
            .await?
            .ok_or(AuthError::InvalidApiKey)?;

        // API keys map onto a synthetic session so the ownership chain is
        // uniform across credential kinds. Created lazily, touched after.
        let session_id = format!("apikey:{}", key.id);
        if self.sessions.get(&session_id).await?.is_none() {
            let mut session = Session::issue(
                key.user_id.clone(),
                format!("apikey:{}", key.name),
                key.roles.clone(),
                self.session_ttl,
            );
            session.id = session_id.clone();
            self.sessions.create(session).await?;
        } else {
            self.sessions.touch(&session_id).await?;
        }

        Ok(Principal {
            user_id: key.user_id,
            username: format!("apikey:{}", key.name),
            roles: key.roles,
            session_id,
        })
    }

    async fn authenticate_session(&self, session_id: &str) -> Result<Principal, AuthError> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        self.sessions.touch(&session.id).await?;
        Ok(Principal {
            user_id: session.data.user_id,
            username: session.data.username,
            roles: session.data.roles,
            session_id: session.id,
        })
    }

    /// Verify login credentials and issue a session plus bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] equivalent denial when the
    /// credentials do not verify.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        origin: &RequestOrigin,
    ) -> Result<(Session, String), AuthError> {
        let Some(user) = self.verifier.verify(username, password).await? else {
            self.audit.record(
                AuditKind::AccessDenied,
                "session",
                "login",
                "failure",
                Some("credential verification failed".to_string()),
                origin,
            );
            return Err(AuthError::InvalidToken(
                "credential verification failed".to_string(),
            ));
        };

        let session = Session::issue(
            user.user_id.clone(),
            username,
            user.roles.clone(),
            self.session_ttl,
        );
        let token = self.codec.mint(
            &user.user_id,
            username,
            &user.roles,
            &session.id,
            self.session_ttl,
        )?;
        self.sessions.create(session.clone()).await?;
        self.audit.record(
            AuditKind::AccessGranted,
            "session",
            "login",
            "success",
            None,
            origin,
        );
        Ok((session, token))
    }

    /// Re-issue a token for a live session without extending its expiry.
    ///
    /// # Errors
    ///
    /// Fails when the session no longer exists.
    pub async fn refresh(&self, principal: &Principal) -> Result<String, AuthError> {
        let session = self
            .sessions
            .get(&principal.session_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let remaining = (session.data.expires_at - chrono::Utc::now())
            .to_std()
            .unwrap_or_default();
        self.codec.mint(
            &session.data.user_id,
            &session.data.username,
            &session.data.roles,
            &session.id,
            remaining,
        )
    }

    /// Destroy a session (logout / revocation).
    ///
    /// # Errors
    ///
    /// Fails only on store errors; revoking an unknown session is not an
    /// error and returns false.
    pub async fn revoke(&self, session_id: &str, origin: &RequestOrigin) -> Result<bool, AuthError> {
        let removed = self.sessions.delete(session_id).await?;
        self.audit.record(
            AuditKind::SessionRevoked,
            "session",
            "revoke",
            if removed { "success" } else { "noop" },
            None,
            origin,
        );
        Ok(removed)
    }

    /// The session store this gate consults.
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }
}

//! # Invocation Dispatcher
//!
//! Normalizes requests from the four front-ends (REST, gRPC, WebSocket,
//! MCP) into one [`InvocationRecord`], applies admission control
//! (request-id, CSRF, rate limiting), authenticates through the gate, and
//! routes to session, context, page/action or admin handling. Failures are
//! projected back onto the calling protocol's wire form, so the same
//! operation yields the same envelope code everywhere.

pub mod admission;
pub mod rate_limit;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::action::executor::ActionExecutor;
use crate::action::ActionInvocation;
use crate::auth::gate::AuthGate;
use crate::auth::{AuthError, Credential, Principal, RequestOrigin};
use crate::auth::audit::{AuditKind, AuditLog};
use crate::envelope::projection::{self, RestMeta};
use crate::envelope::tracker::ErrorTracker;
use crate::envelope::{
    ErrorCategory, ErrorEnvelope, ErrorSeverity, RecoverySuggestion, RetryAdvice, codes,
};
use crate::page::PageManager;
use crate::pool::BrowserPool;
use crate::store::{Context, ContextStore, SessionStore};

use rate_limit::RateLimiter;

/// The protocol a record arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// JSON over HTTP, prefix `/api/v1`.
    Rest,
    /// The context service.
    Grpc,
    /// The `/ws` channel.
    Websocket,
    /// JSON-RPC 2.0 tool server.
    Mcp,
}

impl Protocol {
    /// Lowercase protocol name for tags and metadata.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Grpc => "grpc",
            Self::Websocket => "websocket",
            Self::Mcp => "mcp",
        }
    }
}

/// One normalized invocation, protocol differences already flattened.
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    /// Originating protocol.
    pub protocol: Protocol,
    /// HTTP verb, WS message type, or RPC method.
    pub method: String,
    /// REST resource path.
    pub resource_path: Option<String>,
    /// gRPC `{service, method}` or MCP tool call.
    pub operation: Option<Value>,
    /// Request payload.
    pub body: Value,
    /// Transport headers, lowercase keys.
    pub headers: HashMap<String, String>,
    /// Query parameters.
    pub query: HashMap<String, String>,
    /// Authenticated principal, populated by the dispatcher.
    pub principal: Option<Principal>,
    /// Request id; assigned when absent.
    pub request_id: Option<String>,
    /// Correlation ids propagated from upstream.
    pub correlation_ids: Vec<String>,
    /// Remote address, when the transport knows it.
    pub remote_ip: Option<String>,
    /// Session hint (WebSocket/MCP authenticated channels).
    pub session_hint: Option<String>,
    /// Wire message id (WS `id`, JSON-RPC `id`).
    pub message_id: Option<Value>,
}

impl InvocationRecord {
    /// A bare record for the given protocol; fill in what the transport
    /// knows.
    pub fn new(protocol: Protocol, method: impl Into<String>) -> Self {
        Self {
            protocol,
            method: method.into(),
            resource_path: None,
            operation: None,
            body: Value::Null,
            headers: HashMap::new(),
            query: HashMap::new(),
            principal: None,
            request_id: None,
            correlation_ids: Vec::new(),
            remote_ip: None,
            session_hint: None,
            message_id: None,
        }
    }

    fn origin(&self) -> RequestOrigin {
        RequestOrigin {
            ip: self.remote_ip.clone(),
            user_agent: self.headers.get("user-agent").cloned(),
            method: self.method.clone(),
        }
    }

    fn credential(&self) -> Option<Credential> {
        if let Some(auth) = self.headers.get("authorization") {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                return Some(Credential::Bearer(token.trim().to_string()));
            }
        }
        if let Some(key) = self.headers.get("x-api-key").filter(|k| !k.is_empty()) {
            return Some(Credential::ApiKey(key.clone()));
        }
        if matches!(self.protocol, Protocol::Websocket | Protocol::Mcp) {
            if let Some(session) = self.session_hint.clone().filter(|s| !s.is_empty()) {
                return Some(Credential::SessionId(session));
            }
        }
        None
    }
}

/// The routed interpretation of a record.
#[derive(Debug, Clone, PartialEq)]
enum Operation {
    CreateSession {
        username: String,
        password: String,
    },
    GetSession {
        id: String,
    },
    DeleteSession {
        id: String,
    },
    RefreshSession,
    RevokeSession {
        id: Option<String>,
    },
    CreateContext {
        name: String,
        config: Value,
    },
    ListContexts,
    GetContext {
        id: String,
    },
    DeleteContext {
        id: String,
    },
    ExecuteInContext {
        context_id: String,
        page_id: Option<String>,
        action_type: String,
        params: Value,
        timeout_ms: Option<u64>,
    },
    CreatePage {
        context_id: String,
        options: Value,
    },
    GetPage {
        id: String,
    },
    DeletePage {
        id: String,
    },
    PageAction {
        page_id: String,
        action_type: String,
        params: Value,
        timeout_ms: Option<u64>,
    },
    Authenticate,
    Health,
    Ready,
    Metrics,
    AdminListSessions,
    ListTools,
    ReadCatalog,
    Ping,
}

impl Operation {
    /// Whether the operation is served without a principal.
    fn is_public(&self) -> bool {
        matches!(
            self,
            Self::CreateSession { .. } | Self::Health | Self::Ready | Self::ListTools | Self::ReadCatalog
        )
    }
}

/// The dispatcher's answer, ready for the transport layer to frame.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// HTTP-equivalent status.
    pub status: u16,
    /// Protocol-shaped body.
    pub body: Value,
    /// The request id in effect.
    pub request_id: String,
    /// Response headers the transport should set.
    pub headers: Vec<(&'static str, String)>,
    /// The envelope, when the outcome is a failure.
    pub error: Option<ErrorEnvelope>,
}

/// The invocation dispatcher.
pub struct Dispatcher {
    gate: Arc<AuthGate>,
    sessions: Arc<dyn SessionStore>,
    contexts: Arc<dyn ContextStore>,
    pages: Arc<PageManager>,
    executor: Arc<ActionExecutor>,
    pool: BrowserPool,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLog>,
    tracker: Arc<ErrorTracker>,
}

impl Dispatcher {
    /// Assemble a dispatcher from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gate: Arc<AuthGate>,
        sessions: Arc<dyn SessionStore>,
        contexts: Arc<dyn ContextStore>,
        pages: Arc<PageManager>,
        executor: Arc<ActionExecutor>,
        pool: BrowserPool,
        limiter: Arc<RateLimiter>,
        audit: Arc<AuditLog>,
        tracker: Arc<ErrorTracker>,
    ) -> Self {
        Self {
            gate,
            sessions,
            contexts,
            pages,
            executor,
            pool,
            limiter,
            audit,
            tracker,
        }
    }

    /// Handle one invocation end to end.
    ///
    /// Never fails: every error is recorded and projected onto the
    /// calling protocol's wire form.
    #[instrument(level = "debug", skip_all, fields(protocol = record.protocol.name(), method = %record.method))]
    pub async fn dispatch(&self, mut record: InvocationRecord) -> DispatchOutcome {
        let started = std::time::Instant::now();
        let request_id = admission::assign_request_id(&mut record);

        let result = self.admit_and_route(&record, &request_id).await;
        match result {
            Ok((status, data)) => {
                let mut headers =
                    vec![(admission::REQUEST_ID_HEADER, request_id.clone())];
                if record.protocol == Protocol::Rest {
                    headers.push(("content-type", "application/json".to_string()));
                }
                DispatchOutcome {
                    status,
                    body: self.frame_success(&record, status, data),
                    request_id,
                    headers,
                    error: None,
                }
            }
            Err(mut envelope) => {
                if envelope.request_id.is_empty() {
                    envelope.request_id = request_id.clone();
                }
                envelope
                    .correlation_ids
                    .extend(record.correlation_ids.iter().cloned());
                envelope = envelope.tag("protocol", record.protocol.name());
                self.tracker.record(&envelope);
                if envelope.category == ErrorCategory::Security {
                    // Security failures also cost the caller rate budget.
                    self.limiter.penalize(&self.rate_key(&record), 10);
                }
                let status = envelope.status_code();
                let body = self.frame_error(&record, &envelope, started.elapsed());
                let mut headers =
                    vec![(admission::REQUEST_ID_HEADER, request_id.clone())];
                if record.protocol == Protocol::Rest {
                    for (name, value) in projection::REST_SECURITY_HEADERS {
                        headers.push((name, value.to_string()));
                    }
                }
                DispatchOutcome {
                    status,
                    body,
                    request_id,
                    headers,
                    error: Some(envelope),
                }
            }
        }
    }

    fn rate_key(&self, record: &InvocationRecord) -> String {
        record
            .principal
            .as_ref()
            .map(|p| p.user_id.clone())
            .or_else(|| record.remote_ip.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    async fn admit_and_route(
        &self,
        record: &InvocationRecord,
        request_id: &str,
    ) -> Result<(u16, Value), ErrorEnvelope> {
        admission::check_csrf(record)?;
        let operation = parse_operation(record)?;

        // Health and login are admitted without a principal.
        let principal = if operation.is_public() {
            None
        } else {
            let credential = record
                .credential()
                .ok_or_else(|| AuthError::MissingCredential.to_envelope())?;
            let principal = self
                .gate
                .authenticate(&credential, &record.origin())
                .await
                .map_err(|e| e.to_envelope())?;
            Some(principal)
        };

        // Rate limiting keyed by principal, falling back to the remote IP.
        let rate_key = principal
            .as_ref()
            .map(|p| p.user_id.clone())
            .or_else(|| record.remote_ip.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        if let Err(limited) = self.limiter.check(&rate_key) {
            return Err(ErrorEnvelope::new(
                codes::RATE_LIMIT_EXCEEDED,
                ErrorCategory::RateLimit,
                "Too many requests; slow down",
            )
            .severity(ErrorSeverity::Low)
            .retry(RetryAdvice {
                retryable: true,
                max_attempts: 1,
                initial_delay_ms: 1_000,
                backoff_multiplier: 1.0,
                reset_at: Some(limited.reset_at),
            })
            .suggest(RecoverySuggestion::ReduceRequestRate));
        }

        self.route(record, operation, principal, request_id).await
    }

    #[allow(clippy::too_many_lines)]
    async fn route(
        &self,
        record: &InvocationRecord,
        operation: Operation,
        principal: Option<Principal>,
        request_id: &str,
    ) -> Result<(u16, Value), ErrorEnvelope> {
        let origin = record.origin();
        match operation {
            Operation::Health => Ok((200, json!({ "status": "ok" }))),
            Operation::Ready => {
                let metrics = self.pool.metrics().await;
                let breaker_open =
                    self.pool.breaker_state() == crate::pool::breaker::BreakerState::Open;
                if breaker_open {
                    Err(ErrorEnvelope::new(
                        codes::BROWSER_UNAVAILABLE,
                        ErrorCategory::Browser,
                        "Engine circuit breaker is open",
                    )
                    .severity(ErrorSeverity::High)
                    .suggest(RecoverySuggestion::WaitAndRetry))
                } else {
                    Ok((200, json!({ "status": "ready", "pool": metrics })))
                }
            }
            Operation::Metrics => {
                let principal = principal.ok_or_else(no_principal)?;
                if !principal.is_admin() {
                    return Err(AuthError::InsufficientRole {
                        required: "admin".to_string(),
                    }
                    .to_envelope());
                }
                Ok((200, json!({ "pool": self.pool.metrics().await })))
            }
            Operation::Ping => Ok((200, json!({ "pong": true }))),
            Operation::Authenticate => {
                let principal = principal.ok_or_else(no_principal)?;
                Ok((200, serde_json::to_value(&principal).unwrap_or_default()))
            }
            Operation::ListTools => Ok((200, tool_catalog())),
            Operation::ReadCatalog => Ok((200, api_catalog())),

            Operation::CreateSession { username, password } => {
                let (session, token) = self
                    .gate
                    .login(&username, &password, &origin)
                    .await
                    .map_err(|e| e.to_envelope())?;
                Ok((
                    201,
                    json!({ "sessionId": session.id, "token": token, "expiresAt": session.data.expires_at }),
                ))
            }
            Operation::GetSession { id } => {
                let principal = principal.ok_or_else(no_principal)?;
                if principal.session_id != id && !principal.is_admin() {
                    return Err(AuthError::AccessDenied {
                        resource: format!("session:{id}"),
                    }
                    .to_envelope());
                }
                let session = self
                    .sessions
                    .get(&id)
                    .await
                    .map_err(|e| ErrorEnvelope::internal(e.to_string()))?
                    .ok_or_else(|| AuthError::InvalidSession.to_envelope())?;
                Ok((200, serde_json::to_value(&session).unwrap_or_default()))
            }
            Operation::DeleteSession { id } | Operation::RevokeSession { id: Some(id) } => {
                let principal = principal.ok_or_else(no_principal)?;
                if principal.session_id != id && !principal.is_admin() {
                    return Err(AuthError::AccessDenied {
                        resource: format!("session:{id}"),
                    }
                    .to_envelope());
                }
                self.teardown_session(&id, &origin).await?;
                Ok((200, json!({ "deleted": true, "sessionId": id })))
            }
            Operation::RevokeSession { id: None } => {
                let principal = principal.ok_or_else(no_principal)?;
                let id = principal.session_id.clone();
                self.teardown_session(&id, &origin).await?;
                Ok((200, json!({ "deleted": true, "sessionId": id })))
            }
            Operation::RefreshSession => {
                let principal = principal.ok_or_else(no_principal)?;
                let token = self
                    .gate
                    .refresh(&principal)
                    .await
                    .map_err(|e| e.to_envelope())?;
                Ok((200, json!({ "sessionId": principal.session_id, "token": token })))
            }

            Operation::CreateContext { name, config } => {
                let principal = principal.ok_or_else(no_principal)?;
                let session = self
                    .sessions
                    .get(&principal.session_id)
                    .await
                    .map_err(|e| ErrorEnvelope::internal(e.to_string()))?
                    .ok_or_else(|| AuthError::InvalidSession.to_envelope())?;
                let context = Context::create(&session, name, config);
                self.contexts
                    .create(context.clone())
                    .await
                    .map_err(|e| ErrorEnvelope::internal(e.to_string()))?;
                debug!(context_id = %context.id, "context created");
                Ok((201, json!({ "contextId": context.id, "name": context.name })))
            }
            Operation::ListContexts => {
                let principal = principal.ok_or_else(no_principal)?;
                let contexts = self
                    .contexts
                    .get_by_user(&principal.user_id)
                    .await
                    .map_err(|e| ErrorEnvelope::internal(e.to_string()))?;
                Ok((200, json!({ "contexts": contexts })))
            }
            Operation::GetContext { id } => {
                let principal = principal.ok_or_else(no_principal)?;
                let context = self.owned_context(&principal, &id).await?;
                Ok((200, serde_json::to_value(&context).unwrap_or_default()))
            }
            Operation::DeleteContext { id } => {
                let principal = principal.ok_or_else(no_principal)?;
                let context = self.owned_context(&principal, &id).await?;
                for page in self.pages.list_by_context(&context.id).await {
                    let _ = self.pages.close(&principal, &page.id).await;
                }
                self.contexts
                    .delete(&context.id)
                    .await
                    .map_err(|e| ErrorEnvelope::internal(e.to_string()))?;
                Ok((200, json!({ "deleted": true, "contextId": id })))
            }
            Operation::ExecuteInContext {
                context_id,
                page_id,
                action_type,
                params,
                timeout_ms,
            } => {
                let principal = principal.ok_or_else(no_principal)?;
                let context = self.owned_context(&principal, &context_id).await?;
                let page_id = match page_id {
                    Some(id) => id,
                    None => self
                        .pages
                        .list_by_context(&context.id)
                        .await
                        .first()
                        .map(|p| p.id.clone())
                        .ok_or_else(|| {
                            ErrorEnvelope::new(
                                codes::RESOURCE_NOT_FOUND,
                                ErrorCategory::Resource,
                                "The context has no pages",
                            )
                            .tag("resource", context.id.clone())
                        })?,
                };
                self.run_action(
                    &principal,
                    page_id,
                    action_type,
                    params,
                    timeout_ms,
                    request_id,
                )
                .await
            }

            Operation::CreatePage { context_id, options } => {
                let principal = principal.ok_or_else(no_principal)?;
                let options = serde_json::from_value(options).map_err(|e| {
                    ErrorEnvelope::new(
                        codes::VALIDATION_FAILED,
                        ErrorCategory::Validation,
                        format!("invalid page options: {e}"),
                    )
                })?;
                let info = self
                    .pages
                    .create_page(&principal, &context_id, options)
                    .await
                    .map_err(|e| e.to_envelope())?;
                Ok((201, json!({ "pageId": info.id, "page": info })))
            }
            Operation::GetPage { id } => {
                let principal = principal.ok_or_else(no_principal)?;
                let info = self
                    .pages
                    .get(&principal, &id)
                    .await
                    .map_err(|e| e.to_envelope())?;
                Ok((200, serde_json::to_value(&info).unwrap_or_default()))
            }
            Operation::DeletePage { id } => {
                let principal = principal.ok_or_else(no_principal)?;
                self.pages
                    .close(&principal, &id)
                    .await
                    .map_err(|e| e.to_envelope())?;
                Ok((200, json!({ "deleted": true, "pageId": id })))
            }
            Operation::PageAction {
                page_id,
                action_type,
                params,
                timeout_ms,
            } => {
                let principal = principal.ok_or_else(no_principal)?;
                self.run_action(
                    &principal,
                    page_id,
                    action_type,
                    params,
                    timeout_ms,
                    request_id,
                )
                .await
            }

            Operation::AdminListSessions => {
                let principal = principal.ok_or_else(no_principal)?;
                if !principal.is_admin() {
                    self.audit.record(
                        AuditKind::AccessDenied,
                        "admin:sessions",
                        "list",
                        "failure",
                        Some("admin role required".to_string()),
                        &origin,
                    );
                    return Err(AuthError::InsufficientRole {
                        required: "admin".to_string(),
                    }
                    .to_envelope());
                }
                // Placeholder endpoint: audited, then reported unimplemented.
                self.audit.record(
                    AuditKind::AccessGranted,
                    "admin:sessions",
                    "list",
                    "noop",
                    Some("endpoint not implemented".to_string()),
                    &origin,
                );
                Err(ErrorEnvelope::new(
                    codes::NOT_IMPLEMENTED,
                    ErrorCategory::System,
                    "Session listing is not implemented",
                ))
            }
        }
    }

    async fn owned_context(
        &self,
        principal: &Principal,
        context_id: &str,
    ) -> Result<Context, ErrorEnvelope> {
        let session = self
            .sessions
            .get(&principal.session_id)
            .await
            .map_err(|e| ErrorEnvelope::internal(e.to_string()))?
            .ok_or_else(|| AuthError::InvalidSession.to_envelope())?;
        let context = self
            .contexts
            .get(context_id)
            .await
            .map_err(|e| ErrorEnvelope::internal(e.to_string()))?
            .ok_or_else(|| {
                ErrorEnvelope::new(
                    codes::RESOURCE_NOT_FOUND,
                    ErrorCategory::Resource,
                    "The requested context does not exist",
                )
                .tag("resource", context_id.to_string())
            })?;
        if !context.owned_by(&session) {
            return Err(AuthError::AccessDenied {
                resource: format!("context:{context_id}"),
            }
            .to_envelope());
        }
        Ok(context)
    }

    async fn teardown_session(
        &self,
        session_id: &str,
        origin: &RequestOrigin,
    ) -> Result<(), ErrorEnvelope> {
        // Pages first, then contexts, then the lease, then the session.
        // Ownership was already established by the caller.
        self.pages.close_by_session(session_id).await;
        self.contexts
            .delete_by_session(session_id)
            .await
            .map_err(|e| ErrorEnvelope::internal(e.to_string()))?;
        self.pool.release_session(session_id).await;
        self.gate
            .revoke(session_id, origin)
            .await
            .map_err(|e| e.to_envelope())?;
        Ok(())
    }

    async fn run_action(
        &self,
        principal: &Principal,
        page_id: String,
        action_type: String,
        params: Value,
        timeout_ms: Option<u64>,
        request_id: &str,
    ) -> Result<(u16, Value), ErrorEnvelope> {
        let invocation = ActionInvocation {
            action_type,
            page_id,
            parameters: params,
            timeout: timeout_ms.map(Duration::from_millis),
            principal: principal.clone(),
            correlation_id: request_id.to_string(),
        };
        let result = self.executor.execute(invocation).await;
        if result.success {
            Ok((200, serde_json::to_value(&result).unwrap_or_default()))
        } else {
            let envelope = result
                .error
                .clone()
                .unwrap_or_else(|| ErrorEnvelope::internal("action failed without envelope"));
            Err(envelope)
        }
    }

    fn frame_success(&self, record: &InvocationRecord, status: u16, data: Value) -> Value {
        match record.protocol {
            Protocol::Rest | Protocol::Grpc => json!({ "success": true, "data": data }),
            Protocol::Websocket => json!({
                "type": "result",
                "id": record.message_id,
                "success": true,
                "data": data,
            }),
            Protocol::Mcp => {
                let text = serde_json::to_string(&data).unwrap_or_default();
                json!({
                    "jsonrpc": "2.0",
                    "id": record.message_id.clone().unwrap_or(Value::Null),
                    "result": {
                        "content": [{ "type": "text", "text": text }],
                        "metadata": {
                            "status": status,
                            "requestId": record.request_id,
                            "timestamp": chrono::Utc::now(),
                        },
                    },
                })
            }
        }
    }

    fn frame_error(
        &self,
        record: &InvocationRecord,
        envelope: &ErrorEnvelope,
        duration: std::time::Duration,
    ) -> Value {
        match record.protocol {
            Protocol::Rest => {
                let meta = RestMeta {
                    version: "v1".to_string(),
                    endpoint: record.resource_path.clone().unwrap_or_default(),
                    method: record.method.clone(),
                    request_duration_ms: Some(duration.as_millis() as u64),
                };
                projection::rest(envelope, &meta).body
            }
            Protocol::Grpc => {
                let projected = projection::grpc(envelope);
                json!({
                    "grpcStatus": projected.status as i32,
                    "message": projected.message,
                    "details": projected.details,
                })
            }
            Protocol::Websocket => {
                let connection_id = record
                    .headers
                    .get("x-connection-id")
                    .cloned()
                    .unwrap_or_default();
                projection::websocket(
                    envelope,
                    record.message_id.as_ref().and_then(|v| v.as_str()),
                    &connection_id,
                )
            }
            Protocol::Mcp => projection::mcp(
                envelope,
                record.message_id.as_ref().unwrap_or(&Value::Null),
            ),
        }
    }
}

/// Parse the protocol-specific shape into an [`Operation`].
fn parse_operation(record: &InvocationRecord) -> Result<Operation, ErrorEnvelope> {
    match record.protocol {
        Protocol::Rest => parse_rest(record),
        Protocol::Grpc => parse_grpc(record),
        Protocol::Websocket => parse_websocket(record),
        Protocol::Mcp => parse_mcp(record),
    }
}

/// Guard for the routing invariant that non-public operations always
/// carry a principal.
fn no_principal() -> ErrorEnvelope {
    ErrorEnvelope::internal("operation routed without a principal")
}

fn unknown_route(detail: impl std::fmt::Display) -> ErrorEnvelope {
    ErrorEnvelope::new(
        codes::RESOURCE_NOT_FOUND,
        ErrorCategory::Resource,
        format!("No such operation: {detail}"),
    )
    .suggest(RecoverySuggestion::CheckRequestFormat)
}

fn bad_request(detail: impl std::fmt::Display) -> ErrorEnvelope {
    ErrorEnvelope::new(
        codes::VALIDATION_FAILED,
        ErrorCategory::Validation,
        format!("{detail}"),
    )
    .suggest(RecoverySuggestion::CheckRequestFormat)
}

fn body_str(body: &Value, field: &str) -> Result<String, ErrorEnvelope> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| bad_request(format!("missing field {field:?}")))
}

fn action_from_body(body: &Value) -> Result<(String, Value, Option<u64>), ErrorEnvelope> {
    let action_type = body
        .get("action")
        .or_else(|| body.get("actionType"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| bad_request("missing field \"action\""))?;
    let params = body
        .get("params")
        .or_else(|| body.get("parameters"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let timeout_ms = body.get("timeoutMs").and_then(Value::as_u64);
    Ok((action_type, params, timeout_ms))
}

#[allow(clippy::too_many_lines)]
fn parse_rest(record: &InvocationRecord) -> Result<Operation, ErrorEnvelope> {
    let path = record
        .resource_path
        .as_deref()
        .ok_or_else(|| bad_request("missing resource path"))?;
    let trimmed = path.trim_start_matches("/api/v1").trim_matches('/');
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    let method = record.method.as_str();

    match (method, segments.as_slice()) {
        ("GET", ["health"]) => Ok(Operation::Health),
        ("GET", ["ready"]) => Ok(Operation::Ready),
        ("GET", ["metrics"]) => Ok(Operation::Metrics),

        ("POST", ["sessions"]) => Ok(Operation::CreateSession {
            username: body_str(&record.body, "username")?,
            password: body_str(&record.body, "password")?,
        }),
        ("POST", ["sessions", "refresh"]) => Ok(Operation::RefreshSession),
        ("POST", ["sessions", "revoke"]) => Ok(Operation::RevokeSession {
            id: record
                .body
                .get("sessionId")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        ("GET", ["sessions", id]) => Ok(Operation::GetSession {
            id: (*id).to_string(),
        }),
        ("DELETE", ["sessions", id]) => Ok(Operation::DeleteSession {
            id: (*id).to_string(),
        }),

        ("POST", ["contexts"]) => Ok(Operation::CreateContext {
            name: record
                .body
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("default")
                .to_string(),
            config: record
                .body
                .get("config")
                .cloned()
                .unwrap_or_else(|| json!({})),
        }),
        ("GET", ["contexts"]) => Ok(Operation::ListContexts),
        ("GET", ["contexts", id]) => Ok(Operation::GetContext {
            id: (*id).to_string(),
        }),
        ("DELETE", ["contexts", id]) => Ok(Operation::DeleteContext {
            id: (*id).to_string(),
        }),
        ("POST", ["contexts", id, "execute"]) => {
            let (action_type, params, timeout_ms) = action_from_body(&record.body)?;
            Ok(Operation::ExecuteInContext {
                context_id: (*id).to_string(),
                page_id: record
                    .body
                    .get("pageId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                action_type,
                params,
                timeout_ms,
            })
        }

        ("POST", ["pages"]) => Ok(Operation::CreatePage {
            context_id: body_str(&record.body, "contextId")?,
            options: record
                .body
                .get("options")
                .cloned()
                .unwrap_or_else(|| json!({})),
        }),
        ("GET", ["pages", id]) => Ok(Operation::GetPage {
            id: (*id).to_string(),
        }),
        ("DELETE", ["pages", id]) => Ok(Operation::DeletePage {
            id: (*id).to_string(),
        }),
        ("POST", ["pages", id, "navigate"]) => Ok(Operation::PageAction {
            page_id: (*id).to_string(),
            action_type: "navigate".to_string(),
            params: record.body.clone(),
            timeout_ms: record.body.get("timeoutMs").and_then(Value::as_u64),
        }),
        ("POST", ["pages", id, "screenshot"]) => Ok(Operation::PageAction {
            page_id: (*id).to_string(),
            action_type: "screenshot".to_string(),
            params: record.body.clone(),
            timeout_ms: None,
        }),
        ("POST", ["pages", id, "evaluate"]) => Ok(Operation::PageAction {
            page_id: (*id).to_string(),
            action_type: "evaluate".to_string(),
            params: record.body.clone(),
            timeout_ms: None,
        }),
        ("POST", ["pages", id, "actions"]) => {
            let (action_type, params, timeout_ms) = action_from_body(&record.body)?;
            Ok(Operation::PageAction {
                page_id: (*id).to_string(),
                action_type,
                params,
                timeout_ms,
            })
        }

        ("GET", ["admin", "sessions"]) => Ok(Operation::AdminListSessions),

        _ => Err(unknown_route(format!("{method} {path}"))),
    }
}

fn parse_grpc(record: &InvocationRecord) -> Result<Operation, ErrorEnvelope> {
    let operation = record
        .operation
        .as_ref()
        .ok_or_else(|| bad_request("missing gRPC operation"))?;
    let method = operation
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_request("missing gRPC method"))?;
    let body = &record.body;

    match method {
        "CreateSession" => Ok(Operation::CreateSession {
            username: body_str(body, "username")?,
            password: body_str(body, "password")?,
        }),
        "GetSession" => Ok(Operation::GetSession {
            id: body_str(body, "sessionId")?,
        }),
        "DeleteSession" => Ok(Operation::DeleteSession {
            id: body_str(body, "sessionId")?,
        }),
        "CreateContext" => Ok(Operation::CreateContext {
            name: body
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("default")
                .to_string(),
            config: body.get("config").cloned().unwrap_or_else(|| json!({})),
        }),
        "ListContexts" => Ok(Operation::ListContexts),
        "GetContext" => Ok(Operation::GetContext {
            id: body_str(body, "contextId")?,
        }),
        "DeleteContext" => Ok(Operation::DeleteContext {
            id: body_str(body, "contextId")?,
        }),
        // StreamCommand shares ExecuteCommand's unary semantics here; the
        // transport layer owns the streaming frame.
        "ExecuteCommand" | "StreamCommand" => {
            let (action_type, params, timeout_ms) = action_from_body(body)?;
            Ok(Operation::ExecuteInContext {
                context_id: body_str(body, "contextId")?,
                page_id: body
                    .get("pageId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                action_type,
                params,
                timeout_ms,
            })
        }
        "CreatePage" => Ok(Operation::CreatePage {
            context_id: body_str(body, "contextId")?,
            options: body.get("options").cloned().unwrap_or_else(|| json!({})),
        }),
        "GetPage" => Ok(Operation::GetPage {
            id: body_str(body, "pageId")?,
        }),
        "DeletePage" => Ok(Operation::DeletePage {
            id: body_str(body, "pageId")?,
        }),
        other => Err(unknown_route(format!("grpc method {other:?}"))),
    }
}

fn parse_websocket(record: &InvocationRecord) -> Result<Operation, ErrorEnvelope> {
    let message_type = record.method.as_str();
    let data = record.body.get("data").cloned().unwrap_or_else(|| json!({}));
    let method = record
        .body
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("");

    match message_type {
        "ping" => Ok(Operation::Ping),
        "auth" => Ok(Operation::Authenticate),
        "session" => match method {
            "create" => Ok(Operation::CreateSession {
                username: body_str(&data, "username")?,
                password: body_str(&data, "password")?,
            }),
            "get" => Ok(Operation::GetSession {
                id: body_str(&data, "sessionId")?,
            }),
            "delete" => Ok(Operation::DeleteSession {
                id: body_str(&data, "sessionId")?,
            }),
            "refresh" => Ok(Operation::RefreshSession),
            other => Err(unknown_route(format!("session method {other:?}"))),
        },
        "context" => match method {
            "create" => Ok(Operation::CreateContext {
                name: data
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("default")
                    .to_string(),
                config: data.get("config").cloned().unwrap_or_else(|| json!({})),
            }),
            "list" => Ok(Operation::ListContexts),
            "get" => Ok(Operation::GetContext {
                id: body_str(&data, "contextId")?,
            }),
            "delete" => Ok(Operation::DeleteContext {
                id: body_str(&data, "contextId")?,
            }),
            "execute" => {
                let (action_type, params, timeout_ms) = action_from_body(&data)?;
                Ok(Operation::ExecuteInContext {
                    context_id: body_str(&data, "contextId")?,
                    page_id: data
                        .get("pageId")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    action_type,
                    params,
                    timeout_ms,
                })
            }
            other => Err(unknown_route(format!("context method {other:?}"))),
        },
        "action" => {
            let (action_type, params, timeout_ms) = action_from_body(&data)?;
            Ok(Operation::PageAction {
                page_id: body_str(&data, "pageId")?,
                action_type,
                params,
                timeout_ms,
            })
        }
        "page" => match method {
            "create" => Ok(Operation::CreatePage {
                context_id: body_str(&data, "contextId")?,
                options: data.get("options").cloned().unwrap_or_else(|| json!({})),
            }),
            "get" => Ok(Operation::GetPage {
                id: body_str(&data, "pageId")?,
            }),
            "close" | "delete" => Ok(Operation::DeletePage {
                id: body_str(&data, "pageId")?,
            }),
            other => Err(unknown_route(format!("page method {other:?}"))),
        },
        "subscribe" => Err(ErrorEnvelope::new(
            codes::NOT_IMPLEMENTED,
            ErrorCategory::System,
            "Topic subscriptions are handled by the transport layer",
        )),
        other => Err(unknown_route(format!("message type {other:?}"))),
    }
}

fn parse_mcp(record: &InvocationRecord) -> Result<Operation, ErrorEnvelope> {
    match record.method.as_str() {
        "tools/list" => Ok(Operation::ListTools),
        "resources/read" => {
            let uri = record
                .body
                .get("uri")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if uri == "api://catalog" {
                Ok(Operation::ReadCatalog)
            } else {
                Err(unknown_route(format!("resource {uri:?}")))
            }
        }
        "tools/call" => {
            let operation = record
                .operation
                .as_ref()
                .ok_or_else(|| bad_request("missing tool call"))?;
            let name = operation
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if name != "execute-api" {
                return Err(unknown_route(format!("tool {name:?}")));
            }
            let arguments = operation
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let inner = arguments
                .get("operation")
                .cloned()
                .ok_or_else(|| bad_request("execute-api requires an operation"))?;

            // The generic tool wraps a REST-shaped description of the call.
            let inner_record = InvocationRecord {
                protocol: Protocol::Rest,
                method: inner
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or("GET")
                    .to_string(),
                resource_path: inner
                    .get("path")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                body: inner.get("body").cloned().unwrap_or_else(|| json!({})),
                ..InvocationRecord::new(Protocol::Rest, "GET")
            };
            parse_rest(&inner_record)
        }
        other => Err(unknown_route(format!("jsonrpc method {other:?}"))),
    }
}

/// The MCP tool listing.
fn tool_catalog() -> Value {
    json!({
        "tools": [{
            "name": "execute-api",
            "description": "Execute a Corral control-plane operation over the selected protocol",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "protocol": { "type": "string", "enum": ["rest", "grpc", "websocket"] },
                    "operation": { "type": "object" },
                    "auth": { "type": "string" },
                    "sessionId": { "type": "string" },
                },
                "required": ["protocol", "operation"],
            },
        }],
    })
}

/// The `api://catalog` resource body.
fn api_catalog() -> Value {
    json!({
        "rest": {
            "prefix": "/api/v1",
            "endpoints": [
                "POST /sessions", "GET /sessions/:id", "DELETE /sessions/:id",
                "POST /sessions/refresh", "POST /sessions/revoke",
                "POST /contexts", "GET /contexts", "GET /contexts/:id",
                "DELETE /contexts/:id", "POST /contexts/:id/execute",
                "POST /pages", "GET /pages/:id", "DELETE /pages/:id",
                "POST /pages/:id/navigate", "POST /pages/:id/screenshot",
                "POST /pages/:id/evaluate", "GET /health", "GET /ready",
            ],
        },
        "grpc": {
            "service": "ContextService",
            "methods": [
                "CreateSession", "GetSession", "DeleteSession",
                "CreateContext", "ListContexts", "GetContext", "DeleteContext",
                "ExecuteCommand", "StreamCommand",
                "CreatePage", "GetPage", "DeletePage",
            ],
        },
        "websocket": {
            "path": "/ws",
            "types": ["auth", "session", "context", "action", "page", "subscribe", "ping"],
        },
    })
}

#[cfg(test)]
mod tests;

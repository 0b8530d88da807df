//! The action executor.
//!
//! Pipeline per invocation: validate, resolve the page (re-verifying the
//! ownership chain), dispatch to the handler, apply the per-type timeout,
//! retry transient failures with backoff and jitter, and record the result
//! with audit events. Retries happen only here; nothing else in the system
//! retries.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::auth::RequestOrigin;
use crate::auth::audit::{AuditKind, AuditLog};
use crate::engine::EngineError;
use crate::engine::EnginePage;
use crate::envelope::tracker::ErrorTracker;
use crate::envelope::{ErrorEnvelope, codes};
use crate::page::PageManager;

use super::handlers::{self, HandlerError};
use super::retry::RetryPolicy;
use super::validate;
use super::{ActionInvocation, ActionResult, ActionType};

/// Future type returned by extension handlers.
pub type ExtensionFuture =
    Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// A user-registered handler for an action type outside the fixed set.
pub type ExtensionHandler =
    Arc<dyn Fn(Value, Arc<dyn EnginePage>) -> ExtensionFuture + Send + Sync>;

/// The executor.
pub struct ActionExecutor {
    pages: Arc<PageManager>,
    retry: RetryPolicy,
    audit: Arc<AuditLog>,
    tracker: Arc<ErrorTracker>,
    extensions: parking_lot::RwLock<HashMap<String, ExtensionHandler>>,
}

impl ActionExecutor {
    /// Assemble an executor.
    pub fn new(
        pages: Arc<PageManager>,
        retry: RetryPolicy,
        audit: Arc<AuditLog>,
        tracker: Arc<ErrorTracker>,
    ) -> Self {
        Self {
            pages,
            retry,
            audit,
            tracker,
            extensions: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for a custom action type.
    ///
    /// The fixed action set always wins; extensions only serve types the
    /// tagged dispatch does not know.
    pub fn register_extension(&self, action_type: &str, handler: ExtensionHandler) {
        self.extensions
            .write()
            .insert(action_type.to_string(), handler);
    }

    /// Execute one invocation to completion.
    #[instrument(level = "debug", skip_all, fields(action = %invocation.action_type, page_id = %invocation.page_id))]
    pub async fn execute(&self, invocation: ActionInvocation) -> ActionResult {
        let started = Instant::now();
        let origin = RequestOrigin {
            method: invocation.action_type.clone(),
            ..RequestOrigin::default()
        };

        // Timeout override is validated before anything else.
        if let Some(overridden) = invocation.timeout {
            if let Err(failure) = validate::check_timeout(overridden) {
                return self.validation_failed(&invocation, &origin, failure, started);
            }
        }

        // Parse and validate, falling back to registered extensions for
        // unknown types.
        let request = match super::parse_request(&invocation.action_type, &invocation.parameters)
        {
            Ok(request) => request,
            Err(failure) if failure.code == codes::VALIDATION_UNKNOWN_ACTION => {
                let extension = self.extensions.read().get(&invocation.action_type).cloned();
                if let Some(handler) = extension {
                    return self.execute_extension(invocation, handler, started).await;
                }
                return self.validation_failed(&invocation, &origin, failure, started);
            }
            Err(failure) => {
                return self.validation_failed(&invocation, &origin, failure, started);
            }
        };

        // Resolve the page; this re-verifies the ownership chain.
        let (_, page) = match self
            .pages
            .resolve(&invocation.principal, &invocation.page_id)
            .await
        {
            Ok(resolved) => resolved,
            Err(err) => {
                let envelope = err
                    .to_envelope()
                    .request_id(invocation.correlation_id.clone())
                    .tag("operation", invocation.action_type.clone())
                    .tag("resource", invocation.page_id.clone());
                self.audit.record(
                    AuditKind::AccessDenied,
                    format!("page:{}", invocation.page_id),
                    invocation.action_type.clone(),
                    "failure",
                    Some(envelope.user_message.clone()),
                    &origin,
                );
                self.tracker.record(&envelope);
                return ActionResult::failed(
                    &invocation.action_type,
                    envelope,
                    started.elapsed(),
                );
            }
        };

        let timeout = invocation
            .timeout
            .unwrap_or_else(|| request.action_type().default_timeout())
            .min(super::MAX_TIMEOUT);

        let is_navigate = request.action_type() == ActionType::Navigate;
        if is_navigate {
            self.pages.mark_navigating(&invocation.page_id).await;
        }

        let mut attempts: u32 = 0;
        let outcome = loop {
            attempts += 1;
            let attempt_result =
                tokio::time::timeout(timeout, handlers::run(&request, &page, timeout)).await;
            let error = match attempt_result {
                Ok(Ok(data)) => break Ok(data),
                Ok(Err(err)) => err,
                Err(_) => HandlerError::Engine(EngineError::Timeout {
                    what: invocation.action_type.clone(),
                }),
            };

            let may_retry = error.is_transient()
                && request.is_retryable()
                && attempts < self.retry.max_attempts;
            if !may_retry {
                break Err(error);
            }
            let delay = self.retry.delay(attempts - 1);
            debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying transient action failure"
            );
            tokio::time::sleep(delay).await;
        };

        if is_navigate {
            let final_url = match &outcome {
                Ok(data) => data["finalUrl"].as_str().map(str::to_string),
                Err(_) => None,
            };
            self.pages
                .finish_navigation(&invocation.page_id, final_url.as_deref(), outcome.is_ok())
                .await;
        }

        match outcome {
            Ok(data) => {
                self.audit.record(
                    AuditKind::ActionExecuted,
                    format!("page:{}", invocation.page_id),
                    invocation.action_type.clone(),
                    "success",
                    None,
                    &origin,
                );
                let mut result =
                    ActionResult::ok(&invocation.action_type, data, started.elapsed());
                result
                    .metadata
                    .insert("attempts".to_string(), Value::from(attempts));
                result.metadata.insert(
                    "pageId".to_string(),
                    Value::from(invocation.page_id.clone()),
                );
                result
            }
            Err(error) => {
                if !matches!(error, HandlerError::NavigationStatus { .. }) {
                    self.pages.record_page_error(&invocation.page_id).await;
                }
                let envelope = error
                    .to_envelope()
                    .request_id(invocation.correlation_id.clone())
                    .tag("operation", invocation.action_type.clone())
                    .tag("resource", invocation.page_id.clone());
                warn!(error = %error, attempts, "action failed");
                self.audit.record(
                    AuditKind::ActionFailed,
                    format!("page:{}", invocation.page_id),
                    invocation.action_type.clone(),
                    "failure",
                    Some(envelope.user_message.clone()),
                    &origin,
                );
                self.tracker.record(&envelope);
                let mut result =
                    ActionResult::failed(&invocation.action_type, envelope, started.elapsed());
                result
                    .metadata
                    .insert("attempts".to_string(), Value::from(attempts));
                result
            }
        }
    }

    async fn execute_extension(
        &self,
        invocation: ActionInvocation,
        handler: ExtensionHandler,
        started: Instant,
    ) -> ActionResult {
        let resolved = self
            .pages
            .resolve(&invocation.principal, &invocation.page_id)
            .await;
        let (_, page) = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                let envelope = err
                    .to_envelope()
                    .request_id(invocation.correlation_id.clone());
                return ActionResult::failed(
                    &invocation.action_type,
                    envelope,
                    started.elapsed(),
                );
            }
        };

        let timeout = invocation
            .timeout
            .unwrap_or(super::EXTRACTION_TIMEOUT)
            .min(super::MAX_TIMEOUT);
        // Extensions run once; the executor never retries them.
        let outcome =
            tokio::time::timeout(timeout, handler(invocation.parameters.clone(), page)).await;
        match outcome {
            Ok(Ok(data)) => ActionResult::ok(&invocation.action_type, data, started.elapsed()),
            Ok(Err(error)) => {
                let envelope = error
                    .to_envelope()
                    .request_id(invocation.correlation_id.clone());
                self.tracker.record(&envelope);
                ActionResult::failed(&invocation.action_type, envelope, started.elapsed())
            }
            Err(_) => {
                let envelope = ErrorEnvelope::new(
                    codes::ACTION_TIMEOUT,
                    crate::envelope::ErrorCategory::Browser,
                    "The action timed out",
                )
                .request_id(invocation.correlation_id.clone());
                self.tracker.record(&envelope);
                ActionResult::failed(&invocation.action_type, envelope, started.elapsed())
            }
        }
    }

    fn validation_failed(
        &self,
        invocation: &ActionInvocation,
        origin: &RequestOrigin,
        failure: validate::ValidationFailure,
        started: Instant,
    ) -> ActionResult {
        let envelope = failure
            .to_envelope()
            .request_id(invocation.correlation_id.clone())
            .tag("operation", invocation.action_type.clone());
        self.audit.record(
            AuditKind::ValidationFailure,
            format!("page:{}", invocation.page_id),
            invocation.action_type.clone(),
            "failure",
            Some(failure.message.clone()),
            origin,
        );
        self.tracker.record(&envelope);
        ActionResult::failed(&invocation.action_type, envelope, started.elapsed())
    }
}

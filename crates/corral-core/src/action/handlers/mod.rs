//! Action handlers.
//!
//! One handler per action variant, each driving the engine page API. The
//! executor owns timeouts and retries; handlers only perform the work and
//! shape the result payload.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::engine::{EngineError, EnginePage, PageEvent};
use crate::envelope::{
    ErrorCategory, ErrorEnvelope, RecoverySuggestion, codes,
};

use super::validate::{MAX_FILE_BYTES, MAX_TOTAL_FILE_BYTES};
use super::{ActionRequest, CookieOp, WaitStrategy};

/// Poll interval for function waits.
const FUNCTION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handler-level failures that are not engine errors.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Navigation completed outside the success status range.
    #[error("navigation returned status {status}")]
    NavigationStatus {
        /// The final status.
        status: u16,
        /// The handler payload describing the navigation.
        data: Value,
    },
    /// An upload file failed the size policy.
    #[error("upload rejected: {0}")]
    UploadRejected(String),
    /// The upload target is not a file input.
    #[error("upload target is not a file input")]
    NotFileInput,
}

impl HandlerError {
    /// Whether a retry can plausibly help.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Engine(err) => err.is_transient(),
            Self::NavigationStatus { .. } | Self::UploadRejected(_) | Self::NotFileInput => false,
        }
    }

    /// Project onto the canonical envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::Engine(EngineError::SelectorNotFound(selector)) => ErrorEnvelope::new(
                codes::RESOURCE_NOT_FOUND,
                ErrorCategory::Resource,
                "No element matches the selector",
            )
            .details(json!({ "selector": selector }))
            .suggest(RecoverySuggestion::VerifyResourceExists),
            Self::Engine(EngineError::Timeout { what }) => ErrorEnvelope::new(
                codes::ACTION_TIMEOUT,
                ErrorCategory::Browser,
                "The action timed out",
            )
            .details(json!({ "while": what }))
            .retry(crate::envelope::RetryAdvice::transient())
            .suggest(RecoverySuggestion::WaitAndRetry),
            Self::Engine(EngineError::Evaluation(message)) => ErrorEnvelope::new(
                codes::BROWSER_ACTION_FAILED,
                ErrorCategory::Browser,
                "Script evaluation failed",
            )
            .details(json!({ "message": message })),
            Self::Engine(err) => ErrorEnvelope::new(
                codes::BROWSER_ACTION_FAILED,
                ErrorCategory::Browser,
                "The browser engine failed the action",
            )
            .details(json!({ "engine": err.to_string() })),
            Self::NavigationStatus { status, data } => ErrorEnvelope::new(
                codes::NAVIGATION_FAILED,
                ErrorCategory::Network,
                format!("Navigation returned HTTP {status}"),
            )
            .details(data.clone()),
            Self::UploadRejected(reason) => ErrorEnvelope::new(
                codes::VALIDATION_UNSAFE_FILE,
                ErrorCategory::Validation,
                reason.clone(),
            )
            .sensitive(),
            Self::NotFileInput => ErrorEnvelope::new(
                codes::VALIDATION_FAILED,
                ErrorCategory::Validation,
                "The target element is not a file input",
            ),
        }
    }
}

/// Execute one parsed action against an engine page.
///
/// `timeout` is the action deadline the executor also enforces from the
/// outside; handlers pass it to engine waits that poll.
///
/// # Errors
///
/// Returns a [`HandlerError`] on any failure.
pub async fn run(
    request: &ActionRequest,
    page: &Arc<dyn EnginePage>,
    timeout: Duration,
) -> Result<Value, HandlerError> {
    match request {
        ActionRequest::Navigate {
            url,
            wait_until,
            referer,
        } => {
            let outcome = page
                .goto(url, *wait_until, referer.as_deref(), timeout)
                .await?;
            let data = json!({
                "url": outcome.url,
                "finalUrl": outcome.final_url,
                "status": outcome.status,
                "statusText": outcome.status_text,
                "headers": outcome.headers,
            });
            // Success iff the final status is in [200, 400).
            match outcome.status {
                Some(status) if !(200..400).contains(&status) => {
                    Err(HandlerError::NavigationStatus { status, data })
                }
                _ => Ok(data),
            }
        }

        ActionRequest::Click {
            selector,
            click_count,
        } => {
            page.wait_for_selector(selector, true, timeout).await?;
            if !page.is_in_viewport(selector).await? {
                page.scroll_into_view(selector).await?;
            }
            page.click(selector, *click_count).await?;
            Ok(json!({ "selector": selector, "clicked": true }))
        }

        ActionRequest::Type { selector, text } => {
            page.wait_for_selector(selector, true, timeout).await?;
            if !page.is_in_viewport(selector).await? {
                page.scroll_into_view(selector).await?;
            }
            page.type_text(selector, text).await?;
            Ok(json!({ "selector": selector, "typed": text.len() }))
        }

        ActionRequest::Select { selector, values } => {
            page.wait_for_selector(selector, true, timeout).await?;
            let selected = page.select_options(selector, values).await?;
            Ok(json!({ "selector": selector, "selected": selected }))
        }

        ActionRequest::Keyboard { key } => {
            page.press_key(key).await?;
            Ok(json!({ "key": key }))
        }

        ActionRequest::Mouse { action } => {
            page.mouse(*action).await?;
            Ok(json!({ "dispatched": true }))
        }

        ActionRequest::Screenshot { options } => {
            let bytes = page.screenshot(options).await?;
            Ok(json!({
                "data": BASE64.encode(&bytes),
                "encoding": "base64",
                "format": options.format,
                "bytes": bytes.len(),
            }))
        }

        ActionRequest::Pdf { options } => {
            let bytes = page.pdf(options).await?;
            Ok(json!({
                "data": BASE64.encode(&bytes),
                "encoding": "base64",
                "bytes": bytes.len(),
            }))
        }

        ActionRequest::Wait { strategy } => run_wait(strategy, page, timeout).await,

        ActionRequest::Scroll {
            selector,
            delta_x,
            delta_y,
        } => {
            if let Some(selector) = selector {
                page.wait_for_selector(selector, false, timeout).await?;
                page.scroll_into_view(selector).await?;
            } else {
                page.scroll_by(*delta_x, *delta_y).await?;
            }
            Ok(json!({ "scrolled": true }))
        }

        ActionRequest::Evaluate { script } => {
            let value = page.evaluate(script).await?;
            Ok(json!({ "result": value }))
        }

        ActionRequest::Upload { selector, files } => {
            let mut total: u64 = 0;
            for file in files {
                let metadata = tokio::fs::metadata(file).await.map_err(|e| {
                    HandlerError::UploadRejected(format!("file not readable: {e}"))
                })?;
                if metadata.len() > MAX_FILE_BYTES {
                    return Err(HandlerError::UploadRejected(
                        "file exceeds the 10 MiB limit".to_string(),
                    ));
                }
                total += metadata.len();
            }
            if total > MAX_TOTAL_FILE_BYTES {
                return Err(HandlerError::UploadRejected(
                    "files exceed the 50 MiB combined limit".to_string(),
                ));
            }

            page.wait_for_selector(selector, false, timeout).await?;
            // The target must be a file input when its type is knowable.
            if let Some(input_type) = page.attribute(selector, "type").await? {
                if input_type != "file" {
                    return Err(HandlerError::NotFileInput);
                }
            }
            page.set_input_files(selector, files).await?;
            Ok(json!({ "selector": selector, "files": files.len() }))
        }

        ActionRequest::Cookie { op } => run_cookie(op, page).await,

        ActionRequest::GetAttribute { selector, name } => {
            page.wait_for_selector(selector, false, timeout).await?;
            let value = page.attribute(selector, name).await?;
            Ok(json!({ "selector": selector, "name": name, "value": value }))
        }

        ActionRequest::Content => {
            let html = page.content().await?;
            Ok(json!({ "content": html }))
        }
    }
}

async fn run_wait(
    strategy: &WaitStrategy,
    page: &Arc<dyn EnginePage>,
    timeout: Duration,
) -> Result<Value, HandlerError> {
    match strategy {
        WaitStrategy::Selector { selector, visible } => {
            page.wait_for_selector(selector, *visible, timeout).await?;
            Ok(json!({ "strategy": "selector", "matched": selector }))
        }
        WaitStrategy::Timeout { duration } => {
            sleep(*duration).await;
            Ok(json!({ "strategy": "timeout", "waitedMs": duration.as_millis() as u64 }))
        }
        WaitStrategy::Navigation | WaitStrategy::NetworkIdle | WaitStrategy::LoadState { .. } => {
            let mut events = page.events();
            let until = Instant::now() + timeout;
            loop {
                let remaining = until.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(HandlerError::Engine(EngineError::Timeout {
                        what: "wait".to_string(),
                    }));
                }
                match tokio::time::timeout(remaining, events.recv()).await {
                    Ok(Ok(PageEvent::LoadFinished)) => {
                        return Ok(json!({ "strategy": "load" }));
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(_)) => {
                        return Err(HandlerError::Engine(EngineError::Closed));
                    }
                    Err(_) => {
                        return Err(HandlerError::Engine(EngineError::Timeout {
                            what: "wait".to_string(),
                        }));
                    }
                }
            }
        }
        WaitStrategy::Function { script } => {
            let until = Instant::now() + timeout;
            loop {
                let value = page.evaluate(script).await?;
                let truthy = match &value {
                    Value::Bool(b) => *b,
                    Value::Null => false,
                    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    Value::String(s) => !s.is_empty(),
                    _ => true,
                };
                if truthy {
                    return Ok(json!({ "strategy": "function", "result": value }));
                }
                if Instant::now() >= until {
                    return Err(HandlerError::Engine(EngineError::Timeout {
                        what: "waitForFunction".to_string(),
                    }));
                }
                debug!("wait function not yet truthy");
                sleep(FUNCTION_POLL_INTERVAL).await;
            }
        }
    }
}

async fn run_cookie(op: &CookieOp, page: &Arc<dyn EnginePage>) -> Result<Value, HandlerError> {
    match op {
        CookieOp::Set { cookies } => {
            page.set_cookies(cookies).await?;
            Ok(json!({ "operation": "set", "count": cookies.len() }))
        }
        CookieOp::Get { urls } => {
            let cookies = page.get_cookies(urls.as_deref()).await?;
            Ok(json!({ "operation": "get", "cookies": cookies }))
        }
        CookieOp::Delete { name, url } => {
            page.delete_cookies(name, url.as_deref()).await?;
            Ok(json!({ "operation": "delete", "name": name }))
        }
        CookieOp::Clear => {
            page.clear_cookies().await?;
            Ok(json!({ "operation": "clear" }))
        }
    }
}

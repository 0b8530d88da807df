//! # Actions
//!
//! A fixed set of automation commands against a page. The wire carries
//! `(actionType, parameters)`; parsing produces the tagged [`ActionRequest`]
//! variant, which the executor dispatches with an exhaustive match. A
//! registry remains only for user-extensible handlers registered at boot.

pub mod executor;
pub mod handlers;
pub mod retry;
pub mod validate;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Principal;
use crate::engine::{
    CaptureOptions, CookieData, LoadPhase, MouseAction, PdfOptions,
};
use crate::envelope::ErrorEnvelope;

use validate::ValidationFailure;

/// Default timeout for navigation-class actions.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Default timeout for interaction-class actions.
pub const INTERACTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for evaluation-class actions.
pub const EVALUATION_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for extraction-class actions.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on any action timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// The action types the executor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    /// Load a URL.
    Navigate,
    /// Click an element.
    Click,
    /// Type text into an element.
    Type,
    /// Select options of a `<select>`.
    Select,
    /// Press a named key.
    Keyboard,
    /// Dispatch a raw mouse action.
    Mouse,
    /// Capture a screenshot.
    Screenshot,
    /// Print to PDF.
    Pdf,
    /// Wait for a condition.
    Wait,
    /// Scroll the page or an element.
    Scroll,
    /// Evaluate JavaScript.
    Evaluate,
    /// Attach files to a file input.
    Upload,
    /// Cookie operations.
    Cookie,
    /// Read an attribute.
    GetAttribute,
    /// Read the document HTML.
    Content,
}

impl ActionType {
    /// Parse the wire name.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(Value::String(raw.to_string())).ok()
    }

    /// Wire name of the action type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::Select => "select",
            Self::Keyboard => "keyboard",
            Self::Mouse => "mouse",
            Self::Screenshot => "screenshot",
            Self::Pdf => "pdf",
            Self::Wait => "wait",
            Self::Scroll => "scroll",
            Self::Evaluate => "evaluate",
            Self::Upload => "upload",
            Self::Cookie => "cookie",
            Self::GetAttribute => "getAttribute",
            Self::Content => "content",
        }
    }

    /// The default timeout class for the type.
    pub fn default_timeout(self) -> Duration {
        match self {
            Self::Navigate | Self::Wait => NAVIGATION_TIMEOUT,
            Self::Click
            | Self::Type
            | Self::Select
            | Self::Keyboard
            | Self::Mouse
            | Self::Scroll
            | Self::Upload
            | Self::Cookie => INTERACTION_TIMEOUT,
            Self::Evaluate => EVALUATION_TIMEOUT,
            Self::Screenshot | Self::Pdf | Self::GetAttribute | Self::Content => {
                EXTRACTION_TIMEOUT
            }
        }
    }

    /// Whether transient failures of this type may be retried.
    ///
    /// Evaluation is never idempotent. Cookie retryability depends on the
    /// specific operation and is refined on the parsed request.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Evaluate)
    }
}

/// Wait strategies for the `wait` action.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitStrategy {
    /// Wait for a selector to match (and optionally be visible).
    Selector {
        /// The selector.
        selector: String,
        /// Require visibility.
        visible: bool,
    },
    /// Wait for the next navigation to finish.
    Navigation,
    /// Wait for network idle.
    NetworkIdle,
    /// Wait a fixed duration.
    Timeout {
        /// How long to wait.
        duration: Duration,
    },
    /// Wait until a function evaluates truthy.
    Function {
        /// The sanitized predicate script.
        script: String,
    },
    /// Wait for a document load state.
    LoadState {
        /// The phase to wait for.
        phase: LoadPhase,
    },
}

/// Cookie operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CookieOp {
    /// Set cookies.
    Set {
        /// Cookies to set.
        cookies: Vec<CookieData>,
    },
    /// Read cookies.
    Get {
        /// Restrict to these URLs.
        urls: Option<Vec<String>>,
    },
    /// Delete cookies by name.
    Delete {
        /// Cookie name.
        name: String,
        /// Restrict to this URL.
        url: Option<String>,
    },
    /// Clear all cookies.
    Clear,
}

/// A parsed, validated action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    /// Load a URL.
    Navigate {
        /// Sanitized URL.
        url: String,
        /// Load phase to wait for.
        wait_until: LoadPhase,
        /// Referer header.
        referer: Option<String>,
    },
    /// Click an element.
    Click {
        /// Target selector.
        selector: String,
        /// Click count (2 = double click).
        click_count: u32,
    },
    /// Type text into an element.
    Type {
        /// Target selector.
        selector: String,
        /// Text to type (printable ASCII).
        text: String,
    },
    /// Select `<select>` options by value.
    Select {
        /// Target selector.
        selector: String,
        /// Values to select.
        values: Vec<String>,
    },
    /// Press a named key.
    Keyboard {
        /// Key name.
        key: String,
    },
    /// Raw mouse action.
    Mouse {
        /// The operation.
        action: MouseAction,
    },
    /// Capture a screenshot.
    Screenshot {
        /// Capture options.
        options: CaptureOptions,
    },
    /// Print to PDF.
    Pdf {
        /// PDF options.
        options: PdfOptions,
    },
    /// Wait for a condition.
    Wait {
        /// The strategy.
        strategy: WaitStrategy,
    },
    /// Scroll the page or an element into view.
    Scroll {
        /// Element to scroll into view, when given.
        selector: Option<String>,
        /// Horizontal delta.
        delta_x: f64,
        /// Vertical delta.
        delta_y: f64,
    },
    /// Evaluate JavaScript.
    Evaluate {
        /// Sanitized script.
        script: String,
    },
    /// Attach files to a file input.
    Upload {
        /// Target selector.
        selector: String,
        /// Validated file paths.
        files: Vec<PathBuf>,
    },
    /// Cookie operation.
    Cookie {
        /// The operation.
        op: CookieOp,
    },
    /// Read an attribute of an element.
    GetAttribute {
        /// Target selector.
        selector: String,
        /// Attribute name.
        name: String,
    },
    /// Read the document HTML.
    Content,
}

impl ActionRequest {
    /// The type tag of this request.
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Navigate { .. } => ActionType::Navigate,
            Self::Click { .. } => ActionType::Click,
            Self::Type { .. } => ActionType::Type,
            Self::Select { .. } => ActionType::Select,
            Self::Keyboard { .. } => ActionType::Keyboard,
            Self::Mouse { .. } => ActionType::Mouse,
            Self::Screenshot { .. } => ActionType::Screenshot,
            Self::Pdf { .. } => ActionType::Pdf,
            Self::Wait { .. } => ActionType::Wait,
            Self::Scroll { .. } => ActionType::Scroll,
            Self::Evaluate { .. } => ActionType::Evaluate,
            Self::Upload { .. } => ActionType::Upload,
            Self::Cookie { .. } => ActionType::Cookie,
            Self::GetAttribute { .. } => ActionType::GetAttribute,
            Self::Content => ActionType::Content,
        }
    }

    /// Whether a transient failure may be retried.
    ///
    /// Evaluation, script injection and cookie mutations are not
    /// idempotent and are never retried; cookie reads are.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Function waits inject script; treat like evaluate.
            Self::Wait {
                strategy: WaitStrategy::Function { .. },
            } => false,
            Self::Cookie { op } => matches!(op, CookieOp::Get { .. }),
            _ => self.action_type().is_retryable(),
        }
    }
}

/// One request against one page. Ephemeral; does not outlive the request.
#[derive(Debug, Clone)]
pub struct ActionInvocation {
    /// Wire action type.
    pub action_type: String,
    /// Target page.
    pub page_id: String,
    /// Raw parameters from the wire.
    pub parameters: Value,
    /// Caller-supplied timeout override.
    pub timeout: Option<Duration>,
    /// The authenticated caller.
    pub principal: Principal,
    /// Correlation id propagated from the transport.
    pub correlation_id: String,
}

/// Result of one action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Whether the action succeeded.
    pub success: bool,
    /// Wire action type.
    pub action_type: String,
    /// Handler payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Envelope on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (attempts, page id).
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ActionResult {
    /// A successful result.
    pub fn ok(action_type: &str, data: Value, duration: Duration) -> Self {
        Self {
            success: true,
            action_type: action_type.to_string(),
            data: Some(data),
            error: None,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// A failed result.
    pub fn failed(action_type: &str, error: ErrorEnvelope, duration: Duration) -> Self {
        Self {
            success: false,
            action_type: action_type.to_string(),
            data: None,
            error: Some(error),
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// Parse and validate wire parameters into a request.
///
/// # Errors
///
/// Returns a [`ValidationFailure`] naming the offending field.
pub fn parse_request(action_type: &str, parameters: &Value) -> Result<ActionRequest, ValidationFailure> {
    let Some(kind) = ActionType::parse(action_type) else {
        return Err(ValidationFailure::unknown_action(action_type));
    };
    validate::parse_and_validate(kind, parameters)
}

#[cfg(test)]
mod tests;

//! Runtime domain types.
//!
//! JavaScript evaluation in the page context.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for Runtime.evaluate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    /// Expression to evaluate.
    pub expression: String,
    /// Return the result by value rather than as a remote object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    /// Await the result if it is a promise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
    /// Suppress exceptions being reported to the console.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
    /// Execution timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl EvaluateParams {
    /// Evaluate an expression and return the resolved value.
    pub fn by_value(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            return_by_value: Some(true),
            await_promise: Some(true),
            silent: Some(true),
            timeout: None,
        }
    }

    /// Evaluate an expression and keep the result as a remote object.
    pub fn by_object(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            return_by_value: Some(false),
            await_promise: Some(true),
            silent: Some(true),
            timeout: None,
        }
    }
}

/// A mirrored JavaScript object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Object type ("object", "string", "number", "undefined", ...).
    #[serde(rename = "type")]
    pub object_type: String,
    /// Primitive value or serialized object when returned by value.
    pub value: Option<Value>,
    /// Remote object identifier when not returned by value.
    pub object_id: Option<String>,
    /// Descriptive string representation.
    pub description: Option<String>,
}

/// Exception details raised during evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Short exception text.
    pub text: String,
    /// Line number of the throw site.
    pub line_number: u64,
    /// Column number of the throw site.
    pub column_number: u64,
    /// The thrown value, when available.
    pub exception: Option<RemoteObject>,
}

impl ExceptionDetails {
    /// Best human-readable rendering of the exception.
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Result of Runtime.evaluate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    /// Evaluation result.
    pub result: RemoteObject,
    /// Exception details if the expression threw.
    pub exception_details: Option<ExceptionDetails>,
}

/// Parameters for Runtime.releaseObject.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseObjectParams {
    /// Remote object to release.
    pub object_id: String,
}

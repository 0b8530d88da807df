//! Per-protocol projections of the canonical envelope.
//!
//! Each projection is a total function: every envelope yields a well-formed
//! response, and the embedded envelope JSON round-trips losslessly for the
//! identity-bearing fields.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ErrorEnvelope;

/// Security headers attached to every REST error response.
pub const REST_SECURITY_HEADERS: [(&str, &str); 4] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    ("Cache-Control", "no-store"),
];

/// Request metadata echoed in the REST error body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestMeta {
    /// API version string.
    pub version: String,
    /// Endpoint path that failed.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Total request duration in milliseconds, when measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_duration_ms: Option<u64>,
}

/// A projected REST error response.
#[derive(Debug, Clone)]
pub struct RestProjection {
    /// HTTP status code.
    pub status: u16,
    /// Security headers to set.
    pub headers: Vec<(&'static str, &'static str)>,
    /// JSON body.
    pub body: Value,
}

/// Project an envelope onto the REST wire form.
pub fn rest(envelope: &ErrorEnvelope, meta: &RestMeta) -> RestProjection {
    let safe = envelope.wire_safe();
    let mut error = serde_json::to_value(&safe).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut error {
        map.insert("message".to_string(), json!(safe.user_message));
    }

    RestProjection {
        status: envelope.status_code(),
        headers: REST_SECURITY_HEADERS.to_vec(),
        body: json!({
            "error": error,
            "meta": meta,
        }),
    }
}

/// gRPC status codes used by the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrpcStatus {
    /// 400.
    InvalidArgument = 3,
    /// 401.
    Unauthenticated = 16,
    /// 403.
    PermissionDenied = 7,
    /// 404.
    NotFound = 5,
    /// 409.
    Aborted = 10,
    /// 412.
    FailedPrecondition = 9,
    /// 429.
    ResourceExhausted = 8,
    /// 499.
    Cancelled = 1,
    /// 500.
    Internal = 13,
    /// 501.
    Unimplemented = 12,
    /// 503.
    Unavailable = 14,
    /// 504.
    DeadlineExceeded = 4,
}

/// A projected gRPC error.
#[derive(Debug, Clone)]
pub struct GrpcProjection {
    /// gRPC status code.
    pub status: GrpcStatus,
    /// Status message (the user message).
    pub message: String,
    /// Envelope JSON for the `details` slot.
    pub details: Value,
    /// Metadata entries (`corral-error-bin` carries the envelope).
    pub metadata: Vec<(String, String)>,
}

/// Map an HTTP status onto a gRPC status.
pub fn grpc_status_for(http: u16) -> GrpcStatus {
    match http {
        400 => GrpcStatus::InvalidArgument,
        401 => GrpcStatus::Unauthenticated,
        403 => GrpcStatus::PermissionDenied,
        404 => GrpcStatus::NotFound,
        409 => GrpcStatus::Aborted,
        412 => GrpcStatus::FailedPrecondition,
        429 => GrpcStatus::ResourceExhausted,
        499 => GrpcStatus::Cancelled,
        501 => GrpcStatus::Unimplemented,
        503 => GrpcStatus::Unavailable,
        504 => GrpcStatus::DeadlineExceeded,
        _ => GrpcStatus::Internal,
    }
}

/// Project an envelope onto the gRPC wire form.
pub fn grpc(envelope: &ErrorEnvelope) -> GrpcProjection {
    let safe = envelope.wire_safe();
    let details = serde_json::to_value(&safe).unwrap_or_else(|_| json!({}));
    GrpcProjection {
        status: grpc_status_for(envelope.status_code()),
        message: safe.user_message.clone(),
        metadata: vec![
            ("corral-error-code".to_string(), safe.code.clone()),
            ("corral-request-id".to_string(), safe.request_id.clone()),
            ("corral-error-bin".to_string(), details.to_string()),
        ],
        details,
    }
}

/// Project an envelope onto the WebSocket wire form.
pub fn websocket(envelope: &ErrorEnvelope, message_id: Option<&str>, connection_id: &str) -> Value {
    let safe = envelope.wire_safe();
    json!({
        "type": "error",
        "id": message_id,
        "error": serde_json::to_value(&safe).unwrap_or_else(|_| json!({})),
        "meta": {
            "connectionId": connection_id,
            "protocol": "websocket",
        },
    })
}

/// JSON-RPC error code for an HTTP status, per the MCP projection rules.
pub fn jsonrpc_code_for(http: u16) -> i64 {
    match http {
        400 => -32602,
        401 | 403 => -32000,
        404 => -32601,
        _ => -32603,
    }
}

/// Project an envelope onto the MCP (JSON-RPC 2.0) wire form.
pub fn mcp(envelope: &ErrorEnvelope, request_id: &Value) -> Value {
    let safe = envelope.wire_safe();
    json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "error": {
            "code": jsonrpc_code_for(envelope.status_code()),
            "message": safe.user_message,
            "data": serde_json::to_value(&safe).unwrap_or_else(|_| json!({})),
        },
    })
}

/// Recover an envelope from the JSON a projection embedded.
///
/// Used by parity tests and by clients of one protocol re-raising through
/// another; preserves `{code, category, severity, userMessage}` exactly.
pub fn from_wire(embedded: &Value) -> Option<ErrorEnvelope> {
    serde_json::from_value(embedded.clone()).ok()
}

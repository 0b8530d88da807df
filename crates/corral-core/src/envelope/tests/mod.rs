use serde_json::json;

use super::projection::{self, GrpcStatus, RestMeta};
use super::*;

fn sample() -> ErrorEnvelope {
    ErrorEnvelope::new(
        codes::AUTH_RESOURCE_ACCESS_DENIED,
        ErrorCategory::Authorization,
        "You do not have access to this resource",
    )
    .severity(ErrorSeverity::Medium)
    .request_id("req-123")
    .tag("operation", "execute")
    .tag("resource", "context-9")
    .suggest(RecoverySuggestion::VerifyResourceExists)
}

#[test]
fn suggestions_are_capped_at_three() {
    let envelope = ErrorEnvelope::new(codes::INTERNAL_ERROR, ErrorCategory::System, "boom")
        .suggest(RecoverySuggestion::WaitAndRetry)
        .suggest(RecoverySuggestion::CheckCredentials)
        .suggest(RecoverySuggestion::ContactSupport)
        .suggest(RecoverySuggestion::ReduceRequestRate);
    assert_eq!(envelope.recovery_suggestions.len(), 3);
}

#[test]
fn duplicate_suggestions_collapse() {
    let envelope = ErrorEnvelope::new(codes::INTERNAL_ERROR, ErrorCategory::System, "boom")
        .suggest(RecoverySuggestion::WaitAndRetry)
        .suggest(RecoverySuggestion::WaitAndRetry);
    assert_eq!(envelope.recovery_suggestions.len(), 1);
}

#[test]
fn status_codes_follow_the_taxonomy() {
    let cases = [
        (ErrorCategory::Authentication, 401),
        (ErrorCategory::Authorization, 403),
        (ErrorCategory::Validation, 400),
        (ErrorCategory::RateLimit, 429),
        (ErrorCategory::Session, 401),
        (ErrorCategory::Resource, 404),
        (ErrorCategory::Browser, 503),
        (ErrorCategory::Network, 502),
        (ErrorCategory::Security, 403),
        (ErrorCategory::Performance, 503),
        (ErrorCategory::Configuration, 500),
        (ErrorCategory::BusinessLogic, 400),
        (ErrorCategory::System, 500),
    ];
    for (category, status) in cases {
        assert_eq!(category.status_code(), status, "{category}");
    }
}

#[test]
fn code_level_refinements_override_category() {
    let exhausted =
        ErrorEnvelope::new(codes::RESOURCE_EXHAUSTED, ErrorCategory::Resource, "full");
    assert_eq!(exhausted.status_code(), 429);

    let cancelled =
        ErrorEnvelope::new(codes::REQUEST_CANCELLED, ErrorCategory::System, "cancelled");
    assert_eq!(cancelled.status_code(), 499);

    let unimplemented =
        ErrorEnvelope::new(codes::NOT_IMPLEMENTED, ErrorCategory::System, "todo");
    assert_eq!(unimplemented.status_code(), 501);

    let timeout = ErrorEnvelope::new(codes::ACTION_TIMEOUT, ErrorCategory::Browser, "slow");
    assert_eq!(timeout.status_code(), 504);
}

#[test]
fn sensitive_details_are_stripped_on_the_wire() {
    let envelope = sample()
        .details(json!({"script": "eval('2+2')"}))
        .sensitive();
    let safe = envelope.wire_safe();
    assert!(safe.details.is_none());
    // The original keeps its details for server-side logs.
    assert!(envelope.details.is_some());
}

#[test]
fn rest_projection_sets_security_headers() {
    let meta = RestMeta {
        version: "v1".to_string(),
        endpoint: "/api/v1/contexts/9/execute".to_string(),
        method: "POST".to_string(),
        request_duration_ms: Some(12),
    };
    let projected = projection::rest(&sample(), &meta);
    assert_eq!(projected.status, 403);
    assert!(
        projected
            .headers
            .contains(&("X-Content-Type-Options", "nosniff"))
    );
    assert!(projected.headers.contains(&("Cache-Control", "no-store")));
    assert_eq!(
        projected.body["error"]["code"],
        codes::AUTH_RESOURCE_ACCESS_DENIED
    );
    assert_eq!(projected.body["meta"]["method"], "POST");
}

#[test]
fn rest_round_trip_preserves_identity_fields() {
    let original = sample();
    let projected = projection::rest(&original, &RestMeta::default());
    let recovered = projection::from_wire(&projected.body["error"]).unwrap();
    assert_eq!(recovered.code, original.code);
    assert_eq!(recovered.category, original.category);
    assert_eq!(recovered.severity, original.severity);
    assert_eq!(recovered.user_message, original.user_message);
}

#[test]
fn grpc_projection_maps_statuses() {
    let cases = [
        (ErrorCategory::Validation, GrpcStatus::InvalidArgument),
        (ErrorCategory::Authentication, GrpcStatus::Unauthenticated),
        (ErrorCategory::Authorization, GrpcStatus::PermissionDenied),
        (ErrorCategory::Resource, GrpcStatus::NotFound),
        (ErrorCategory::System, GrpcStatus::Internal),
    ];
    for (category, expected) in cases {
        let envelope = ErrorEnvelope::new("X", category, "x");
        assert_eq!(projection::grpc(&envelope).status, expected);
    }

    let exhausted =
        ErrorEnvelope::new(codes::RESOURCE_EXHAUSTED, ErrorCategory::Resource, "full");
    assert_eq!(
        projection::grpc(&exhausted).status,
        GrpcStatus::ResourceExhausted
    );
}

#[test]
fn grpc_round_trip_preserves_identity_fields() {
    let original = sample();
    let projected = projection::grpc(&original);
    let recovered = projection::from_wire(&projected.details).unwrap();
    assert_eq!(recovered.code, original.code);
    assert_eq!(recovered.category, original.category);
    assert_eq!(recovered.severity, original.severity);
    assert_eq!(recovered.user_message, original.user_message);
}

#[test]
fn websocket_projection_has_error_type_and_meta() {
    let projected = projection::websocket(&sample(), Some("msg-7"), "conn-42");
    assert_eq!(projected["type"], "error");
    assert_eq!(projected["id"], "msg-7");
    assert_eq!(projected["meta"]["connectionId"], "conn-42");
    assert_eq!(projected["meta"]["protocol"], "websocket");

    let recovered = projection::from_wire(&projected["error"]).unwrap();
    assert_eq!(recovered.code, codes::AUTH_RESOURCE_ACCESS_DENIED);
}

#[test]
fn mcp_projection_maps_jsonrpc_codes() {
    assert_eq!(projection::jsonrpc_code_for(400), -32602);
    assert_eq!(projection::jsonrpc_code_for(401), -32000);
    assert_eq!(projection::jsonrpc_code_for(403), -32000);
    assert_eq!(projection::jsonrpc_code_for(404), -32601);
    assert_eq!(projection::jsonrpc_code_for(500), -32603);
    assert_eq!(projection::jsonrpc_code_for(503), -32603);

    let projected = projection::mcp(&sample(), &json!(3));
    assert_eq!(projected["jsonrpc"], "2.0");
    assert_eq!(projected["id"], 3);
    assert_eq!(projected["error"]["code"], -32000);

    let recovered = projection::from_wire(&projected["error"]["data"]).unwrap();
    assert_eq!(recovered.user_message, sample().user_message);
}

#[test]
fn every_category_projects_on_all_protocols() {
    let categories = [
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::Validation,
        ErrorCategory::Network,
        ErrorCategory::Browser,
        ErrorCategory::Session,
        ErrorCategory::Configuration,
        ErrorCategory::BusinessLogic,
        ErrorCategory::System,
        ErrorCategory::Security,
        ErrorCategory::Performance,
        ErrorCategory::RateLimit,
        ErrorCategory::Resource,
    ];
    for category in categories {
        let envelope = ErrorEnvelope::new("CODE", category, "message").request_id("r");
        let rest = projection::rest(&envelope, &RestMeta::default());
        assert!(rest.status >= 400);
        assert!(rest.body["error"]["code"].is_string());

        let grpc = projection::grpc(&envelope);
        assert!(!grpc.message.is_empty());

        let ws = projection::websocket(&envelope, None, "c");
        assert_eq!(ws["type"], "error");

        let mcp = projection::mcp(&envelope, &serde_json::Value::Null);
        assert!(mcp["error"]["code"].is_i64());
    }
}

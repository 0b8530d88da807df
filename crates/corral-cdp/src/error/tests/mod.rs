use std::time::Duration;

use super::*;

#[test]
fn protocol_error_display_includes_code_and_message() {
    let err = CdpError::Protocol {
        code: -32000,
        message: "No target with given id found".to_string(),
    };
    let text = err.to_string();
    assert!(text.contains("-32000"));
    assert!(text.contains("No target with given id found"));
}

#[test]
fn command_timeout_is_transient() {
    let err = CdpError::CommandTimeout {
        method: "Page.navigate".to_string(),
        timeout: Duration::from_secs(30),
    };
    assert!(err.is_transient());
    assert!(!err.is_connection_failure());
}

#[test]
fn connection_closed_is_a_connection_failure() {
    let err = CdpError::ConnectionClosed;
    assert!(err.is_connection_failure());
    assert!(!err.is_transient());
}

#[test]
fn protocol_error_is_neither_transient_nor_connection_failure() {
    let err = CdpError::Protocol {
        code: -32601,
        message: "Method not found".to_string(),
    };
    assert!(!err.is_transient());
    assert!(!err.is_connection_failure());
}

#[test]
fn serialization_error_converts() {
    let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err = CdpError::from(source);
    assert!(matches!(err, CdpError::Serialization(_)));
}

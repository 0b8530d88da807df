use super::*;

#[test]
fn browser_command_omits_session_and_params() {
    let frame = CommandFrame::browser(CommandId(1), "Target.getTargets", None);
    let json = serde_json::to_string(&frame).unwrap();
    assert_eq!(json, r#"{"id":1,"method":"Target.getTargets"}"#);
}

#[test]
fn session_command_carries_the_session_id() {
    let frame = CommandFrame::browser(
        CommandId(7),
        "Runtime.evaluate",
        Some(serde_json::json!({"expression": "1+1"})),
    )
    .on(Channel::session("session-abc"));
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains(r#""id":7"#));
    assert!(json.contains(r#""expression":"1+1""#));
    assert!(json.contains(r#""sessionId":"session-abc""#));
}

#[test]
fn reply_parses_into_ok_outcome() {
    let frame = IncomingFrame::parse(r#"{"id":3,"result":{"frameId":"F1"}}"#).unwrap();
    let IncomingFrame::Reply(reply) = frame else {
        panic!("expected a reply");
    };
    assert_eq!(reply.id, CommandId(3));
    assert_eq!(reply.channel, Channel::Browser);
    assert_eq!(reply.outcome.unwrap()["frameId"], "F1");
}

#[test]
fn faulted_reply_parses_into_err_outcome() {
    let frame =
        IncomingFrame::parse(r#"{"id":4,"error":{"code":-32601,"message":"Method not found"}}"#)
            .unwrap();
    let IncomingFrame::Reply(reply) = frame else {
        panic!("expected a reply");
    };
    let fault = reply.outcome.unwrap_err();
    assert_eq!(fault.code, -32601);
    assert_eq!(fault.message, "Method not found");
}

#[test]
fn reply_without_result_defaults_to_null() {
    let frame = IncomingFrame::parse(r#"{"id":9}"#).unwrap();
    let IncomingFrame::Reply(reply) = frame else {
        panic!("expected a reply");
    };
    assert_eq!(reply.outcome.unwrap(), serde_json::Value::Null);
}

#[test]
fn event_parses_with_channel() {
    let frame = IncomingFrame::parse(
        r#"{"method":"Page.loadEventFired","params":{"timestamp":2.5},"sessionId":"S1"}"#,
    )
    .unwrap();
    let IncomingFrame::Event(event) = frame else {
        panic!("expected an event");
    };
    assert_eq!(event.method, "Page.loadEventFired");
    assert_eq!(event.channel.session_id(), Some("S1"));
    assert_eq!(event.params["timestamp"], 2.5);
}

#[test]
fn parameterless_event_has_null_payload() {
    let frame = IncomingFrame::parse(r#"{"method":"Page.loadEventFired"}"#).unwrap();
    let IncomingFrame::Event(event) = frame else {
        panic!("expected an event");
    };
    assert!(event.params.is_null());
}

#[test]
fn frame_with_neither_id_nor_method_is_rejected() {
    assert!(IncomingFrame::parse(r#"{"sessionId":"S1"}"#).is_err());
    assert!(IncomingFrame::parse("{not json").is_err());
}

#[test]
fn event_decode_typed() {
    #[derive(serde::Deserialize)]
    struct FrameNavigated {
        frame: serde_json::Value,
    }

    let event = EventFrame {
        method: "Page.frameNavigated".to_string(),
        params: serde_json::json!({"frame": {"id": "F1", "url": "about:blank"}}),
        channel: Channel::session("S1"),
    };
    let parsed: FrameNavigated = event.decode().unwrap();
    assert_eq!(parsed.frame["id"], "F1");
}

#[test]
fn event_decode_none_on_mismatch() {
    let event = EventFrame {
        method: "Page.loadEventFired".to_string(),
        params: serde_json::Value::Null,
        channel: Channel::Browser,
    };
    let parsed: Option<serde_json::Map<String, serde_json::Value>> = event.decode();
    assert!(parsed.is_none());
}

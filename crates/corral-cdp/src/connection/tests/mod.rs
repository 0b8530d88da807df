use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use super::CdpConnection;
use crate::transport::{Channel, CommandFrame, CommandId, EventFrame, ReplyFrame};

type WsResult = Result<Message, tokio_tungstenite::tungstenite::Error>;

fn message_text(msg: &Message) -> &str {
    match msg {
        Message::Text(text) => text.as_str(),
        other => panic!("expected text message, got {other:?}"),
    }
}

#[tokio::test]
async fn write_loop_serializes_commands_in_order() {
    let (tx, rx) = mpsc::channel::<CommandFrame>(8);
    let (sink_tx, mut sink_rx) = futures::channel::mpsc::unbounded::<Message>();
    let sink =
        sink_tx.sink_map_err(|_| tokio_tungstenite::tungstenite::Error::ConnectionClosed);

    let handle = tokio::spawn(CdpConnection::write_loop(rx, sink));

    tx.send(CommandFrame::browser(CommandId(1), "Target.getTargets", None))
        .await
        .unwrap();
    tx.send(CommandFrame::browser(CommandId(2), "Browser.getVersion", None))
        .await
        .unwrap();
    drop(tx);
    handle.await.unwrap();

    let first = sink_rx.next().await.unwrap();
    assert!(message_text(&first).contains(r#""id":1"#));
    let second = sink_rx.next().await.unwrap();
    assert!(message_text(&second).contains(r#""id":2"#));
}

#[tokio::test]
async fn read_loop_routes_replies_to_pending() {
    let pending: Arc<Mutex<HashMap<CommandId, oneshot::Sender<ReplyFrame>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let (event_tx, _) = broadcast::channel::<EventFrame>(8);

    let (reply_tx, reply_rx) = oneshot::channel();
    pending.lock().await.insert(CommandId(11), reply_tx);

    let messages: Vec<WsResult> = vec![Ok(Message::Text(
        r#"{"id":11,"result":{"frameId":"F1"}}"#.into(),
    ))];
    let stream = futures_util::stream::iter(messages);

    CdpConnection::read_loop(stream, pending.clone(), event_tx).await;

    let reply = reply_rx.await.unwrap();
    assert_eq!(reply.id, CommandId(11));
    assert_eq!(reply.outcome.unwrap()["frameId"], "F1");
    assert!(pending.lock().await.is_empty());
}

#[tokio::test]
async fn read_loop_broadcasts_events() {
    let pending = Arc::new(Mutex::new(HashMap::new()));
    let (event_tx, mut event_rx) = broadcast::channel::<EventFrame>(8);

    let messages: Vec<WsResult> = vec![Ok(Message::Text(
        r#"{"method":"Page.loadEventFired","params":{"timestamp":2.5},"sessionId":"S1"}"#.into(),
    ))];
    let stream = futures_util::stream::iter(messages);

    CdpConnection::read_loop(stream, pending, event_tx).await;

    let event = event_rx.recv().await.unwrap();
    assert_eq!(event.method, "Page.loadEventFired");
    assert_eq!(event.channel, Channel::session("S1"));
}

#[tokio::test]
async fn read_loop_clears_pending_on_close() {
    let pending: Arc<Mutex<HashMap<CommandId, oneshot::Sender<ReplyFrame>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let (event_tx, _) = broadcast::channel::<EventFrame>(8);

    let (reply_tx, reply_rx) = oneshot::channel();
    pending.lock().await.insert(CommandId(99), reply_tx);

    let messages: Vec<WsResult> = vec![Ok(Message::Close(None))];
    let stream = futures_util::stream::iter(messages);

    CdpConnection::read_loop(stream, pending.clone(), event_tx).await;

    // The waiter observes a dropped sender rather than hanging forever.
    assert!(reply_rx.await.is_err());
    assert!(pending.lock().await.is_empty());
}

//! CDP WebSocket connection management.

pub mod discovery;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::CdpError;
use crate::transport::{Channel, CommandFrame, CommandId, EventFrame, IncomingFrame, ReplyFrame};

/// Default timeout for CDP commands.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for the event broadcast channel.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Buffer size for the outgoing command channel.
const COMMAND_CHANNEL_SIZE: usize = 64;

type PendingMap = Arc<Mutex<HashMap<CommandId, oneshot::Sender<ReplyFrame>>>>;

/// A CDP connection to a browser.
///
/// One connection multiplexes commands and events for the browser channel
/// and for every attached session channel. Writes go through a bounded
/// queue into a dedicated writer task; a reader task routes replies to
/// their waiting callers and fans events out on a broadcast channel.
#[derive(Debug)]
pub struct CdpConnection {
    /// Sender for outgoing commands.
    tx: mpsc::Sender<CommandFrame>,
    /// Broadcast sender for incoming events.
    event_tx: broadcast::Sender<EventFrame>,
    /// Replies waiting for completion, keyed by command id.
    pending: PendingMap,
    /// Atomic counter for command ids.
    next_id: AtomicU64,
    /// Per-command timeout.
    command_timeout: Duration,
    /// Handle to the background read task.
    _read_handle: tokio::task::JoinHandle<()>,
    /// Handle to the background write task.
    _write_handle: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a CDP WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket connection fails.
    #[instrument(level = "info", skip(ws_url), fields(ws_url = %ws_url))]
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        Self::connect_with_timeout(ws_url, DEFAULT_COMMAND_TIMEOUT).await
    }

    /// Connect with a custom per-command timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket connection fails.
    pub async fn connect_with_timeout(
        ws_url: &str,
        command_timeout: Duration,
    ) -> Result<Self, CdpError> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(ws_url).await?;
        info!(status = %response.status(), "CDP WebSocket connection established");

        let (write, read) = ws_stream.split();

        let (tx, rx) = mpsc::channel::<CommandFrame>(COMMAND_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel::<EventFrame>(EVENT_CHANNEL_SIZE);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let write_handle = tokio::spawn(Self::write_loop(rx, write));
        let read_handle = tokio::spawn(Self::read_loop(read, pending.clone(), event_tx.clone()));
        debug!("CDP reader and writer tasks spawned");

        Ok(Self {
            tx,
            event_tx,
            pending,
            next_id: AtomicU64::new(1),
            command_timeout,
            _read_handle: read_handle,
            _write_handle: write_handle,
        })
    }

    /// Background task that writes command frames to the WebSocket.
    async fn write_loop<S>(mut rx: mpsc::Receiver<CommandFrame>, mut sink: S)
    where
        S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(e) => {
                    error!(error = %e, method = %frame.method, "failed to serialize command frame");
                    continue;
                }
            };

            trace!(id = %frame.id, method = %frame.method, "sending command frame");
            if sink.send(Message::Text(json.into())).await.is_err() {
                warn!("WebSocket sink closed, ending write loop");
                break;
            }
        }
        debug!("CDP write loop ended");
    }

    /// Background task that reads frames from the WebSocket.
    async fn read_loop<S>(
        mut stream: S,
        pending: PendingMap,
        event_tx: broadcast::Sender<EventFrame>,
    ) where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    info!(?frame, "WebSocket closed by remote");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "WebSocket error, ending read loop");
                    break;
                }
                Ok(_) => continue,
            };

            match IncomingFrame::parse(&text) {
                Ok(IncomingFrame::Reply(reply)) => {
                    let mut pending = pending.lock().await;
                    if let Some(sender) = pending.remove(&reply.id) {
                        let _ = sender.send(reply);
                    } else {
                        warn!(id = %reply.id, "reply for unknown command id");
                    }
                }
                Ok(IncomingFrame::Event(event)) => {
                    trace!(method = %event.method, "CDP event");
                    // Only fails when there are no subscribers, which is fine.
                    let _ = event_tx.send(event);
                }
                Err(e) => {
                    error!(error = %e, "failed to parse incoming frame");
                }
            }
        }

        // Fail any still-pending commands so callers do not hang.
        let mut pending = pending.lock().await;
        pending.clear();
        debug!("CDP read loop ended");
    }

    /// Send a CDP command and await its typed result.
    ///
    /// `session_id` addresses an attached session channel; pass `None`
    /// for browser-level commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be sent, times out, or the
    /// browser answers with a protocol fault.
    pub async fn send_command<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        session_id: Option<&str>,
    ) -> Result<R, CdpError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = CommandId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let params = params.map(serde_json::to_value).transpose()?;
        let channel = session_id.map_or(Channel::Browser, Channel::session);
        let frame = CommandFrame::browser(id, method, params).on(channel);

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, reply_tx);
        }

        if self.tx.send(frame).await.is_err() {
            let mut pending = self.pending.lock().await;
            pending.remove(&id);
            return Err(CdpError::ConnectionClosed);
        }

        let reply = match timeout(self.command_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(CdpError::ConnectionClosed),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                return Err(CdpError::CommandTimeout {
                    method: method.to_string(),
                    timeout: self.command_timeout,
                });
            }
        };

        match reply.outcome {
            Err(fault) => Err(CdpError::Protocol {
                code: fault.code,
                message: fault.message,
            }),
            Ok(Value::Null) => Err(CdpError::MissingResult(method.to_string())),
            Ok(value) => Ok(serde_json::from_value(value)?),
        }
    }

    /// Subscribe to CDP events.
    ///
    /// Returns a receiver that will observe all events from the browser,
    /// across every channel.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventFrame> {
        self.event_tx.subscribe()
    }

    /// Number of commands currently awaiting a reply.
    pub async fn pending_commands(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests;

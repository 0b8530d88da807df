//! Wire framing for the DevTools channel.
//!
//! Three frame shapes cross the socket: commands (carry an id and a
//! method), replies (echo the id, carry a result or a fault), and events
//! (carry a method only). Every frame is addressed to a [`Channel`]:
//! either the browser endpoint itself or one attached target session,
//! which is how the pool-level and page-level traffic share a single
//! connection.

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Correlates a command with its reply. Allocated monotonically per
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a frame is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Channel {
    /// The browser endpoint (launch, targets, version).
    #[default]
    Browser,
    /// One attached target session (a page).
    Session(String),
}

impl Channel {
    /// A session channel.
    pub fn session(id: impl Into<String>) -> Self {
        Self::Session(id.into())
    }

    /// The session id, when this is a session channel.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Browser => None,
            Self::Session(id) => Some(id),
        }
    }

    fn from_wire(raw: Option<String>) -> Self {
        raw.map_or(Self::Browser, Self::Session)
    }
}

/// An outgoing command.
#[derive(Debug, Clone)]
pub struct CommandFrame {
    /// Reply correlation id.
    pub id: CommandId,
    /// DevTools method, e.g. `Target.createTarget`.
    pub method: String,
    /// Method parameters; omitted from the wire when absent.
    pub params: Option<Value>,
    /// Addressing.
    pub channel: Channel,
}

impl CommandFrame {
    /// A command addressed to the browser endpoint.
    pub fn browser(id: CommandId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            channel: Channel::Browser,
        }
    }

    /// Re-address the command.
    pub fn on(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

// Hand-rolled so the channel collapses into the optional `sessionId`
// field the wire expects, without a shadow struct per frame.
impl Serialize for CommandFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = 2
            + usize::from(self.params.is_some())
            + usize::from(self.channel.session_id().is_some());
        let mut map = serializer.serialize_map(Some(fields))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        if let Some(session) = self.channel.session_id() {
            map.serialize_entry("sessionId", session)?;
        }
        map.end()
    }
}

/// A protocol-level failure reported by the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolFault {
    /// Fault code, e.g. -32000.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Extra detail, when the browser supplies any.
    #[serde(default)]
    pub data: Option<String>,
}

/// The browser's answer to one command.
#[derive(Debug, Clone)]
pub struct ReplyFrame {
    /// Id of the command being answered.
    pub id: CommandId,
    /// Channel the reply arrived on.
    pub channel: Channel,
    /// Result payload, or the fault that replaced it.
    pub outcome: Result<Value, ProtocolFault>,
}

/// An event pushed by the browser.
#[derive(Debug, Clone)]
pub struct EventFrame {
    /// Event method, e.g. `Page.loadEventFired`.
    pub method: String,
    /// Event payload; `Null` for parameterless events.
    pub params: Value,
    /// Channel the event belongs to.
    pub channel: Channel,
}

impl EventFrame {
    /// Decode the payload into a typed value.
    ///
    /// Returns `None` when the payload does not match the requested shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.params.clone()).ok()
    }
}

/// Any frame read off the socket.
#[derive(Debug, Clone)]
pub enum IncomingFrame {
    /// A reply to a previously sent command.
    Reply(ReplyFrame),
    /// A pushed event.
    Event(EventFrame),
}

/// Loosely-typed superset of every incoming frame; [`IncomingFrame::parse`]
/// decides which shape it really is.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    id: Option<u64>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<ProtocolFault>,
    session_id: Option<String>,
}

impl IncomingFrame {
    /// Parse one text frame.
    ///
    /// Frames carrying an `id` are replies (faulted replies carry one
    /// too); frames carrying only a `method` are events.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or for a frame that is neither
    /// a reply nor an event.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let channel = Channel::from_wire(raw.session_id);
        match (raw.id, raw.method) {
            (Some(id), _) => Ok(Self::Reply(ReplyFrame {
                id: CommandId(id),
                channel,
                outcome: match raw.error {
                    Some(fault) => Err(fault),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                },
            })),
            (None, Some(method)) => Ok(Self::Event(EventFrame {
                method,
                params: raw.params.unwrap_or(Value::Null),
                channel,
            })),
            (None, None) => Err(serde_json::Error::custom(
                "frame is neither a reply nor an event",
            )),
        }
    }
}

#[cfg(test)]
mod tests;

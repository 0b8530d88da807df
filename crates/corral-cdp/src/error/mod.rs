//! Error types for the CDP client.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the CDP transport and connection layers.
#[derive(Debug, Error)]
pub enum CdpError {
    /// The underlying WebSocket failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// A message could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The browser answered a command with a protocol-level error.
    #[error("CDP protocol error {code}: {message}")]
    Protocol {
        /// CDP error code (e.g. -32000).
        code: i64,
        /// Human-readable message from the browser.
        message: String,
    },

    /// A command did not complete within its deadline.
    #[error("CDP command {method} timed out after {timeout:?}")]
    CommandTimeout {
        /// The CDP method that timed out.
        method: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The connection was closed while a command was in flight.
    #[error("CDP connection closed")]
    ConnectionClosed,

    /// A response arrived without a result payload.
    #[error("CDP response for {0} carried no result")]
    MissingResult(String),

    /// WebSocket URL discovery over HTTP failed.
    #[error("endpoint discovery failed: {0}")]
    Discovery(String),

    /// Discovery HTTP request failed.
    #[error("discovery request error: {0}")]
    DiscoveryRequest(#[from] reqwest::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl CdpError {
    /// Whether this error indicates the browser is unreachable rather than
    /// a bad command.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_)
                | Self::ConnectionClosed
                | Self::Discovery(_)
                | Self::DiscoveryRequest(_)
        )
    }

    /// Whether the command can be retried against the same connection.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }
}

#[cfg(test)]
mod tests;

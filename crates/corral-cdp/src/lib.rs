//! # Corral CDP - Chrome DevTools Protocol Client
//!
//! Low-level Chrome DevTools Protocol (CDP) implementation over WebSocket.
//! This crate is the wire layer between the Corral control plane and a
//! Chromium-based engine process:
//!
//! - WebSocket connection management to Chrome/Chromium browsers
//! - Frame serialization and deserialization (commands, replies, events)
//! - Command/reply correlation with async/await
//! - Event subscription and broadcast
//! - Channel addressing for multiple target sessions over one connection
//!
//! ## Quick Start
//!
//! ```no_run
//! use corral_cdp::CdpConnection;
//! use corral_cdp::protocol::target::GetTargetsParams;
//!
//! # async fn example() -> Result<(), corral_cdp::CdpError> {
//! let conn = CdpConnection::connect("ws://localhost:9222/devtools/browser/...").await?;
//!
//! let result: corral_cdp::protocol::target::GetTargetsResult =
//!     conn.send_command("Target.getTargets", Some(GetTargetsParams::default()), None).await?;
//!
//! for target in result.target_infos {
//!     println!("Target: {} - {}", target.target_type, target.url);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Discovering the browser WebSocket URL
//!
//! Chromium exposes a JSON API for discovering the WebSocket URL:
//!
//! ```no_run
//! use corral_cdp::discover_websocket_url;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), corral_cdp::CdpError> {
//! let ws_url = discover_websocket_url("http://localhost:9222", Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Observing events
//!
//! ```no_run
//! use corral_cdp::CdpConnection;
//!
//! # async fn example(conn: &CdpConnection) {
//! let mut events = conn.subscribe_events();
//! while let Ok(event) = events.recv().await {
//!     match &event.method[..] {
//!         "Page.loadEventFired" => println!("page loaded on {:?}", event.channel),
//!         _ => {}
//!     }
//! }
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;

pub use connection::discovery::{discover_websocket_url, BrowserVersion};
pub use connection::CdpConnection;
pub use error::CdpError;
pub use transport::{
    Channel, CommandFrame, CommandId, EventFrame, IncomingFrame, ProtocolFault, ReplyFrame,
};

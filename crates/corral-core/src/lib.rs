//! # Corral Core - Browser Automation Control Plane
//!
//! The concurrent execution substrate behind the Corral control plane. It
//! accepts normalized automation invocations (navigate, click, type,
//! evaluate, screenshot, PDF, upload, cookies, wait, scroll) from four
//! interchangeable front-ends - REST, gRPC, WebSocket and MCP -
//! authenticates them, and executes them against a shared, finite pool of
//! headless browser engines.
//!
//! ## Architecture
//!
//! ```text
//! invocation -> auth gate -> dispatcher -> {session store, context store,
//!     page manager} -> action validator -> action handler -> browser pool
//!     lease -> engine -> result -> error envelope -> protocol projection
//! ```
//!
//! - [`auth`] - credential verification, principals, audit events
//! - [`store`] - session and context stores with TTL and ownership data
//! - [`pool`] - the browser pool: leasing, scaling, recycling, health,
//!   circuit breaking
//! - [`page`] - page manager: engine page handles, lifecycle mirroring,
//!   idle cleanup
//! - [`action`] - per-action validation, handlers, the executor with
//!   timeout and retry
//! - [`dispatch`] - the protocol-agnostic invocation record, admission
//!   control and routing
//! - [`envelope`] - the canonical error envelope, per-protocol projections
//!   and the error tracker
//! - [`engine`] - the browser engine abstraction, with a CDP production
//!   implementation and an in-process mock for tests
//! - [`config`] - environment-derived configuration
//! - [`plane`] - the assembled control plane with background loops and
//!   graceful shutdown
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use corral_core::config::Config;
//! use corral_core::engine::mock::MockEngine;
//! use corral_core::plane::ControlPlane;
//!
//! # async fn example() -> Result<(), corral_core::envelope::ErrorEnvelope> {
//! let config = Config::default();
//! let plane = ControlPlane::builder(config)
//!     .engine(Arc::new(MockEngine::new()))
//!     .build();
//! plane.start();
//!
//! // ... hand invocation records to plane.dispatcher() ...
//!
//! plane.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod envelope;
pub mod page;
pub mod plane;
pub mod pool;
pub mod shutdown;
pub mod store;

pub use action::{ActionInvocation, ActionResult, ActionType};
pub use auth::{Credential, Principal};
pub use config::Config;
pub use dispatch::{Dispatcher, InvocationRecord, Protocol};
pub use envelope::{ErrorCategory, ErrorEnvelope, ErrorSeverity};
pub use page::PageInfo;
pub use plane::ControlPlane;
pub use pool::BrowserPool;
pub use store::{Context, Session};

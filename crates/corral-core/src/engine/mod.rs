//! Browser engine abstraction.
//!
//! The control plane drives an external browser engine through these
//! traits. [`cdp::CdpEngine`] is the production implementation speaking the
//! Chrome DevTools Protocol; [`mock::MockEngine`] is a deterministic
//! in-process implementation used by tests.
//!
//! Engine-specific capabilities (such as the CDP-only "clear all cookies"
//! primitive) are surfaced as trait methods so handlers never reach around
//! the abstraction.

pub mod cdp;
pub mod mock;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use corral_cdp::CdpError;

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine process could not be started.
    #[error("engine launch failed: {0}")]
    Launch(String),
    /// The engine stopped responding.
    #[error("engine unreachable: {0}")]
    Unreachable(String),
    /// The engine rejected a command.
    #[error("engine protocol error: {0}")]
    Protocol(String),
    /// An engine call exceeded its deadline.
    #[error("engine timed out during {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
    },
    /// No element matched the selector in time.
    #[error("no element matches selector {0:?}")]
    SelectorNotFound(String),
    /// Script evaluation threw.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    /// Navigation failed at the network level.
    #[error("navigation failed: {0}")]
    Navigation(String),
    /// Filesystem failure (uploads, user-data dirs).
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The page or engine is already closed.
    #[error("engine target closed")]
    Closed,
}

impl EngineError {
    /// Whether a retry against the same engine can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unreachable(_) | Self::Navigation(_)
        )
    }
}

impl From<CdpError> for EngineError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::CommandTimeout { method, .. } => Self::Timeout { what: method },
            CdpError::ConnectionClosed => Self::Closed,
            CdpError::Protocol { code, message } => {
                Self::Protocol(format!("{code}: {message}"))
            }
            other => Self::Unreachable(other.to_string()),
        }
    }
}

/// Options for launching one engine process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Explicit engine executable; discovered when unset.
    pub executable: Option<PathBuf>,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// How long to wait for the engine to come up.
    pub launch_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            args: Vec::new(),
            launch_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-page configuration applied at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PageOptions {
    /// Viewport size in CSS pixels.
    pub viewport: Option<ViewportSize>,
    /// User agent override.
    pub user_agent: Option<String>,
    /// Locale override (e.g. "en-US").
    pub locale: Option<String>,
    /// Extra headers attached to every request.
    pub extra_headers: HashMap<String, String>,
}

/// A viewport size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewportSize {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
}

/// Document load phase a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    /// Response headers received.
    Commit,
    /// DOM is ready.
    DomContentLoaded,
    /// Page fully loaded.
    #[default]
    Load,
    /// No network activity for 500ms.
    NetworkIdle,
}

impl LoadPhase {
    /// Parse the wire names, accepting the common numbered aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "commit" => Some(Self::Commit),
            "domcontentloaded" => Some(Self::DomContentLoaded),
            "load" => Some(Self::Load),
            "networkidle" | "networkidle0" | "networkidle2" => Some(Self::NetworkIdle),
            _ => None,
        }
    }
}

/// Result of a navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationOutcome {
    /// The URL that was requested.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status of the final response, when captured.
    pub status: Option<u16>,
    /// HTTP status text.
    pub status_text: String,
    /// Response headers of the document request.
    pub headers: HashMap<String, String>,
}

/// Process-level resource consumption of one engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsage {
    /// Resident set size in bytes.
    pub memory_bytes: u64,
    /// CPU utilization percentage.
    pub cpu_percent: f32,
}

/// Lifecycle events a page emits while it lives.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// The main frame navigated.
    Navigated {
        /// The new document URL.
        url: String,
    },
    /// The document title changed.
    TitleChanged {
        /// The new title.
        title: String,
    },
    /// The load event fired.
    LoadFinished,
    /// An uncaught error surfaced on the page.
    PageError {
        /// Error description.
        message: String,
    },
}

/// A cookie crossing the engine boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieData {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain.
    pub domain: Option<String>,
    /// Cookie path.
    pub path: Option<String>,
    /// Associated URL.
    pub url: Option<String>,
    /// Expiry as UNIX seconds.
    pub expires: Option<f64>,
    /// HTTP-only flag.
    pub http_only: Option<bool>,
    /// Secure flag.
    pub secure: Option<bool>,
    /// SameSite policy ("Strict", "Lax", "None").
    pub same_site: Option<String>,
}

/// A raw mouse operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MouseAction {
    /// Move the pointer.
    Move {
        /// Target X.
        x: f64,
        /// Target Y.
        y: f64,
    },
    /// Click at a position.
    Click {
        /// Target X.
        x: f64,
        /// Target Y.
        y: f64,
    },
    /// Scroll the wheel at a position.
    Wheel {
        /// Pointer X.
        x: f64,
        /// Pointer Y.
        y: f64,
        /// Horizontal delta.
        delta_x: f64,
        /// Vertical delta.
        delta_y: f64,
    },
}

/// Screenshot format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG (default).
    #[default]
    Png,
    /// JPEG.
    Jpeg,
    /// WebP.
    Webp,
}

/// Screenshot capture options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOptions {
    /// Image format.
    pub format: ImageFormat,
    /// JPEG quality [0, 100].
    pub quality: Option<u8>,
    /// Capture the full scrollable page.
    pub full_page: bool,
}

/// PDF generation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfOptions {
    /// Landscape orientation.
    pub landscape: bool,
    /// Print background graphics.
    pub print_background: bool,
    /// Paper width in inches.
    pub paper_width: Option<f64>,
    /// Paper height in inches.
    pub paper_height: Option<f64>,
    /// Uniform margin in inches.
    pub margin: Option<f64>,
    /// Render scale.
    pub scale: Option<f64>,
    /// Page ranges, e.g. "1-3".
    pub page_ranges: Option<String>,
}

/// Launches engine processes.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Launch one engine process.
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn EngineHandle>, EngineError>;
}

/// One running engine process.
#[async_trait]
pub trait EngineHandle: Send + Sync + std::fmt::Debug {
    /// Engine-side identifier (endpoint or pid).
    fn id(&self) -> &str;

    /// Create a page inside this engine.
    async fn new_page(&self, options: &PageOptions) -> Result<Arc<dyn EnginePage>, EngineError>;

    /// Whether the engine process is alive and answering.
    async fn is_alive(&self) -> bool;

    /// Current resource consumption.
    async fn resource_usage(&self) -> ResourceUsage;

    /// Close the engine and its process.
    async fn close(&self) -> Result<(), EngineError>;
}

/// One browsing surface inside an engine.
#[async_trait]
pub trait EnginePage: Send + Sync + std::fmt::Debug {
    /// Engine-side page identifier.
    fn id(&self) -> &str;

    /// Navigate and wait for the requested load phase.
    async fn goto(
        &self,
        url: &str,
        wait_until: LoadPhase,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<NavigationOutcome, EngineError>;

    /// Wait until a selector matches (and is visible when requested).
    async fn wait_for_selector(
        &self,
        selector: &str,
        visible: bool,
        timeout: Duration,
    ) -> Result<(), EngineError>;

    /// Whether the first match intersects the viewport.
    async fn is_in_viewport(&self, selector: &str) -> Result<bool, EngineError>;

    /// Scroll the first match into view.
    async fn scroll_into_view(&self, selector: &str) -> Result<(), EngineError>;

    /// Click the first match.
    async fn click(&self, selector: &str, click_count: u32) -> Result<(), EngineError>;

    /// Type text into the first match.
    async fn type_text(&self, selector: &str, text: &str) -> Result<(), EngineError>;

    /// Select options of a `<select>` by value; returns the selected values.
    async fn select_options(
        &self,
        selector: &str,
        values: &[String],
    ) -> Result<Vec<String>, EngineError>;

    /// Press a named key.
    async fn press_key(&self, key: &str) -> Result<(), EngineError>;

    /// Dispatch a raw mouse action.
    async fn mouse(&self, action: MouseAction) -> Result<(), EngineError>;

    /// Scroll the page by pixel deltas.
    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<(), EngineError>;

    /// Evaluate a JavaScript expression, returning its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError>;

    /// Capture a screenshot.
    async fn screenshot(&self, options: &CaptureOptions) -> Result<Vec<u8>, EngineError>;

    /// Print to PDF.
    async fn pdf(&self, options: &PdfOptions) -> Result<Vec<u8>, EngineError>;

    /// Attach files to a file input.
    async fn set_input_files(
        &self,
        selector: &str,
        files: &[PathBuf],
    ) -> Result<(), EngineError>;

    /// Set cookies.
    async fn set_cookies(&self, cookies: &[CookieData]) -> Result<(), EngineError>;

    /// Get cookies, optionally filtered by URLs.
    async fn get_cookies(&self, urls: Option<&[String]>) -> Result<Vec<CookieData>, EngineError>;

    /// Delete cookies matching name and optional URL.
    async fn delete_cookies(&self, name: &str, url: Option<&str>) -> Result<(), EngineError>;

    /// Clear all cookies (engine-specific primitive).
    async fn clear_cookies(&self) -> Result<(), EngineError>;

    /// Full HTML content of the document.
    async fn content(&self) -> Result<String, EngineError>;

    /// Attribute value of the first match.
    async fn attribute(&self, selector: &str, name: &str)
    -> Result<Option<String>, EngineError>;

    /// Current document URL.
    async fn current_url(&self) -> Result<String, EngineError>;

    /// Current document title.
    async fn title(&self) -> Result<String, EngineError>;

    /// Subscribe to lifecycle events.
    fn events(&self) -> broadcast::Receiver<PageEvent>;

    /// Close the page.
    async fn close(&self) -> Result<(), EngineError>;
}

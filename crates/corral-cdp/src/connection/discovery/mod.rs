//! Discovery of the browser WebSocket URL over the CDP HTTP endpoint.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::CdpError;

/// Response of `GET /json/version` on the CDP HTTP endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    /// Browser product and version, e.g. `Chrome/131.0.6778.85`.
    #[serde(rename = "Browser")]
    pub browser: String,
    /// Supported CDP protocol version.
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,
    /// WebSocket URL of the browser target.
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// Discover the browser-level WebSocket URL from an HTTP debugging endpoint.
///
/// Chromium serves `GET /json/version` on its remote-debugging port; the
/// response carries `webSocketDebuggerUrl` for the browser target.
///
/// # Errors
///
/// Returns an error if the HTTP request fails or the response does not
/// contain a WebSocket URL.
#[instrument(level = "debug", skip(http_url), fields(http_url = %http_url))]
pub async fn discover_websocket_url(
    http_url: &str,
    timeout: Duration,
) -> Result<String, CdpError> {
    let base = http_url.trim_end_matches('/');
    let version_url = format!("{base}/json/version");

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()?;

    let response = client.get(&version_url).send().await?;
    if !response.status().is_success() {
        return Err(CdpError::Discovery(format!(
            "{version_url} returned {}",
            response.status()
        )));
    }

    let version: BrowserVersion = response.json().await?;
    if version.web_socket_debugger_url.is_empty() {
        return Err(CdpError::Discovery(
            "endpoint did not report a webSocketDebuggerUrl".to_string(),
        ));
    }

    debug!(browser = %version.browser, "discovered browser WebSocket URL");
    Ok(version.web_socket_debugger_url)
}

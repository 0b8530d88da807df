//! Browser domain types.
//!
//! Version probing (used as the liveness check) and orderly shutdown.

use serde::Deserialize;

/// Result of Browser.getVersion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVersionResult {
    /// Protocol version.
    pub protocol_version: String,
    /// Product name and version.
    pub product: String,
    /// Product revision.
    pub revision: String,
    /// User agent string.
    pub user_agent: String,
    /// JavaScript engine version.
    pub js_version: String,
}

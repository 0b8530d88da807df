//! Emulation domain types.
//!
//! Viewport metrics, user agent and locale overrides.

use serde::Serialize;

/// Parameters for Emulation.setDeviceMetricsOverride.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDeviceMetricsOverrideParams {
    /// Viewport width in CSS pixels.
    pub width: u32,
    /// Viewport height in CSS pixels.
    pub height: u32,
    /// Device scale factor (0 disables the override).
    pub device_scale_factor: f64,
    /// Emulate a mobile device.
    pub mobile: bool,
}

/// Parameters for Emulation.setUserAgentOverride.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUserAgentOverrideParams {
    /// User agent string to report.
    pub user_agent: String,
    /// Accept-Language header value to report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_language: Option<String>,
}

/// Parameters for Emulation.setLocaleOverride.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLocaleOverrideParams {
    /// ICU locale, e.g. "en-US".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

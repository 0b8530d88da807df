//! Network domain types.
//!
//! Cookie management and extra request headers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Parameters for Network.enable.
#[derive(Debug, Clone, Serialize, Default)]
pub struct EnableParams {}

/// Cookie SameSite policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CookieSameSite {
    /// Strict same-site enforcement.
    Strict,
    /// Lax same-site enforcement.
    Lax,
    /// No same-site enforcement.
    None,
}

/// A cookie as reported by the browser.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain.
    pub domain: String,
    /// Cookie path.
    pub path: String,
    /// Expiry as UNIX seconds; negative for session cookies.
    pub expires: f64,
    /// Whether the cookie is HTTP-only.
    pub http_only: bool,
    /// Whether the cookie requires a secure context.
    pub secure: bool,
    /// SameSite policy.
    pub same_site: Option<CookieSameSite>,
}

/// A cookie to set via Network.setCookies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieParam {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// URL to associate the cookie with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Cookie domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Cookie path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expiry as UNIX seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// Whether the cookie is HTTP-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// Whether the cookie requires a secure context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// SameSite policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<CookieSameSite>,
}

/// Parameters for Network.setCookies.
#[derive(Debug, Clone, Serialize)]
pub struct SetCookiesParams {
    /// Cookies to set.
    pub cookies: Vec<CookieParam>,
}

/// Parameters for Network.getCookies.
#[derive(Debug, Clone, Serialize, Default)]
pub struct GetCookiesParams {
    /// Restrict to cookies matching these URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}

/// Result of Network.getCookies.
#[derive(Debug, Clone, Deserialize)]
pub struct GetCookiesResult {
    /// Matching cookies.
    pub cookies: Vec<Cookie>,
}

/// Parameters for Network.deleteCookies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCookiesParams {
    /// Name of the cookies to delete.
    pub name: String,
    /// Delete only cookies for this URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Delete only cookies for this domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Delete only cookies for this path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Parameters for Network.setExtraHTTPHeaders.
#[derive(Debug, Clone, Serialize)]
pub struct SetExtraHttpHeadersParams {
    /// Headers added to every request from the target.
    pub headers: HashMap<String, String>,
}

/// Params of the Network.responseReceived event (subset).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceivedEvent {
    /// Request identifier.
    pub request_id: String,
    /// Loader identifier.
    pub loader_id: String,
    /// Resource type ("Document", "XHR", ...).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// The response payload.
    pub response: ResponseInfo,
}

/// HTTP response description (subset).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    /// Response URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
    /// Response headers.
    pub headers: HashMap<String, String>,
}

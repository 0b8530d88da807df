//! Request-id and CSRF admission checks.

use uuid::Uuid;

use crate::envelope::{ErrorCategory, ErrorEnvelope, ErrorSeverity, codes};

use super::{InvocationRecord, Protocol};

/// Header carrying the request id in and out.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Ensure the record carries a request id, generating one when absent.
///
/// Returns the id in effect.
pub fn assign_request_id(record: &mut InvocationRecord) -> String {
    if let Some(existing) = record
        .headers
        .get(REQUEST_ID_HEADER)
        .filter(|v| !v.is_empty())
    {
        record.request_id = Some(existing.clone());
        return existing.clone();
    }
    let id = record
        .request_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    record.request_id = Some(id.clone());
    id
}

/// Origin-based CSRF check for REST invocations.
///
/// State-changing methods must not arrive from a foreign origin. `GET`,
/// `HEAD` and `OPTIONS` are exempt, as are health paths. Requests without
/// an `Origin` header (non-browser callers) pass.
///
/// # Errors
///
/// Returns a security envelope when the origin does not match the host.
pub fn check_csrf(record: &InvocationRecord) -> Result<(), ErrorEnvelope> {
    if record.protocol != Protocol::Rest {
        return Ok(());
    }
    if matches!(record.method.as_str(), "GET" | "HEAD" | "OPTIONS") {
        return Ok(());
    }
    if record
        .resource_path
        .as_deref()
        .is_some_and(|p| p.contains("/health"))
    {
        return Ok(());
    }

    let Some(origin) = record.headers.get("origin").filter(|o| !o.is_empty()) else {
        return Ok(());
    };
    let Some(host) = record.headers.get("host").filter(|h| !h.is_empty()) else {
        return Ok(());
    };

    let origin_host = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default();
    if origin_host == host {
        return Ok(());
    }

    Err(ErrorEnvelope::new(
        codes::SECURITY_CSRF_REJECTED,
        ErrorCategory::Security,
        "Cross-origin request rejected",
    )
    .severity(ErrorSeverity::Medium)
    .tag("operation", record.method.clone()))
}

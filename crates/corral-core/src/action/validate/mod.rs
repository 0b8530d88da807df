//! Per-action schema, range and security validation.
//!
//! Validators are result-typed; only programmer errors are exceptional.
//! Rejected payload content (scripts, file paths) is never echoed back in
//! failure details.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::engine::{
    CaptureOptions, CookieData, LoadPhase, MouseAction, PdfOptions,
};
use crate::envelope::{ErrorCategory, ErrorEnvelope, codes};

use super::{ActionRequest, ActionType, CookieOp, MAX_TIMEOUT, WaitStrategy};

/// Maximum selector length.
pub const MAX_SELECTOR_LEN: usize = 500;
/// Maximum script length.
pub const MAX_SCRIPT_LEN: usize = 50_000;
/// Maximum size of one uploaded file.
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Maximum combined size of uploaded files.
pub const MAX_TOTAL_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// File extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "csv", "json", "xml", "html", "pdf", "png", "jpg", "jpeg", "gif", "webp", "zip",
    "doc", "docx", "xls", "xlsx",
];

/// Path prefixes uploads must never reference.
const FORBIDDEN_PREFIXES: &[&str] = &["/etc", "/proc", "/sys", "/dev", "/root", "/boot"];

/// Identifier patterns that make a script unsafe to run.
static DANGEROUS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\beval\s*\(",
        r"\bFunction\s*\(",
        r"new\s+Function\b",
        r"__proto__",
        r"innerHTML",
        r"\bimport\s*\(",
        r"\bsetTimeout\s*\(",
        r"\bsetInterval\s*\(",
        r"document\.write",
        r"\bfetch\s*\(",
        r"XMLHttpRequest",
        r"\blocalStorage\b",
        r"\bsessionStorage\b",
        r"\bindexedDB\b",
        r"\batob\s*\(",
        r"\bbtoa\s*\(",
        r"(?i)<script",
        r"(?i)javascript:",
        r"(?i)data:text/html",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// A rejected payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Stable code for the rejection.
    pub code: &'static str,
    /// What was wrong.
    pub message: String,
    /// The offending field, when known.
    pub field: Option<String>,
    /// Whether the offending content must not be echoed back.
    pub sensitive: bool,
}

impl ValidationFailure {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            sensitive: false,
        }
    }

    fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Rejection for an unknown action type.
    pub fn unknown_action(action_type: &str) -> Self {
        Self::new(
            codes::VALIDATION_UNKNOWN_ACTION,
            format!("unknown action type {action_type:?}"),
        )
    }

    /// Project onto the canonical envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let mut envelope = ErrorEnvelope::new(
            self.code,
            ErrorCategory::Validation,
            self.message.clone(),
        )
        .suggest(crate::envelope::RecoverySuggestion::CheckRequestFormat);
        if let Some(field) = &self.field {
            envelope = envelope.details(serde_json::json!({ "field": field }));
        }
        if self.sensitive {
            envelope = envelope.sensitive();
        }
        envelope
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationFailure {}

/// Validate and sanitize a URL: http/https only, credentials stripped.
///
/// # Errors
///
/// Returns a failure for non-absolute URLs, disallowed schemes, or hosts
/// outside the allow-list (when one is configured).
pub fn sanitize_url(raw: &str, allowed_hosts: &[String]) -> Result<String, ValidationFailure> {
    let mut url = Url::parse(raw).map_err(|e| {
        ValidationFailure::new(codes::VALIDATION_UNSAFE_URL, format!("invalid URL: {e}"))
            .field("url")
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationFailure::new(
                codes::VALIDATION_UNSAFE_URL,
                format!("scheme {other:?} is not allowed"),
            )
            .field("url"));
        }
    }
    let Some(host) = url.host_str() else {
        return Err(
            ValidationFailure::new(codes::VALIDATION_UNSAFE_URL, "URL has no host").field("url"),
        );
    };
    if !allowed_hosts.is_empty()
        && !allowed_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    {
        return Err(ValidationFailure::new(
            codes::VALIDATION_UNSAFE_URL,
            format!("host {host:?} is not on the allow-list"),
        )
        .field("url"));
    }
    // Strip embedded credentials.
    let _ = url.set_username("");
    let _ = url.set_password(None);
    Ok(url.to_string())
}

/// Validate a selector: non-empty, bounded, no control characters.
///
/// # Errors
///
/// Returns a failure describing the violated rule.
pub fn check_selector(selector: &str) -> Result<(), ValidationFailure> {
    if selector.trim().is_empty() {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            "selector must not be empty",
        )
        .field("selector"));
    }
    if selector.len() > MAX_SELECTOR_LEN {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            format!("selector exceeds {MAX_SELECTOR_LEN} characters"),
        )
        .field("selector"));
    }
    if selector.chars().any(char::is_control) {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            "selector contains control characters",
        )
        .field("selector"));
    }
    Ok(())
}

/// Validate a script against length and the dangerous-identifier list.
///
/// The script content itself is never included in the failure.
///
/// # Errors
///
/// Returns a sensitive failure when the script is oversized or unsafe.
pub fn check_script(script: &str) -> Result<(), ValidationFailure> {
    if script.trim().is_empty() {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            "script must not be empty",
        )
        .field("script"));
    }
    if script.len() > MAX_SCRIPT_LEN {
        return Err(ValidationFailure::new(
            codes::VALIDATION_UNSAFE_SCRIPT,
            format!("script exceeds {MAX_SCRIPT_LEN} characters"),
        )
        .field("script")
        .sensitive());
    }
    for pattern in DANGEROUS_PATTERNS.iter() {
        if pattern.is_match(script) {
            return Err(ValidationFailure::new(
                codes::VALIDATION_UNSAFE_SCRIPT,
                "script contains a disallowed construct",
            )
            .field("script")
            .sensitive());
        }
    }
    Ok(())
}

/// Validate one upload path: relative traversal, dangerous prefixes and
/// the extension allow-list.
///
/// # Errors
///
/// Returns a sensitive failure; the path is not echoed back.
pub fn check_upload_path(path: &Path) -> Result<(), ValidationFailure> {
    let unsafe_path = || {
        ValidationFailure::new(codes::VALIDATION_UNSAFE_FILE, "file path is not allowed")
            .field("files")
            .sensitive()
    };

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(unsafe_path());
    }
    let text = path.to_string_lossy();
    if FORBIDDEN_PREFIXES
        .iter()
        .any(|prefix| text.starts_with(prefix))
    {
        return Err(unsafe_path());
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ValidationFailure::new(
            codes::VALIDATION_UNSAFE_FILE,
            "file extension is not allowed",
        )
        .field("files")
        .sensitive()),
    }
}

/// Validate a caller-supplied timeout override into `[0, 300s]`.
///
/// # Errors
///
/// Returns a failure when the override exceeds the cap.
pub fn check_timeout(timeout: Duration) -> Result<(), ValidationFailure> {
    if timeout > MAX_TIMEOUT {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            format!("timeout exceeds {}s", MAX_TIMEOUT.as_secs()),
        )
        .field("timeout"));
    }
    Ok(())
}

/// Validate a cookie record.
///
/// # Errors
///
/// Returns a failure naming the offending cookie field.
pub fn check_cookie(cookie: &CookieData) -> Result<(), ValidationFailure> {
    if cookie.name.is_empty() || cookie.name.len() > 256 {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            "cookie name must be 1-256 characters",
        )
        .field("cookies"));
    }
    if cookie
        .name
        .chars()
        .any(|c| c.is_control() || c == ';' || c == '=' || c == ',')
    {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            "cookie name contains forbidden characters",
        )
        .field("cookies"));
    }
    if cookie.value.len() > 4096 {
        return Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            "cookie value exceeds 4096 characters",
        )
        .field("cookies"));
    }
    if let Some(same_site) = &cookie.same_site {
        if !matches!(same_site.as_str(), "Strict" | "Lax" | "None") {
            return Err(ValidationFailure::new(
                codes::VALIDATION_FAILED,
                "cookie sameSite must be Strict, Lax or None",
            )
            .field("cookies"));
        }
    }
    Ok(())
}

/// Keys accepted by the keyboard action besides single printable ASCII
/// characters.
pub const NAMED_KEYS: &[&str] = &[
    "Enter", "Tab", "Escape", "Backspace", "Delete", "Home", "End", "PageUp", "PageDown",
    "ArrowUp", "ArrowDown", "ArrowLeft", "ArrowRight", "Space", "Shift", "Control", "Alt", "Meta",
];

fn check_key(key: &str) -> Result<(), ValidationFailure> {
    let single_printable =
        key.len() == 1 && key.chars().all(|c| c.is_ascii_graphic() || c == ' ');
    if single_printable || NAMED_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(
            ValidationFailure::new(codes::VALIDATION_FAILED, format!("unknown key {key:?}"))
                .field("key"),
        )
    }
}

fn check_printable_ascii(text: &str) -> Result<(), ValidationFailure> {
    if text
        .chars()
        .all(|c| c.is_ascii_graphic() || c == ' ' || c == '\n' || c == '\t')
    {
        Ok(())
    } else {
        Err(ValidationFailure::new(
            codes::VALIDATION_FAILED,
            "text must be printable ASCII",
        )
        .field("text"))
    }
}

fn bad_params(detail: impl std::fmt::Display) -> ValidationFailure {
    ValidationFailure::new(
        codes::VALIDATION_FAILED,
        format!("invalid parameters: {detail}"),
    )
}

fn parse<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T, ValidationFailure> {
    serde_json::from_value(params.clone()).map_err(bad_params)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NavigateParams {
    url: String,
    #[serde(default)]
    wait_until: Option<String>,
    #[serde(default)]
    referer: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ClickParams {
    selector: String,
    #[serde(default)]
    click_count: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TypeParams {
    selector: String,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SelectParams {
    selector: String,
    values: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct KeyboardParams {
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WaitParams {
    strategy: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    visible: Option<bool>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScrollParams {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    delta_x: Option<f64>,
    #[serde(default)]
    delta_y: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EvaluateParams {
    script: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UploadParams {
    selector: String,
    files: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CookieParams {
    operation: String,
    #[serde(default)]
    cookies: Option<Vec<CookieData>>,
    #[serde(default)]
    urls: Option<Vec<String>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GetAttributeParams {
    selector: String,
    name: String,
}

/// Parse raw parameters for a known action type and run its validators.
///
/// # Errors
///
/// Returns the first [`ValidationFailure`] encountered.
pub fn parse_and_validate(
    kind: ActionType,
    params: &Value,
) -> Result<ActionRequest, ValidationFailure> {
    match kind {
        ActionType::Navigate => {
            let p: NavigateParams = parse(params)?;
            let url = sanitize_url(&p.url, &[])?;
            let wait_until = match p.wait_until.as_deref() {
                None => LoadPhase::default(),
                Some(raw) => LoadPhase::parse(raw).ok_or_else(|| {
                    ValidationFailure::new(
                        codes::VALIDATION_FAILED,
                        format!("unknown waitUntil {raw:?}"),
                    )
                    .field("waitUntil")
                })?,
            };
            Ok(ActionRequest::Navigate {
                url,
                wait_until,
                referer: p.referer,
            })
        }
        ActionType::Click => {
            let p: ClickParams = parse(params)?;
            check_selector(&p.selector)?;
            let click_count = p.click_count.unwrap_or(1);
            if !(1..=3).contains(&click_count) {
                return Err(ValidationFailure::new(
                    codes::VALIDATION_FAILED,
                    "clickCount must be 1-3",
                )
                .field("clickCount"));
            }
            Ok(ActionRequest::Click {
                selector: p.selector,
                click_count,
            })
        }
        ActionType::Type => {
            let p: TypeParams = parse(params)?;
            check_selector(&p.selector)?;
            check_printable_ascii(&p.text)?;
            Ok(ActionRequest::Type {
                selector: p.selector,
                text: p.text,
            })
        }
        ActionType::Select => {
            let p: SelectParams = parse(params)?;
            check_selector(&p.selector)?;
            if p.values.is_empty() {
                return Err(ValidationFailure::new(
                    codes::VALIDATION_FAILED,
                    "values must not be empty",
                )
                .field("values"));
            }
            Ok(ActionRequest::Select {
                selector: p.selector,
                values: p.values,
            })
        }
        ActionType::Keyboard => {
            let p: KeyboardParams = parse(params)?;
            check_key(&p.key)?;
            Ok(ActionRequest::Keyboard { key: p.key })
        }
        ActionType::Mouse => {
            let action: MouseAction = parse(params)?;
            let coordinates_valid = match action {
                MouseAction::Move { x, y } | MouseAction::Click { x, y } => {
                    x.is_finite() && y.is_finite() && x >= 0.0 && y >= 0.0
                }
                MouseAction::Wheel {
                    x,
                    y,
                    delta_x,
                    delta_y,
                } => {
                    x.is_finite()
                        && y.is_finite()
                        && delta_x.is_finite()
                        && delta_y.is_finite()
                }
            };
            if !coordinates_valid {
                return Err(ValidationFailure::new(
                    codes::VALIDATION_FAILED,
                    "mouse coordinates must be finite and non-negative",
                ));
            }
            Ok(ActionRequest::Mouse { action })
        }
        ActionType::Screenshot => {
            let options: CaptureOptions = parse(params)?;
            if let Some(quality) = options.quality {
                if quality > 100 {
                    return Err(ValidationFailure::new(
                        codes::VALIDATION_FAILED,
                        "quality must be 0-100",
                    )
                    .field("quality"));
                }
            }
            Ok(ActionRequest::Screenshot { options })
        }
        ActionType::Pdf => {
            let options: PdfOptions = parse(params)?;
            if let Some(scale) = options.scale {
                if !(0.1..=2.0).contains(&scale) {
                    return Err(ValidationFailure::new(
                        codes::VALIDATION_FAILED,
                        "scale must be between 0.1 and 2",
                    )
                    .field("scale"));
                }
            }
            Ok(ActionRequest::Pdf { options })
        }
        ActionType::Wait => {
            let p: WaitParams = parse(params)?;
            let strategy = match p.strategy.as_str() {
                "selector" => {
                    let selector = p.selector.ok_or_else(|| {
                        ValidationFailure::new(
                            codes::VALIDATION_FAILED,
                            "selector strategy requires a selector",
                        )
                        .field("selector")
                    })?;
                    check_selector(&selector)?;
                    WaitStrategy::Selector {
                        selector,
                        visible: p.visible.unwrap_or(true),
                    }
                }
                "navigation" => WaitStrategy::Navigation,
                "network-idle" => WaitStrategy::NetworkIdle,
                "timeout" => {
                    let ms = p.timeout_ms.ok_or_else(|| {
                        ValidationFailure::new(
                            codes::VALIDATION_FAILED,
                            "timeout strategy requires timeoutMs",
                        )
                        .field("timeoutMs")
                    })?;
                    let duration = Duration::from_millis(ms);
                    check_timeout(duration)?;
                    WaitStrategy::Timeout { duration }
                }
                "function" => {
                    let script = p.function.ok_or_else(|| {
                        ValidationFailure::new(
                            codes::VALIDATION_FAILED,
                            "function strategy requires a function",
                        )
                        .field("function")
                    })?;
                    check_script(&script)?;
                    WaitStrategy::Function { script }
                }
                "load-state" => {
                    let raw = p.state.unwrap_or_else(|| "load".to_string());
                    let phase = LoadPhase::parse(&raw).ok_or_else(|| {
                        ValidationFailure::new(
                            codes::VALIDATION_FAILED,
                            format!("unknown load state {raw:?}"),
                        )
                        .field("state")
                    })?;
                    WaitStrategy::LoadState { phase }
                }
                other => {
                    return Err(ValidationFailure::new(
                        codes::VALIDATION_FAILED,
                        format!("unknown wait strategy {other:?}"),
                    )
                    .field("strategy"));
                }
            };
            Ok(ActionRequest::Wait { strategy })
        }
        ActionType::Scroll => {
            let p: ScrollParams = parse(params)?;
            if let Some(selector) = &p.selector {
                check_selector(selector)?;
            }
            let delta_x = p.delta_x.unwrap_or(0.0);
            let delta_y = p.delta_y.unwrap_or(0.0);
            if !delta_x.is_finite() || !delta_y.is_finite() {
                return Err(ValidationFailure::new(
                    codes::VALIDATION_FAILED,
                    "scroll deltas must be finite",
                ));
            }
            Ok(ActionRequest::Scroll {
                selector: p.selector,
                delta_x,
                delta_y,
            })
        }
        ActionType::Evaluate => {
            let p: EvaluateParams = parse(params)?;
            check_script(&p.script)?;
            Ok(ActionRequest::Evaluate { script: p.script })
        }
        ActionType::Upload => {
            let p: UploadParams = parse(params)?;
            check_selector(&p.selector)?;
            if p.files.is_empty() {
                return Err(ValidationFailure::new(
                    codes::VALIDATION_FAILED,
                    "files must not be empty",
                )
                .field("files"));
            }
            let mut files = Vec::with_capacity(p.files.len());
            for raw in &p.files {
                let path = PathBuf::from(raw);
                check_upload_path(&path)?;
                files.push(path);
            }
            Ok(ActionRequest::Upload {
                selector: p.selector,
                files,
            })
        }
        ActionType::Cookie => {
            let p: CookieParams = parse(params)?;
            let op = match p.operation.as_str() {
                "set" => {
                    let cookies = p.cookies.unwrap_or_default();
                    if cookies.is_empty() {
                        return Err(ValidationFailure::new(
                            codes::VALIDATION_FAILED,
                            "set requires cookies",
                        )
                        .field("cookies"));
                    }
                    for cookie in &cookies {
                        check_cookie(cookie)?;
                    }
                    CookieOp::Set { cookies }
                }
                "get" => CookieOp::Get { urls: p.urls },
                "delete" => {
                    let name = p.name.ok_or_else(|| {
                        ValidationFailure::new(
                            codes::VALIDATION_FAILED,
                            "delete requires a cookie name",
                        )
                        .field("name")
                    })?;
                    CookieOp::Delete { name, url: p.url }
                }
                "clear" => CookieOp::Clear,
                other => {
                    return Err(ValidationFailure::new(
                        codes::VALIDATION_FAILED,
                        format!("unknown cookie operation {other:?}"),
                    )
                    .field("operation"));
                }
            };
            Ok(ActionRequest::Cookie { op })
        }
        ActionType::GetAttribute => {
            let p: GetAttributeParams = parse(params)?;
            check_selector(&p.selector)?;
            if p.name.is_empty()
                || p.name.len() > 100
                || !p
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
            {
                return Err(ValidationFailure::new(
                    codes::VALIDATION_FAILED,
                    "attribute name is invalid",
                )
                .field("name"));
            }
            Ok(ActionRequest::GetAttribute {
                selector: p.selector,
                name: p.name,
            })
        }
        ActionType::Content => Ok(ActionRequest::Content),
    }
}

#[cfg(test)]
mod tests;

//! Production engine speaking the Chrome DevTools Protocol.
//!
//! One [`CdpEngineHandle`] owns one Chromium process and its WebSocket
//! connection; pages are flat-session CDP targets. Element-level work goes
//! through Runtime evaluation plus Input dispatch, mirroring how the
//! DevTools front-end itself drives a page.

mod launcher;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde_json::{Value, json};
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tokio::sync::broadcast;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

use corral_cdp::CdpConnection;
use corral_cdp::protocol::{browser, dom, emulation, input, network, page, runtime, target};

use super::{
    CaptureOptions, CookieData, EngineBackend, EngineError, EngineHandle, EnginePage,
    ImageFormat, LaunchOptions, LoadPhase, MouseAction, NavigationOutcome, PageEvent, PageOptions,
    PdfOptions, ResourceUsage,
};

/// Event channel capacity per page.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Poll interval for selector waits.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The production CDP engine backend.
#[derive(Debug, Default)]
pub struct CdpEngine;

impl CdpEngine {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineBackend for CdpEngine {
    #[instrument(level = "info", skip_all)]
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn EngineHandle>, EngineError> {
        let launched = launcher::launch(options).await?;
        let connection = CdpConnection::connect(&launched.ws_url)
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;
        info!(ws_url = %launched.ws_url, "engine connected");
        Ok(Arc::new(CdpEngineHandle {
            id: launched.ws_url,
            connection: Arc::new(connection),
            process: Mutex::new(Some(launched.child)),
            _user_data: launched.user_data,
        }))
    }
}

/// One Chromium process under CDP control.
pub struct CdpEngineHandle {
    id: String,
    connection: Arc<CdpConnection>,
    process: Mutex<Option<Child>>,
    _user_data: tempfile::TempDir,
}

impl CdpEngineHandle {
    fn pid(&self) -> Option<u32> {
        self.process.lock().as_ref().map(std::process::Child::id)
    }
}

#[async_trait]
impl EngineHandle for CdpEngineHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self, options: &PageOptions) -> Result<Arc<dyn EnginePage>, EngineError> {
        let created: target::CreateTargetResult = self
            .connection
            .send_command(
                "Target.createTarget",
                Some(target::CreateTargetParams {
                    url: "about:blank".to_string(),
                    browser_context_id: None,
                    background: Some(true),
                }),
                None,
            )
            .await?;

        let attached: target::AttachToTargetResult = self
            .connection
            .send_command(
                "Target.attachToTarget",
                Some(target::AttachToTargetParams {
                    target_id: created.target_id.clone(),
                    flatten: true,
                }),
                None,
            )
            .await?;
        let session = attached.session_id;

        self.connection
            .send_command::<_, Value>("Page.enable", Some(page::EnableParams::default()), Some(&session))
            .await?;
        self.connection
            .send_command::<_, Value>(
                "Page.setLifecycleEventsEnabled",
                Some(page::SetLifecycleEventsEnabledParams { enabled: true }),
                Some(&session),
            )
            .await?;
        self.connection
            .send_command::<_, Value>(
                "Network.enable",
                Some(network::EnableParams::default()),
                Some(&session),
            )
            .await?;

        if let Some(viewport) = options.viewport {
            self.connection
                .send_command::<_, Value>(
                    "Emulation.setDeviceMetricsOverride",
                    Some(emulation::SetDeviceMetricsOverrideParams {
                        width: viewport.width,
                        height: viewport.height,
                        device_scale_factor: 1.0,
                        mobile: false,
                    }),
                    Some(&session),
                )
                .await?;
        }
        if let Some(user_agent) = &options.user_agent {
            self.connection
                .send_command::<_, Value>(
                    "Emulation.setUserAgentOverride",
                    Some(emulation::SetUserAgentOverrideParams {
                        user_agent: user_agent.clone(),
                        accept_language: options.locale.clone(),
                    }),
                    Some(&session),
                )
                .await?;
        }
        if let Some(locale) = &options.locale {
            self.connection
                .send_command::<_, Value>(
                    "Emulation.setLocaleOverride",
                    Some(emulation::SetLocaleOverrideParams {
                        locale: Some(locale.clone()),
                    }),
                    Some(&session),
                )
                .await?;
        }
        if !options.extra_headers.is_empty() {
            self.connection
                .send_command::<_, Value>(
                    "Network.setExtraHTTPHeaders",
                    Some(network::SetExtraHttpHeadersParams {
                        headers: options.extra_headers.clone(),
                    }),
                    Some(&session),
                )
                .await?;
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let pump = tokio::spawn(event_pump(
            self.connection.subscribe_events(),
            session.clone(),
            events.clone(),
        ));

        Ok(Arc::new(CdpEnginePage {
            target_id: created.target_id,
            session,
            connection: self.connection.clone(),
            events,
            closed: AtomicBool::new(false),
            _pump: pump,
        }))
    }

    async fn is_alive(&self) -> bool {
        self.connection
            .send_command::<(), browser::GetVersionResult>("Browser.getVersion", None, None)
            .await
            .is_ok()
    }

    async fn resource_usage(&self) -> ResourceUsage {
        let Some(pid) = self.pid() else {
            return ResourceUsage::default();
        };
        let refresh = RefreshKind::new()
            .with_processes(ProcessRefreshKind::new().with_memory().with_cpu());
        let system = System::new_with_specifics(refresh);
        system
            .process(Pid::from_u32(pid))
            .map(|process| ResourceUsage {
                memory_bytes: process.memory(),
                cpu_percent: process.cpu_usage(),
            })
            .unwrap_or_default()
    }

    async fn close(&self) -> Result<(), EngineError> {
        // Ask nicely first; kill if the browser does not comply.
        let _ = self
            .connection
            .send_command::<(), Value>("Browser.close", None, None)
            .await;
        if let Some(mut child) = self.process.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        Ok(())
    }
}

impl std::fmt::Debug for CdpEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpEngineHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Relay CDP events for one session channel onto the page event channel.
async fn event_pump(
    mut source: broadcast::Receiver<corral_cdp::EventFrame>,
    session: String,
    sink: broadcast::Sender<PageEvent>,
) {
    loop {
        let event = match source.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "page event pump lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if event.channel.session_id() != Some(session.as_str()) {
            continue;
        }
        let mapped = match event.method.as_str() {
            "Page.frameNavigated" => event
                .decode::<page::FrameNavigatedEvent>()
                .filter(|e| e.frame.parent_id.is_none())
                .map(|e| PageEvent::Navigated { url: e.frame.url }),
            "Page.loadEventFired" => Some(PageEvent::LoadFinished),
            "Runtime.exceptionThrown" => Some(PageEvent::PageError {
                message: event.params["exceptionDetails"]["text"]
                    .as_str()
                    .unwrap_or("uncaught exception")
                    .to_string(),
            }),
            _ => None,
        };
        if let Some(mapped) = mapped {
            if sink.send(mapped).is_err() {
                break;
            }
        }
    }
    debug!(session = %session, "page event pump ended");
}

/// One CDP page target.
pub struct CdpEnginePage {
    target_id: String,
    session: String,
    connection: Arc<CdpConnection>,
    events: broadcast::Sender<PageEvent>,
    closed: AtomicBool,
    _pump: tokio::task::JoinHandle<()>,
}

impl CdpEnginePage {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Evaluate an expression, returning its JSON value.
    async fn eval(&self, expression: &str) -> Result<Value, EngineError> {
        self.ensure_open()?;
        let result: runtime::EvaluateResult = self
            .connection
            .send_command(
                "Runtime.evaluate",
                Some(runtime::EvaluateParams::by_value(expression)),
                Some(&self.session),
            )
            .await?;
        if let Some(details) = result.exception_details {
            return Err(EngineError::Evaluation(details.message()));
        }
        Ok(result.result.value.unwrap_or(Value::Null))
    }

    /// Center of the first element matching the selector.
    async fn element_center(&self, selector: &str) -> Result<(f64, f64), EngineError> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return null; \
             const r = el.getBoundingClientRect(); \
             return {{ x: r.x + r.width / 2, y: r.y + r.height / 2 }}; }})()",
            sel = json!(selector),
        );
        let value = self.eval(&expr).await?;
        let (Some(x), Some(y)) = (value["x"].as_f64(), value["y"].as_f64()) else {
            return Err(EngineError::SelectorNotFound(selector.to_string()));
        };
        Ok((x, y))
    }

    async fn dispatch_mouse(
        &self,
        params: input::DispatchMouseEventParams,
    ) -> Result<(), EngineError> {
        self.connection
            .send_command::<_, Value>("Input.dispatchMouseEvent", Some(params), Some(&self.session))
            .await?;
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64, click_count: u32) -> Result<(), EngineError> {
        self.dispatch_mouse(input::DispatchMouseEventParams {
            event_type: input::MouseEventType::MouseMoved,
            x,
            y,
            button: None,
            click_count: None,
            delta_x: None,
            delta_y: None,
        })
        .await?;
        self.dispatch_mouse(input::DispatchMouseEventParams::pressed(
            x,
            y,
            input::MouseButton::Left,
            click_count,
        ))
        .await?;
        self.dispatch_mouse(input::DispatchMouseEventParams::released(
            x,
            y,
            input::MouseButton::Left,
            click_count,
        ))
        .await
    }
}

#[async_trait]
impl EnginePage for CdpEnginePage {
    fn id(&self) -> &str {
        &self.target_id
    }

    async fn goto(
        &self,
        url: &str,
        wait_until: LoadPhase,
        referer: Option<&str>,
        deadline: Duration,
    ) -> Result<NavigationOutcome, EngineError> {
        self.ensure_open()?;
        let mut raw_events = self.connection.subscribe_events();

        let navigated: page::NavigateResult = self
            .connection
            .send_command(
                "Page.navigate",
                Some(page::NavigateParams {
                    url: url.to_string(),
                    referrer: referer.map(str::to_string),
                }),
                Some(&self.session),
            )
            .await?;
        if let Some(error_text) = navigated.error_text {
            return Err(EngineError::Navigation(error_text));
        }

        let mut outcome = NavigationOutcome {
            url: url.to_string(),
            final_url: url.to_string(),
            status: None,
            status_text: String::new(),
            headers: HashMap::new(),
        };
        if wait_until == LoadPhase::Commit {
            return Ok(outcome);
        }

        let loader_id = navigated.loader_id;
        let until = Instant::now() + deadline;
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(EngineError::Timeout {
                    what: format!("navigation to {url}"),
                });
            }
            let event = match timeout(remaining, raw_events.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(EngineError::Closed),
                Err(_) => {
                    return Err(EngineError::Timeout {
                        what: format!("navigation to {url}"),
                    });
                }
            };
            if event.channel.session_id() != Some(self.session.as_str()) {
                continue;
            }

            match event.method.as_str() {
                "Network.responseReceived" => {
                    if let Some(received) = event.decode::<network::ResponseReceivedEvent>() {
                        let same_loader = loader_id
                            .as_deref()
                            .is_none_or(|id| id == received.loader_id);
                        if received.resource_type == "Document" && same_loader {
                            outcome.final_url = received.response.url.clone();
                            outcome.status = Some(received.response.status);
                            outcome.status_text = received.response.status_text.clone();
                            outcome.headers = received.response.headers;
                        }
                    }
                }
                "Page.frameNavigated" => {
                    if let Some(nav) = event.decode::<page::FrameNavigatedEvent>() {
                        if nav.frame.parent_id.is_none() {
                            outcome.final_url = nav.frame.url;
                        }
                    }
                }
                "Page.domContentEventFired" if wait_until == LoadPhase::DomContentLoaded => {
                    return Ok(outcome);
                }
                "Page.loadEventFired" if wait_until == LoadPhase::Load => {
                    return Ok(outcome);
                }
                "Page.lifecycleEvent" if wait_until == LoadPhase::NetworkIdle => {
                    if let Some(lifecycle) = event.decode::<page::LifecycleEvent>() {
                        if lifecycle.name == "networkIdle" {
                            return Ok(outcome);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        visible: bool,
        deadline: Duration,
    ) -> Result<(), EngineError> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             if (!{visible}) return true; \
             const r = el.getBoundingClientRect(); \
             const style = getComputedStyle(el); \
             return r.width > 0 && r.height > 0 && style.visibility !== 'hidden'; }})()",
            sel = json!(selector),
        );
        let until = Instant::now() + deadline;
        loop {
            if self.eval(&expr).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if Instant::now() >= until {
                return Err(EngineError::SelectorNotFound(selector.to_string()));
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn is_in_viewport(&self, selector: &str) -> Result<bool, EngineError> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return null; \
             const r = el.getBoundingClientRect(); \
             return r.bottom > 0 && r.right > 0 && \
                    r.top < innerHeight && r.left < innerWidth; }})()",
            sel = json!(selector),
        );
        match self.eval(&expr).await? {
            Value::Bool(b) => Ok(b),
            _ => Err(EngineError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<(), EngineError> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.scrollIntoView({{ block: 'center', inline: 'center' }}); return true; }})()",
            sel = json!(selector),
        );
        match self.eval(&expr).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(EngineError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn click(&self, selector: &str, click_count: u32) -> Result<(), EngineError> {
        let (x, y) = self.element_center(selector).await?;
        self.click_at(x, y, click_count).await
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), EngineError> {
        // Focus via click, then insert the text in one batch.
        let (x, y) = self.element_center(selector).await?;
        self.click_at(x, y, 1).await?;
        self.connection
            .send_command::<_, Value>(
                "Input.insertText",
                Some(input::InsertTextParams {
                    text: text.to_string(),
                }),
                Some(&self.session),
            )
            .await?;
        Ok(())
    }

    async fn select_options(
        &self,
        selector: &str,
        values: &[String],
    ) -> Result<Vec<String>, EngineError> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return null; \
             const wanted = {values}; const selected = []; \
             for (const option of el.options) {{ \
               option.selected = wanted.includes(option.value); \
               if (option.selected) selected.push(option.value); \
             }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return selected; }})()",
            sel = json!(selector),
            values = json!(values),
        );
        match self.eval(&expr).await? {
            Value::Array(selected) => Ok(selected
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()),
            _ => Err(EngineError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn press_key(&self, key: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        let (event_type, text) = if key.chars().count() == 1 {
            (input::KeyEventType::KeyDown, Some(key.to_string()))
        } else {
            (input::KeyEventType::RawKeyDown, None)
        };
        self.connection
            .send_command::<_, Value>(
                "Input.dispatchKeyEvent",
                Some(input::DispatchKeyEventParams {
                    event_type,
                    key: Some(key.to_string()),
                    code: None,
                    text: text.clone(),
                    modifiers: None,
                    windows_virtual_key_code: None,
                }),
                Some(&self.session),
            )
            .await?;
        self.connection
            .send_command::<_, Value>(
                "Input.dispatchKeyEvent",
                Some(input::DispatchKeyEventParams {
                    event_type: input::KeyEventType::KeyUp,
                    key: Some(key.to_string()),
                    code: None,
                    text,
                    modifiers: None,
                    windows_virtual_key_code: None,
                }),
                Some(&self.session),
            )
            .await?;
        Ok(())
    }

    async fn mouse(&self, action: MouseAction) -> Result<(), EngineError> {
        self.ensure_open()?;
        match action {
            MouseAction::Move { x, y } => {
                self.dispatch_mouse(input::DispatchMouseEventParams {
                    event_type: input::MouseEventType::MouseMoved,
                    x,
                    y,
                    button: None,
                    click_count: None,
                    delta_x: None,
                    delta_y: None,
                })
                .await
            }
            MouseAction::Click { x, y } => self.click_at(x, y, 1).await,
            MouseAction::Wheel {
                x,
                y,
                delta_x,
                delta_y,
            } => {
                self.dispatch_mouse(input::DispatchMouseEventParams::wheel(
                    x, y, delta_x, delta_y,
                ))
                .await
            }
        }
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<(), EngineError> {
        let expr = format!("window.scrollBy({delta_x}, {delta_y}); true");
        self.eval(&expr).await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        self.eval(expression).await
    }

    async fn screenshot(&self, options: &CaptureOptions) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        let format = match options.format {
            ImageFormat::Png => page::ScreenshotFormat::Png,
            ImageFormat::Jpeg => page::ScreenshotFormat::Jpeg,
            ImageFormat::Webp => page::ScreenshotFormat::Webp,
        };
        let result: page::CaptureScreenshotResult = self
            .connection
            .send_command(
                "Page.captureScreenshot",
                Some(page::CaptureScreenshotParams {
                    format: Some(format),
                    quality: options.quality,
                    clip: None,
                    capture_beyond_viewport: Some(options.full_page),
                }),
                Some(&self.session),
            )
            .await?;
        BASE64
            .decode(result.data)
            .map_err(|e| EngineError::Protocol(format!("bad screenshot payload: {e}")))
    }

    async fn pdf(&self, options: &PdfOptions) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        let result: page::PrintToPdfResult = self
            .connection
            .send_command(
                "Page.printToPDF",
                Some(page::PrintToPdfParams {
                    landscape: Some(options.landscape),
                    print_background: Some(options.print_background),
                    paper_width: options.paper_width,
                    paper_height: options.paper_height,
                    margin_top: options.margin,
                    margin_bottom: options.margin,
                    margin_left: options.margin,
                    margin_right: options.margin,
                    page_ranges: options.page_ranges.clone(),
                    scale: options.scale,
                }),
                Some(&self.session),
            )
            .await?;
        BASE64
            .decode(result.data)
            .map_err(|e| EngineError::Protocol(format!("bad PDF payload: {e}")))
    }

    async fn set_input_files(
        &self,
        selector: &str,
        files: &[PathBuf],
    ) -> Result<(), EngineError> {
        self.ensure_open()?;
        // Resolve the element to a remote object for DOM.setFileInputFiles.
        let locate: runtime::EvaluateResult = self
            .connection
            .send_command(
                "Runtime.evaluate",
                Some(runtime::EvaluateParams::by_object(format!(
                    "document.querySelector({sel})",
                    sel = json!(selector),
                ))),
                Some(&self.session),
            )
            .await?;
        let object_id = locate
            .result
            .object_id
            .ok_or_else(|| EngineError::SelectorNotFound(selector.to_string()))?;

        self.connection
            .send_command::<_, Value>(
                "DOM.setFileInputFiles",
                Some(dom::SetFileInputFilesParams {
                    files: files
                        .iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect(),
                    object_id: Some(object_id.clone()),
                }),
                Some(&self.session),
            )
            .await?;
        let _ = self
            .connection
            .send_command::<_, Value>(
                "Runtime.releaseObject",
                Some(runtime::ReleaseObjectParams { object_id }),
                Some(&self.session),
            )
            .await;
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[CookieData]) -> Result<(), EngineError> {
        self.ensure_open()?;
        let cookies = cookies
            .iter()
            .map(|c| network::CookieParam {
                name: c.name.clone(),
                value: c.value.clone(),
                url: c.url.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.as_deref().and_then(|s| match s {
                    "Strict" => Some(network::CookieSameSite::Strict),
                    "Lax" => Some(network::CookieSameSite::Lax),
                    "None" => Some(network::CookieSameSite::None),
                    _ => None,
                }),
            })
            .collect();
        self.connection
            .send_command::<_, Value>(
                "Network.setCookies",
                Some(network::SetCookiesParams { cookies }),
                Some(&self.session),
            )
            .await?;
        Ok(())
    }

    async fn get_cookies(&self, urls: Option<&[String]>) -> Result<Vec<CookieData>, EngineError> {
        self.ensure_open()?;
        let result: network::GetCookiesResult = self
            .connection
            .send_command(
                "Network.getCookies",
                Some(network::GetCookiesParams {
                    urls: urls.map(<[String]>::to_vec),
                }),
                Some(&self.session),
            )
            .await?;
        Ok(result
            .cookies
            .into_iter()
            .map(|c| CookieData {
                name: c.name,
                value: c.value,
                domain: Some(c.domain),
                path: Some(c.path),
                url: None,
                expires: (c.expires >= 0.0).then_some(c.expires),
                http_only: Some(c.http_only),
                secure: Some(c.secure),
                same_site: c.same_site.map(|s| {
                    match s {
                        network::CookieSameSite::Strict => "Strict",
                        network::CookieSameSite::Lax => "Lax",
                        network::CookieSameSite::None => "None",
                    }
                    .to_string()
                }),
            })
            .collect())
    }

    async fn delete_cookies(&self, name: &str, url: Option<&str>) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.connection
            .send_command::<_, Value>(
                "Network.deleteCookies",
                Some(network::DeleteCookiesParams {
                    name: name.to_string(),
                    url: url.map(str::to_string),
                    domain: None,
                    path: None,
                }),
                Some(&self.session),
            )
            .await?;
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        // CDP-specific primitive; there is no portable equivalent.
        self.connection
            .send_command::<(), Value>("Network.clearBrowserCookies", None, Some(&self.session))
            .await?;
        Ok(())
    }

    async fn content(&self) -> Result<String, EngineError> {
        match self.eval("document.documentElement.outerHTML").await? {
            Value::String(html) => Ok(html),
            other => Err(EngineError::Protocol(format!(
                "unexpected content payload: {other}"
            ))),
        }
    }

    async fn attribute(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, EngineError> {
        let expr = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return undefined; \
             return el.getAttribute({name}); }})()",
            sel = json!(selector),
            name = json!(name),
        );
        match self.eval(&expr).await? {
            Value::String(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            _ => Err(EngineError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        match self.eval("window.location.href").await? {
            Value::String(url) => Ok(url),
            _ => Err(EngineError::Protocol("no URL reported".to_string())),
        }
    }

    async fn title(&self) -> Result<String, EngineError> {
        match self.eval("document.title").await? {
            Value::String(title) => Ok(title),
            _ => Ok(String::new()),
        }
    }

    fn events(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connection
            .send_command::<_, target::CloseTargetResult>(
                "Target.closeTarget",
                Some(target::CloseTargetParams {
                    target_id: self.target_id.clone(),
                }),
                None,
            )
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for CdpEnginePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpEnginePage")
            .field("target_id", &self.target_id)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

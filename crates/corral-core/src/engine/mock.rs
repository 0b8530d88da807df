//! Deterministic in-process engine used by tests.
//!
//! The mock records every action, serves navigations from a configurable
//! status table, and exposes failure-injection knobs (launch failures,
//! transient navigation failures, missing selectors, artificial delays) so
//! pool, executor and dispatcher behavior can be exercised without a real
//! browser.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    CaptureOptions, CookieData, EngineBackend, EngineError, EngineHandle, EnginePage, LaunchOptions,
    LoadPhase, MouseAction, NavigationOutcome, PageEvent, PageOptions, PdfOptions, ResourceUsage,
};

/// Event channel capacity per mock page.
const EVENT_CHANNEL_SIZE: usize = 32;

/// Shared behavior knobs copied into new pages.
#[derive(Debug, Clone)]
struct MockBehavior {
    navigation_status: u16,
    fail_navigations: usize,
    missing_selectors: HashSet<String>,
    outside_viewport: HashSet<String>,
    action_delay: Duration,
    evaluate_result: Value,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            navigation_status: 200,
            fail_navigations: 0,
            missing_selectors: HashSet::new(),
            outside_viewport: HashSet::new(),
            action_delay: Duration::ZERO,
            evaluate_result: Value::Null,
        }
    }
}

/// The mock engine backend.
#[derive(Debug, Default)]
pub struct MockEngine {
    launches: AtomicUsize,
    fail_launches: AtomicUsize,
    behavior: Mutex<MockBehavior>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockEngine {
    /// Create a mock engine with default behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` launches fail.
    pub fn fail_next_launches(&self, n: usize) {
        self.fail_launches.store(n, Ordering::SeqCst);
    }

    /// Status every subsequent navigation reports.
    pub fn set_navigation_status(&self, status: u16) {
        self.behavior.lock().navigation_status = status;
    }

    /// Make the next `n` navigations fail with a transient error.
    pub fn fail_next_navigations(&self, n: usize) {
        self.behavior.lock().fail_navigations = n;
    }

    /// Selectors that will never match.
    pub fn add_missing_selector(&self, selector: &str) {
        self.behavior
            .lock()
            .missing_selectors
            .insert(selector.to_string());
    }

    /// Selectors that match but sit outside the viewport.
    pub fn add_outside_viewport(&self, selector: &str) {
        self.behavior
            .lock()
            .outside_viewport
            .insert(selector.to_string());
    }

    /// Delay applied to every page action.
    pub fn set_action_delay(&self, delay: Duration) {
        self.behavior.lock().action_delay = delay;
    }

    /// Value returned by `evaluate`.
    pub fn set_evaluate_result(&self, value: Value) {
        self.behavior.lock().evaluate_result = value;
    }

    /// Number of successful launches so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Handles launched so far.
    pub fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.handles.lock().clone()
    }

    /// All pages across all handles.
    pub fn pages(&self) -> Vec<Arc<MockPage>> {
        self.handles
            .lock()
            .iter()
            .flat_map(|h| h.pages.lock().clone())
            .collect()
    }
}

#[async_trait]
impl EngineBackend for MockEngine {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn EngineHandle>, EngineError> {
        let remaining = self.fail_launches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_launches.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::Launch("injected launch failure".to_string()));
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(MockHandle {
            id: format!("mock-{}", Uuid::new_v4()),
            alive: AtomicBool::new(true),
            behavior: Mutex::new(self.behavior.lock().clone()),
            usage: Mutex::new(ResourceUsage::default()),
            pages: Mutex::new(Vec::new()),
        });
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

/// One mock engine process.
#[derive(Debug)]
pub struct MockHandle {
    id: String,
    alive: AtomicBool,
    behavior: Mutex<MockBehavior>,
    usage: Mutex<ResourceUsage>,
    pages: Mutex<Vec<Arc<MockPage>>>,
}

impl MockHandle {
    /// Simulate a crashed process.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Override reported resource usage.
    pub fn set_usage(&self, usage: ResourceUsage) {
        *self.usage.lock() = usage;
    }
}

#[async_trait]
impl EngineHandle for MockHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self, options: &PageOptions) -> Result<Arc<dyn EnginePage>, EngineError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let page = Arc::new(MockPage {
            id: format!("mock-page-{}", Uuid::new_v4()),
            behavior: Mutex::new(self.behavior.lock().clone()),
            url: Mutex::new("about:blank".to_string()),
            title: Mutex::new(String::new()),
            options: options.clone(),
            cookies: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            attributes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            events,
        });
        self.pages.lock().push(page.clone());
        Ok(page)
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn resource_usage(&self) -> ResourceUsage {
        *self.usage.lock()
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// One mock browsing surface.
#[derive(Debug)]
pub struct MockPage {
    id: String,
    behavior: Mutex<MockBehavior>,
    url: Mutex<String>,
    title: Mutex<String>,
    /// Options the page was created with, for assertions.
    pub options: PageOptions,
    cookies: Mutex<Vec<CookieData>>,
    actions: Mutex<Vec<String>>,
    attributes: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
    events: broadcast::Sender<PageEvent>,
}

impl MockPage {
    /// Actions recorded so far, in order.
    pub fn recorded_actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }

    /// Preload an attribute served by [`EnginePage::attribute`].
    pub fn set_attribute(&self, selector: &str, name: &str, value: &str) {
        self.attributes
            .lock()
            .insert(format!("{selector}\u{1}{name}"), value.to_string());
    }

    fn record(&self, action: impl Into<String>) {
        self.actions.lock().push(action.into());
    }

    async fn pace(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        let delay = self.behavior.lock().action_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn check_selector(&self, selector: &str) -> Result<(), EngineError> {
        if self.behavior.lock().missing_selectors.contains(selector) {
            return Err(EngineError::SelectorNotFound(selector.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EnginePage for MockPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn goto(
        &self,
        url: &str,
        _wait_until: LoadPhase,
        _referer: Option<&str>,
        _timeout: Duration,
    ) -> Result<NavigationOutcome, EngineError> {
        self.pace().await?;
        {
            let mut behavior = self.behavior.lock();
            if behavior.fail_navigations > 0 {
                behavior.fail_navigations -= 1;
                return Err(EngineError::Navigation("injected network failure".to_string()));
            }
        }

        let status = self.behavior.lock().navigation_status;
        *self.url.lock() = url.to_string();
        *self.title.lock() = format!("Mock: {url}");
        self.record(format!("goto {url}"));
        let _ = self.events.send(PageEvent::Navigated {
            url: url.to_string(),
        });
        let _ = self.events.send(PageEvent::LoadFinished);

        Ok(NavigationOutcome {
            url: url.to_string(),
            final_url: url.to_string(),
            status: Some(status),
            status_text: if status < 400 { "OK" } else { "Error" }.to_string(),
            headers: HashMap::from([(
                "content-type".to_string(),
                "text/html".to_string(),
            )]),
        })
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _visible: bool,
        _timeout: Duration,
    ) -> Result<(), EngineError> {
        self.pace().await?;
        self.check_selector(selector)
    }

    async fn is_in_viewport(&self, selector: &str) -> Result<bool, EngineError> {
        self.check_selector(selector)?;
        Ok(!self.behavior.lock().outside_viewport.contains(selector))
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<(), EngineError> {
        self.check_selector(selector)?;
        self.behavior.lock().outside_viewport.remove(selector);
        self.record(format!("scroll_into_view {selector}"));
        Ok(())
    }

    async fn click(&self, selector: &str, click_count: u32) -> Result<(), EngineError> {
        self.pace().await?;
        self.check_selector(selector)?;
        self.record(format!("click {selector} x{click_count}"));
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), EngineError> {
        self.pace().await?;
        self.check_selector(selector)?;
        self.record(format!("type {selector} {text}"));
        Ok(())
    }

    async fn select_options(
        &self,
        selector: &str,
        values: &[String],
    ) -> Result<Vec<String>, EngineError> {
        self.pace().await?;
        self.check_selector(selector)?;
        self.record(format!("select {selector} {}", values.join(",")));
        Ok(values.to_vec())
    }

    async fn press_key(&self, key: &str) -> Result<(), EngineError> {
        self.pace().await?;
        self.record(format!("press {key}"));
        Ok(())
    }

    async fn mouse(&self, action: MouseAction) -> Result<(), EngineError> {
        self.pace().await?;
        self.record(format!("mouse {action:?}"));
        Ok(())
    }

    async fn scroll_by(&self, delta_x: f64, delta_y: f64) -> Result<(), EngineError> {
        self.pace().await?;
        self.record(format!("scroll {delta_x},{delta_y}"));
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, EngineError> {
        self.pace().await?;
        if expression.contains("throw") {
            return Err(EngineError::Evaluation("script threw".to_string()));
        }
        self.record(format!("evaluate {expression}"));
        Ok(self.behavior.lock().evaluate_result.clone())
    }

    async fn screenshot(&self, options: &CaptureOptions) -> Result<Vec<u8>, EngineError> {
        self.pace().await?;
        self.record(format!("screenshot {:?}", options.format));
        // A 1x1 PNG header stub is enough for assertions.
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn pdf(&self, _options: &PdfOptions) -> Result<Vec<u8>, EngineError> {
        self.pace().await?;
        self.record("pdf".to_string());
        Ok(b"%PDF-1.7".to_vec())
    }

    async fn set_input_files(
        &self,
        selector: &str,
        files: &[PathBuf],
    ) -> Result<(), EngineError> {
        self.pace().await?;
        self.check_selector(selector)?;
        self.record(format!("upload {selector} {} files", files.len()));
        Ok(())
    }

    async fn set_cookies(&self, cookies: &[CookieData]) -> Result<(), EngineError> {
        self.pace().await?;
        self.cookies.lock().extend_from_slice(cookies);
        self.record(format!("set_cookies {}", cookies.len()));
        Ok(())
    }

    async fn get_cookies(&self, _urls: Option<&[String]>) -> Result<Vec<CookieData>, EngineError> {
        self.pace().await?;
        Ok(self.cookies.lock().clone())
    }

    async fn delete_cookies(&self, name: &str, _url: Option<&str>) -> Result<(), EngineError> {
        self.pace().await?;
        self.cookies.lock().retain(|c| c.name != name);
        self.record(format!("delete_cookies {name}"));
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), EngineError> {
        self.pace().await?;
        self.cookies.lock().clear();
        self.record("clear_cookies".to_string());
        Ok(())
    }

    async fn content(&self) -> Result<String, EngineError> {
        self.pace().await?;
        let url = self.url.lock().clone();
        Ok(format!("<html><body>mock content for {url}</body></html>"))
    }

    async fn attribute(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, EngineError> {
        self.pace().await?;
        self.check_selector(selector)?;
        Ok(self
            .attributes
            .lock()
            .get(&format!("{selector}\u{1}{name}"))
            .cloned())
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        Ok(self.url.lock().clone())
    }

    async fn title(&self) -> Result<String, EngineError> {
        Ok(self.title.lock().clone())
    }

    fn events(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

//! # Page Manager
//!
//! Owns the map from page ids to engine page handles and mirrors each page
//! in a [`PageInfo`] record. Every operation re-verifies the ownership
//! chain (`principal -> session -> context -> page`) against the stores,
//! which remain the single source of truth. An idle-cleanup loop closes
//! pages without recent activity; closed ids are tombstoned for a grace
//! period so late engine events cannot resurrect them.

pub mod info;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info as log_info, instrument, warn};
use uuid::Uuid;

use crate::auth::Principal;
use crate::config::PageConfig;
use crate::engine::{EngineError, EnginePage, LoadPhase, NavigationOutcome, PageEvent, PageOptions};
use crate::envelope::{
    ErrorCategory, ErrorEnvelope, ErrorSeverity, RecoverySuggestion, codes,
};
use crate::pool::{BrowserPool, PoolError};
use crate::shutdown::ShutdownSignal;
use crate::store::{ContextStore, Session, SessionStore, StoreError};

pub use info::{PageInfo, PageState};

/// Page-manager failures.
#[derive(Debug, Error)]
pub enum PageError {
    /// The page does not exist (or is tombstoned).
    #[error("page {0} not found")]
    NotFound(String),
    /// The ownership chain is broken.
    #[error("page ownership verification failed")]
    OwnershipViolation,
    /// The principal's session is gone.
    #[error("session is invalid or expired")]
    SessionInvalid,
    /// The referenced context does not exist.
    #[error("context {0} not found")]
    ContextNotFound(String),
    /// Pool-level failure.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Engine-level failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PageError {
    /// Project onto the canonical envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::NotFound(id) => ErrorEnvelope::new(
                codes::RESOURCE_NOT_FOUND,
                ErrorCategory::Resource,
                "The requested page does not exist",
            )
            .tag("resource", id.clone())
            .suggest(RecoverySuggestion::VerifyResourceExists),
            Self::OwnershipViolation => ErrorEnvelope::new(
                codes::AUTH_RESOURCE_ACCESS_DENIED,
                ErrorCategory::Authorization,
                "You do not have access to this resource",
            )
            .severity(ErrorSeverity::Medium)
            .suggest(RecoverySuggestion::VerifyResourceExists),
            Self::SessionInvalid => ErrorEnvelope::new(
                codes::AUTH_INVALID_SESSION,
                ErrorCategory::Session,
                "The session is invalid or has expired",
            )
            .suggest(RecoverySuggestion::CheckCredentials),
            Self::ContextNotFound(id) => ErrorEnvelope::new(
                codes::RESOURCE_NOT_FOUND,
                ErrorCategory::Resource,
                "The requested context does not exist",
            )
            .tag("resource", id.clone()),
            Self::Pool(err) => err.to_envelope(),
            Self::Engine(err) => ErrorEnvelope::new(
                codes::BROWSER_ACTION_FAILED,
                ErrorCategory::Browser,
                "The browser engine failed the operation",
            )
            .severity(ErrorSeverity::High)
            .details(serde_json::json!({ "engine": err.to_string() })),
            Self::Store(err) => ErrorEnvelope::internal(err.to_string()),
        }
    }
}

struct PageEntry {
    info: PageInfo,
    page: Arc<dyn EnginePage>,
    watcher: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct ManagerState {
    pages: HashMap<String, PageEntry>,
    tombstones: HashMap<String, Instant>,
}

/// The page manager.
pub struct PageManager {
    sessions: Arc<dyn SessionStore>,
    contexts: Arc<dyn ContextStore>,
    pool: BrowserPool,
    config: PageConfig,
    state: Arc<Mutex<ManagerState>>,
}

impl PageManager {
    /// Assemble a manager from its collaborators.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        contexts: Arc<dyn ContextStore>,
        pool: BrowserPool,
        config: PageConfig,
    ) -> Self {
        Self {
            sessions,
            contexts,
            pool,
            config,
            state: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    /// Verify the principal's session and its ownership of a context.
    async fn verify_context(
        &self,
        principal: &Principal,
        context_id: &str,
    ) -> Result<Session, PageError> {
        let session = self
            .sessions
            .get(&principal.session_id)
            .await?
            .ok_or(PageError::SessionInvalid)?;
        if session.data.user_id != principal.user_id {
            return Err(PageError::OwnershipViolation);
        }
        let context = self
            .contexts
            .get(context_id)
            .await?
            .ok_or_else(|| PageError::ContextNotFound(context_id.to_string()))?;
        if !context.owned_by(&session) {
            return Err(PageError::OwnershipViolation);
        }
        Ok(session)
    }

    /// Verify the full chain for an existing page and return its handle.
    ///
    /// Touches the page's activity timestamp on success.
    pub async fn resolve(
        &self,
        principal: &Principal,
        page_id: &str,
    ) -> Result<(PageInfo, Arc<dyn EnginePage>), PageError> {
        let (info, page) = {
            let state = self.state.lock().await;
            let entry = state
                .pages
                .get(page_id)
                .ok_or_else(|| PageError::NotFound(page_id.to_string()))?;
            (entry.info.clone(), entry.page.clone())
        };

        let session = self
            .sessions
            .get(&principal.session_id)
            .await?
            .ok_or(PageError::SessionInvalid)?;
        let context = self
            .contexts
            .get(&info.context_id)
            .await?
            .ok_or_else(|| PageError::ContextNotFound(info.context_id.clone()))?;

        let chain_holds = principal.user_id == session.data.user_id
            && session.id == context.session_id
            && context.id == info.context_id
            && info.session_id == session.id;
        if !chain_holds {
            return Err(PageError::OwnershipViolation);
        }

        self.touch(page_id).await;
        Ok((info, page))
    }

    /// Create a page inside a context the principal owns.
    ///
    /// Acquires (or reuses) the session's browser lease, creates the engine
    /// page with the merged context/page options, and subscribes to its
    /// lifecycle events.
    #[instrument(level = "debug", skip(self, principal, options))]
    pub async fn create_page(
        &self,
        principal: &Principal,
        context_id: &str,
        options: PageOptions,
    ) -> Result<PageInfo, PageError> {
        let session = self.verify_context(principal, context_id).await?;

        let lease = self.pool.acquire(&session.id).await?;
        let page = self
            .pool
            .create_page(&lease.browser_id, &session.id, &options)
            .await?;

        let now = Utc::now();
        let info = PageInfo {
            id: format!("page-{}", Uuid::new_v4()),
            context_id: context_id.to_string(),
            session_id: session.id.clone(),
            browser_id: lease.browser_id.clone(),
            url: "about:blank".to_string(),
            title: String::new(),
            state: PageState::Active,
            created_at: now,
            last_activity_at: now,
            navigation_history: Vec::new(),
            error_count: 0,
        };

        let watcher = tokio::spawn(watch_page_events(
            self.state.clone(),
            info.id.clone(),
            page.events(),
            self.config.history_cap,
        ));

        let mut state = self.state.lock().await;
        log_info!(page_id = %info.id, browser_id = %lease.browser_id, "page created");
        state.pages.insert(
            info.id.clone(),
            PageEntry {
                info: info.clone(),
                page,
                watcher,
            },
        );
        Ok(info)
    }

    /// Navigate a page, maintaining its state machine and history.
    pub async fn navigate(
        &self,
        principal: &Principal,
        page_id: &str,
        url: &str,
        wait_until: LoadPhase,
        timeout: Duration,
    ) -> Result<NavigationOutcome, PageError> {
        let (_, page) = self.resolve(principal, page_id).await?;

        {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.pages.get_mut(page_id) {
                entry.info.state = PageState::Navigating;
            }
        }

        let outcome = page.goto(url, wait_until, None, timeout).await;

        let mut state = self.state.lock().await;
        if let Some(entry) = state.pages.get_mut(page_id) {
            // The page may have been closed concurrently; never resurrect.
            if entry.info.state == PageState::Navigating {
                entry.info.state = PageState::Active;
            }
            entry.info.last_activity_at = Utc::now();
            match &outcome {
                Ok(nav) => {
                    entry.info.url = nav.final_url.clone();
                    let cap = self.config.history_cap;
                    entry.info.push_history(&nav.final_url, cap);
                }
                Err(_) => entry.info.error_count += 1,
            }
        }
        drop(state);
        Ok(outcome?)
    }

    /// Close a page the principal owns.
    #[instrument(level = "debug", skip(self, principal))]
    pub async fn close(&self, principal: &Principal, page_id: &str) -> Result<(), PageError> {
        let (info, page) = self.resolve(principal, page_id).await?;
        let _ = page.close().await;

        let mut state = self.state.lock().await;
        if let Some(entry) = state.pages.remove(page_id) {
            entry.watcher.abort();
        }
        state.tombstones.insert(page_id.to_string(), Instant::now());
        drop(state);

        self.pool.close_page(&info.browser_id, &info.session_id).await?;
        log_info!(page_id, "page closed");
        Ok(())
    }

    /// Fetch a page record, re-verifying ownership.
    pub async fn get(&self, principal: &Principal, page_id: &str) -> Result<PageInfo, PageError> {
        let (info, _) = self.resolve(principal, page_id).await?;
        Ok(info)
    }

    /// Pages owned by a session.
    pub async fn list_by_session(&self, session_id: &str) -> Vec<PageInfo> {
        let state = self.state.lock().await;
        state
            .pages
            .values()
            .filter(|e| e.info.session_id == session_id)
            .map(|e| e.info.clone())
            .collect()
    }

    /// Pages inside a context.
    pub async fn list_by_context(&self, context_id: &str) -> Vec<PageInfo> {
        let state = self.state.lock().await;
        state
            .pages
            .values()
            .filter(|e| e.info.context_id == context_id)
            .map(|e| e.info.clone())
            .collect()
    }

    /// Mark a page as navigating (idle cleanup will skip it).
    pub async fn mark_navigating(&self, page_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.pages.get_mut(page_id) {
            if entry.info.state != PageState::Closed {
                entry.info.state = PageState::Navigating;
            }
        }
    }

    /// Record the end of a navigation started with
    /// [`PageManager::mark_navigating`].
    pub async fn finish_navigation(&self, page_id: &str, final_url: Option<&str>, ok: bool) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.pages.get_mut(page_id) {
            if entry.info.state == PageState::Navigating {
                entry.info.state = PageState::Active;
            }
            entry.info.last_activity_at = Utc::now();
            if let Some(url) = final_url {
                entry.info.url = url.to_string();
                let cap = self.config.history_cap;
                entry.info.push_history(url, cap);
            }
            if !ok {
                entry.info.error_count += 1;
            }
        }
    }

    /// Bump a page's activity timestamp.
    pub async fn touch(&self, page_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.pages.get_mut(page_id) {
            entry.info.last_activity_at = Utc::now();
        }
    }

    /// Record an engine error against a page.
    pub async fn record_page_error(&self, page_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.pages.get_mut(page_id) {
            entry.info.error_count += 1;
        }
    }

    /// Close pages idle beyond the configured timeout.
    ///
    /// Pages in `navigating` state are never touched. Returns closed ids.
    pub async fn cleanup_idle(&self) -> Vec<String> {
        let idle_cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));

        let victims: Vec<(String, String, String, Arc<dyn EnginePage>)> = {
            let state = self.state.lock().await;
            state
                .pages
                .values()
                .filter(|e| {
                    e.info.state != PageState::Navigating
                        && e.info.last_activity_at < idle_cutoff
                })
                .map(|e| {
                    (
                        e.info.id.clone(),
                        e.info.browser_id.clone(),
                        e.info.session_id.clone(),
                        e.page.clone(),
                    )
                })
                .collect()
        };

        let mut closed = Vec::with_capacity(victims.len());
        for (page_id, browser_id, session_id, page) in victims {
            debug!(page_id = %page_id, "closing idle page");
            let _ = page.close().await;
            let mut state = self.state.lock().await;
            if let Some(entry) = state.pages.remove(&page_id) {
                entry.watcher.abort();
            }
            state.tombstones.insert(page_id.clone(), Instant::now());
            drop(state);
            let _ = self.pool.close_page(&browser_id, &session_id).await;
            closed.push(page_id);
        }

        // Expire old tombstones.
        let grace = self.config.tombstone_grace;
        let mut state = self.state.lock().await;
        state.tombstones.retain(|_, at| at.elapsed() < grace);
        closed
    }

    /// Close every page a session owns, without an ownership check.
    ///
    /// Callers must have authorized the session teardown already.
    pub async fn close_by_session(&self, session_id: &str) {
        let victims: Vec<(String, String, Arc<dyn EnginePage>)> = {
            let state = self.state.lock().await;
            state
                .pages
                .values()
                .filter(|e| e.info.session_id == session_id)
                .map(|e| (e.info.id.clone(), e.info.browser_id.clone(), e.page.clone()))
                .collect()
        };
        for (page_id, browser_id, page) in victims {
            let _ = page.close().await;
            let mut state = self.state.lock().await;
            if let Some(entry) = state.pages.remove(&page_id) {
                entry.watcher.abort();
            }
            state.tombstones.insert(page_id, Instant::now());
            drop(state);
            let _ = self.pool.close_page(&browser_id, session_id).await;
        }
    }

    /// Whether the id is tombstoned (recently closed).
    pub async fn is_tombstoned(&self, page_id: &str) -> bool {
        let state = self.state.lock().await;
        state.tombstones.contains_key(page_id)
    }

    /// Number of live pages.
    pub async fn page_count(&self) -> usize {
        self.state.lock().await.pages.len()
    }

    /// Spawn the idle-cleanup loop.
    pub fn start_loop(self: &Arc<Self>, signal: &ShutdownSignal) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let mut signal = signal.clone();
        let interval = manager.config.cleanup_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = signal.wait() => break,
                    () = tokio::time::sleep(interval) => {
                        let closed = manager.cleanup_idle().await;
                        if !closed.is_empty() {
                            log_info!(count = closed.len(), "idle pages closed");
                        }
                    }
                }
            }
            debug!("idle cleanup loop stopped");
        })
    }

    /// Drop every page record (used during shutdown; engines are closed by
    /// the pool).
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        for (_, entry) in state.pages.drain() {
            entry.watcher.abort();
        }
        state.tombstones.clear();
    }
}

/// Mirror engine lifecycle events into the page record.
async fn watch_page_events(
    state: Arc<Mutex<ManagerState>>,
    page_id: String,
    mut events: tokio::sync::broadcast::Receiver<PageEvent>,
    history_cap: usize,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(page_id = %page_id, skipped, "page event watcher lagged");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        let mut state = state.lock().await;
        // Tombstoned or removed pages are never re-inserted by late events.
        let Some(entry) = state.pages.get_mut(&page_id) else {
            break;
        };
        entry.info.last_activity_at = Utc::now();
        match event {
            PageEvent::Navigated { url } => {
                entry.info.url = url.clone();
                entry.info.push_history(&url, history_cap);
            }
            PageEvent::TitleChanged { title } => entry.info.title = title,
            PageEvent::LoadFinished => {
                if entry.info.state == PageState::Navigating {
                    entry.info.state = PageState::Active;
                }
            }
            PageEvent::PageError { message } => {
                debug!(page_id = %page_id, message = %message, "page error event");
                entry.info.error_count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests;

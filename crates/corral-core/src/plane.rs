//! The assembled control plane.
//!
//! Wires configuration, stores, the auth gate, the pool, the page manager,
//! the executor and the dispatcher together; starts every background loop
//! at boot and stops them all during graceful shutdown. All collaborators
//! are constructor-injected so tests can swap in fakes.

use std::sync::Arc;

use tracing::info;

use crate::action::executor::ActionExecutor;
use crate::action::retry::RetryPolicy;
use crate::auth::apikey::{ApiKeyStore, MemoryApiKeyStore};
use crate::auth::audit::AuditLog;
use crate::auth::gate::{AuthGate, PasswordVerifier, StaticPasswordVerifier};
use crate::auth::token::TokenCodec;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::dispatch::rate_limit::RateLimiter;
use crate::engine::cdp::CdpEngine;
use crate::engine::{EngineBackend, LaunchOptions};
use crate::envelope::tracker::ErrorTracker;
use crate::page::PageManager;
use crate::pool::BrowserPool;
use crate::shutdown::{self, ShutdownController};
use crate::store::{ContextStore, SessionStore, strategy};

/// Builder for a [`ControlPlane`].
pub struct ControlPlaneBuilder {
    config: Config,
    engine: Option<Arc<dyn EngineBackend>>,
    launch_options: LaunchOptions,
    sessions: Option<Arc<dyn SessionStore>>,
    contexts: Option<Arc<dyn ContextStore>>,
    api_keys: Option<Arc<dyn ApiKeyStore>>,
    verifier: Option<Arc<dyn PasswordVerifier>>,
}

impl ControlPlaneBuilder {
    /// Override the engine backend (the CDP engine is the default).
    pub fn engine(mut self, engine: Arc<dyn EngineBackend>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Override engine launch options.
    pub fn launch_options(mut self, options: LaunchOptions) -> Self {
        self.launch_options = options;
        self
    }

    /// Override the session store (strategy selection is the default).
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Override the context store.
    pub fn context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.contexts = Some(store);
        self
    }

    /// Override the API-key store.
    pub fn api_key_store(mut self, store: Arc<dyn ApiKeyStore>) -> Self {
        self.api_keys = Some(store);
        self
    }

    /// Override the password verifier.
    pub fn password_verifier(mut self, verifier: Arc<dyn PasswordVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Assemble the plane. Background loops are not started yet; call
    /// [`ControlPlane::start`].
    pub fn build(self) -> ControlPlane {
        let config = self.config;

        let (sessions, contexts, store_backend) = match (self.sessions, self.contexts) {
            (Some(sessions), Some(contexts)) => (sessions, contexts, "injected"),
            (sessions, contexts) => {
                let selected = strategy::select(&config.store);
                (
                    sessions.unwrap_or(selected.sessions),
                    contexts.unwrap_or(selected.contexts),
                    selected.backend,
                )
            }
        };

        let api_keys = self
            .api_keys
            .unwrap_or_else(|| Arc::new(MemoryApiKeyStore::new()));
        let verifier = self
            .verifier
            .unwrap_or_else(|| Arc::new(StaticPasswordVerifier::new()));
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(CdpEngine::new()));

        let audit = Arc::new(AuditLog::new());
        let tracker = Arc::new(ErrorTracker::default());

        let gate = Arc::new(AuthGate::new(
            sessions.clone(),
            api_keys.clone(),
            verifier,
            TokenCodec::new(config.jwt_secret_or_dev()),
            audit.clone(),
            config.store.session_ttl,
        ));

        let pool = BrowserPool::new(config.pool.clone(), self.launch_options, engine);
        let pages = Arc::new(PageManager::new(
            sessions.clone(),
            contexts.clone(),
            pool.clone(),
            config.pages.clone(),
        ));
        let executor = Arc::new(ActionExecutor::new(
            pages.clone(),
            RetryPolicy::default(),
            audit.clone(),
            tracker.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        let dispatcher = Arc::new(Dispatcher::new(
            gate.clone(),
            sessions.clone(),
            contexts.clone(),
            pages.clone(),
            executor.clone(),
            pool.clone(),
            limiter.clone(),
            audit.clone(),
            tracker.clone(),
        ));

        info!(store_backend, "control plane assembled");
        let (controller, _) = shutdown::channel();
        ControlPlane {
            config,
            sessions,
            contexts,
            gate,
            pool,
            pages,
            executor,
            dispatcher,
            limiter,
            audit,
            tracker,
            controller,
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

/// The control plane.
pub struct ControlPlane {
    config: Config,
    sessions: Arc<dyn SessionStore>,
    contexts: Arc<dyn ContextStore>,
    gate: Arc<AuthGate>,
    pool: BrowserPool,
    pages: Arc<PageManager>,
    executor: Arc<ActionExecutor>,
    dispatcher: Arc<Dispatcher>,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLog>,
    tracker: Arc<ErrorTracker>,
    controller: ShutdownController,
    tasks: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ControlPlane {
    /// Start building a plane from configuration.
    pub fn builder(config: Config) -> ControlPlaneBuilder {
        ControlPlaneBuilder {
            config,
            engine: None,
            launch_options: LaunchOptions::default(),
            sessions: None,
            contexts: None,
            api_keys: None,
            verifier: None,
        }
    }

    /// Start every background loop: pool scaling/recycling/health, page
    /// idle cleanup, session TTL sweep, tracker cleanup and rate-limit
    /// bucket sweep.
    pub fn start(&self) {
        let signal = self.controller.signal();
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        tasks.extend(self.pool.start_loops(&signal));
        tasks.push(self.pages.start_loop(&signal));
        tasks.push(self.limiter.start_sweep(&signal));

        // Session TTL sweep.
        {
            let sessions = self.sessions.clone();
            let mut signal = signal.clone();
            let interval = self.config.store.sweep_interval;
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = signal.wait() => break,
                        () = tokio::time::sleep(interval) => {
                            if let Ok(removed) = sessions.delete_expired().await {
                                if removed > 0 {
                                    info!(removed, "expired sessions swept");
                                }
                            }
                        }
                    }
                }
            }));
        }

        // Tracker retention cleanup, hourly.
        {
            let tracker = self.tracker.clone();
            let mut signal = signal.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = signal.wait() => break,
                        () = tokio::time::sleep(std::time::Duration::from_secs(60 * 60)) => {
                            tracker.cleanup();
                        }
                    }
                }
            }));
        }

        info!(tasks = tasks.len(), "background loops started");
    }

    /// Graceful shutdown: stop admitting, cancel loops, drain the pool,
    /// clear page records.
    pub async fn shutdown(&self) {
        info!("control plane shutting down");
        self.controller.trigger();
        self.pool.shutdown().await;
        self.pages.clear().await;
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!("control plane stopped");
    }

    /// The dispatcher front-ends hand records to.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The auth gate (login, API keys, revocation).
    pub fn gate(&self) -> &Arc<AuthGate> {
        &self.gate
    }

    /// The browser pool.
    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    /// The page manager.
    pub fn pages(&self) -> &Arc<PageManager> {
        &self.pages
    }

    /// The action executor.
    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    /// The audit log.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// The error tracker.
    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.tracker
    }

    /// The session store.
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// The context store.
    pub fn contexts(&self) -> &Arc<dyn ContextStore> {
        &self.contexts
    }

    /// The configuration the plane was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

//! Store backend selection.
//!
//! The preferred backend comes from configuration; when it is unavailable
//! the selection falls back to the in-memory stores and records why, so
//! operators can see the degradation in logs and metrics.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StoreConfig;

use super::memory::{MemoryContextStore, MemorySessionStore};
use super::{ContextStore, SessionStore};

/// Preferred store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreStrategy {
    /// Require the distributed key-value backend.
    Redis,
    /// Use in-process memory.
    Memory,
    /// Prefer distributed, fall back to memory.
    #[default]
    Auto,
}

impl FromStr for StoreStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "auto" => Ok(Self::Auto),
            _ => Err(()),
        }
    }
}

/// The stores chosen for this process.
#[derive(Clone)]
pub struct SelectedStores {
    /// Session store.
    pub sessions: Arc<dyn SessionStore>,
    /// Context store.
    pub contexts: Arc<dyn ContextStore>,
    /// Name of the active backend ("memory", "redis").
    pub backend: &'static str,
    /// Why a preferred backend was not used, when it was not.
    pub fallback_reason: Option<String>,
}

/// Select store implementations for the configured strategy.
///
/// This build ships the in-memory backend; a distributed preference is
/// honored by falling back with a recorded reason rather than failing
/// boot.
pub fn select(config: &StoreConfig) -> SelectedStores {
    let memory = || {
        (
            Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>,
            Arc::new(MemoryContextStore::new()) as Arc<dyn ContextStore>,
        )
    };

    match config.strategy {
        StoreStrategy::Memory => {
            let (sessions, contexts) = memory();
            info!(backend = "memory", "session/context stores selected");
            SelectedStores {
                sessions,
                contexts,
                backend: "memory",
                fallback_reason: None,
            }
        }
        StoreStrategy::Redis | StoreStrategy::Auto => {
            let reason = "distributed backend not compiled into this build".to_string();
            if config.strategy == StoreStrategy::Redis {
                warn!(
                    backend = "memory",
                    requested = "redis",
                    reason = %reason,
                    "falling back to in-memory stores"
                );
            }
            let (sessions, contexts) = memory();
            SelectedStores {
                sessions,
                contexts,
                backend: "memory",
                fallback_reason: Some(reason),
            }
        }
    }
}

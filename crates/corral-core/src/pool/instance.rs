//! Pooled browser instances and their state machine.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::engine::{EngineHandle, ResourceUsage};

/// Lifecycle state of one pooled instance.
///
/// `launching -> idle <-> active`, with side transitions
/// `idle|active -> unhealthy -> recycling -> closed`. Recycling never
/// returns to service: the instance is replaced, not repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserState {
    /// Engine process is starting.
    Launching,
    /// Ready to be leased.
    Idle,
    /// Leased to exactly one session.
    Active,
    /// Failed health checks; awaiting recycling.
    Unhealthy,
    /// Being gracefully replaced.
    Recycling,
    /// Terminal.
    Closed,
}

impl BrowserState {
    /// Whether the state machine permits this transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use BrowserState::{Active, Closed, Idle, Launching, Recycling, Unhealthy};
        matches!(
            (self, next),
            (Launching, Idle | Active | Closed)
                | (Idle, Active | Unhealthy | Recycling | Closed)
                | (Active, Idle | Unhealthy | Recycling | Closed)
                | (Unhealthy, Recycling | Closed)
                | (Recycling, Closed)
        )
    }
}

/// One engine process owned by the pool.
pub struct BrowserInstance {
    /// Pool-assigned id.
    pub id: String,
    /// The engine process.
    pub handle: Arc<dyn EngineHandle>,
    /// Lifecycle state.
    pub state: BrowserState,
    /// The leasing session; `Some` iff `state == Active`.
    pub session_id: Option<String>,
    /// Open pages.
    pub page_count: usize,
    /// When the instance entered service.
    pub created_at: Instant,
    /// Last lease or page activity.
    pub last_used_at: Instant,
    /// Monotonic lease counter.
    pub use_count: u64,
    /// Engine errors observed on this instance.
    pub error_count: u64,
    /// Consecutive health probe failures.
    pub health_failures: u32,
    /// Most recent resource reading.
    pub last_usage: ResourceUsage,
}

impl BrowserInstance {
    /// Wrap a freshly launched handle as an idle instance.
    pub fn idle(id: String, handle: Arc<dyn EngineHandle>) -> Self {
        let now = Instant::now();
        Self {
            id,
            handle,
            state: BrowserState::Idle,
            session_id: None,
            page_count: 0,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            error_count: 0,
            health_failures: 0,
            last_usage: ResourceUsage::default(),
        }
    }

    /// Lease the instance to a session.
    ///
    /// Panics are avoided by contract: callers check the state first.
    pub fn activate(&mut self, session_id: &str) {
        debug_assert!(self.state.can_transition_to(BrowserState::Active));
        self.state = BrowserState::Active;
        self.session_id = Some(session_id.to_string());
        self.use_count += 1;
        self.last_used_at = Instant::now();
    }

    /// Return the lease.
    pub fn deactivate(&mut self) {
        debug_assert!(self.state.can_transition_to(BrowserState::Idle));
        self.state = BrowserState::Idle;
        self.session_id = None;
        self.last_used_at = Instant::now();
    }

    /// Whether this instance is leased by the given session.
    pub fn leased_by(&self, session_id: &str) -> bool {
        self.state == BrowserState::Active && self.session_id.as_deref() == Some(session_id)
    }

    /// Age of the instance.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for BrowserInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserInstance")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("page_count", &self.page_count)
            .field("use_count", &self.use_count)
            .field("error_count", &self.error_count)
            .finish_non_exhaustive()
    }
}

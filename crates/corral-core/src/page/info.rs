//! Page records mirrored from engine state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a page. `Closed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    /// Serving actions.
    #[default]
    Active,
    /// A navigation is in flight; idle cleanup must not touch it.
    Navigating,
    /// Terminal.
    Closed,
}

/// The mirrored record of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Page id.
    pub id: String,
    /// Owning context; must match the session below.
    pub context_id: String,
    /// Owning session.
    pub session_id: String,
    /// Browser currently hosting the page; must be leased.
    pub browser_id: String,
    /// Current document URL.
    pub url: String,
    /// Current document title.
    pub title: String,
    /// Lifecycle state.
    pub state: PageState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last action or lifecycle activity.
    pub last_activity_at: DateTime<Utc>,
    /// Visited URLs, append-only, capped.
    pub navigation_history: Vec<String>,
    /// Errors surfaced by the page.
    pub error_count: u64,
}

impl PageInfo {
    /// Append to the navigation history, enforcing the cap by dropping
    /// the oldest entries.
    pub fn push_history(&mut self, url: &str, cap: usize) {
        self.navigation_history.push(url.to_string());
        if self.navigation_history.len() > cap {
            let excess = self.navigation_history.len() - cap;
            self.navigation_history.drain(..excess);
        }
    }
}

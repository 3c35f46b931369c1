//! Fetch liveness.
//!
//! A view starts a fetch by taking a ticket. Starting another fetch for the
//! same view supersedes every earlier ticket; results of a superseded fetch
//! are discarded instead of applied. In-flight calls are not cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Issues tickets per view key.
#[derive(Debug, Clone, Default)]
pub struct FetchTracker {
    views: Arc<Mutex<HashMap<String, Arc<AtomicU64>>>>,
}

/// Proof that a fetch was started.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    view: String,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl FetchTicket {
    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer fetch has started for this view.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

impl FetchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch for `view`, superseding earlier ones.
    pub fn begin(&self, view: &str) -> FetchTicket {
        let current = self
            .views
            .lock()
            .entry(view.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        let generation = current.fetch_add(1, Ordering::AcqRel) + 1;
        FetchTicket {
            view: view.to_string(),
            generation,
            current,
        }
    }

    /// Supersede every ticket of `view` without starting a new fetch.
    pub fn invalidate(&self, view: &str) {
        if let Some(current) = self.views.lock().get(view) {
            current.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// Result of a fetch that may have been superseded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum FetchOutcome<T> {
    Applied(T),
    Superseded,
}

impl<T> FetchOutcome<T> {
    pub fn into_applied(self) -> Option<T> {
        match self {
            FetchOutcome::Applied(value) => Some(value),
            FetchOutcome::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, FetchOutcome::Superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_ticket_supersedes() {
        let tracker = FetchTracker::new();
        let first = tracker.begin("tasks:project-1");
        assert!(first.is_current());

        let second = tracker.begin("tasks:project-1");
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.generation() > first.generation());

        let other = tracker.begin("shots:project-1");
        assert!(other.is_current());
        assert!(second.is_current());
    }

    #[test]
    fn test_invalidate() {
        let tracker = FetchTracker::new();
        let ticket = tracker.begin("assets");
        tracker.invalidate("assets");
        assert!(!ticket.is_current());
        tracker.invalidate("never-started");
    }

    #[test]
    fn test_outcome() {
        assert_eq!(FetchOutcome::Applied(3).into_applied(), Some(3));
        assert!(FetchOutcome::<u8>::Superseded.is_superseded());
    }
}

//! Post-commit mutation events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Emitted after a mutation handler reports success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub entity_type: String,
    pub id: String,
    /// Columns written.
    pub columns: Vec<String>,
    pub at: DateTime<Utc>,
}

impl MutationEvent {
    pub fn new<I, S>(entity_type: impl Into<String>, id: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            at: Utc::now(),
        }
    }
}

/// Broadcast channel for mutation events.
///
/// Publishing never fails the caller; with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MutationEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: MutationEvent) {
        let entity_type = event.entity_type.clone();
        if let Err(error) = self.sender.send(event) {
            debug!(entity_type, %error, "mutation event dropped");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

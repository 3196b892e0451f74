//! Domain event system for decoupled observation of the pipeline.
//!
//! The pipeline publishes an event whenever a notification or a single
//! (event, milestone) unit reaches a terminal state. Subscribers (CLI
//! summaries, the gateway) react without the pipeline knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A notification reached a terminal state
    NotificationProcessed {
        message_id: String,
        event_id: Option<String>,
        /// "success", "retry", or "drop"
        disposition: String,
        timestamp: DateTime<Utc>,
    },

    /// A match was persisted
    SessionRecorded {
        session_id: String,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The oracle failed for one pair; treated as no match
    OracleFailed {
        event_id: String,
        milestone_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A session write failed; that match is skipped
    SessionWriteFailed {
        session_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A whole batch finished
    BatchCompleted {
        size: usize,
        retried: usize,
        dropped: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

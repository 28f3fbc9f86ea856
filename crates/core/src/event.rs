//! Domain event system: decoupled observation of agent turns.
//!
//! The turn controller publishes events as turns progress. Hosts can
//! subscribe for metrics, audit trails or UI without touching the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An inbound message was accepted as a new turn
    TurnStarted {
        conversation_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A web search ran for the current turn
    SearchPerformed {
        conversation_id: String,
        backend: String,
        degraded: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The agent finished streaming a reply
    TurnCompleted {
        conversation_id: String,
        model: String,
        response_chars: usize,
        searched: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn failed and the user was notified
    TurnFailed {
        conversation_id: String,
        error_message: String,
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

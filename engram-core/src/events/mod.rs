//! In-process publish-subscribe for memory lifecycle events.
//!
//! Built on `tokio::sync::broadcast`: each subscriber owns a bounded
//! buffer, delivery preserves per-publisher order, and a slow subscriber
//! loses the oldest events with its lag surfaced rather than blocking the
//! publisher or its peers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{ChunkType, ConflictSeverity};

/// Default per-subscriber buffer size.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Memory lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum MemoryEvent {
    #[serde(rename = "memory.created")]
    Created {
        project_id: String,
        chunk_id: Uuid,
        chunk_type: ChunkType,
        session_id: Option<String>,
    },
    #[serde(rename = "memory.updated")]
    Updated {
        project_id: String,
        chunk_id: Uuid,
        content_changed: bool,
    },
    #[serde(rename = "memory.deleted")]
    Deleted { project_id: String, chunk_id: Uuid },
    #[serde(rename = "session.started")]
    SessionStarted {
        project_id: String,
        session_id: String,
    },
    #[serde(rename = "session.ended")]
    SessionEnded {
        project_id: String,
        session_id: String,
    },
    #[serde(rename = "pattern.detected")]
    PatternDetected {
        project_id: String,
        pattern_id: Uuid,
        signature: String,
    },
    #[serde(rename = "conflict.detected")]
    ConflictDetected {
        project_id: String,
        conflict_id: Uuid,
        severity: ConflictSeverity,
    },
}

impl MemoryEvent {
    /// Topic string, for logs and audit entries.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            MemoryEvent::Created { .. } => "memory.created",
            MemoryEvent::Updated { .. } => "memory.updated",
            MemoryEvent::Deleted { .. } => "memory.deleted",
            MemoryEvent::SessionStarted { .. } => "session.started",
            MemoryEvent::SessionEnded { .. } => "session.ended",
            MemoryEvent::PatternDetected { .. } => "pattern.detected",
            MemoryEvent::ConflictDetected { .. } => "conflict.detected",
        }
    }
}

/// A delivered event plus how many events the subscriber lost before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: MemoryEvent,
    /// Events dropped from this subscriber's buffer since the last receive
    pub lagged: u64,
}

/// Receiving side of the bus.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<MemoryEvent>,
}

impl EventSubscriber {
    /// Next event, or `None` once the bus shuts down.
    ///
    /// Overflow is absorbed here: a lagged subscriber keeps receiving from
    /// the oldest retained event, with the drop count reported.
    pub async fn next(&mut self) -> Option<Delivery> {
        let mut lagged = 0u64;
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(Delivery { event, lagged }),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(dropped = n, "event subscriber lagged; oldest events dropped");
                    lagged += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publishing side of the bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MemoryEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Non-blocking publish; a bus with no subscribers drops the event.
    pub fn publish(&self, event: MemoryEvent) {
        tracing::debug!(topic = event.topic(), "publishing event");
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

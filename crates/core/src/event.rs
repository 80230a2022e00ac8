//! Domain event system: decoupled observation of the learning loop.
//!
//! The closed loop publishes what it judged, stored and discarded.
//! Batch runners and CLIs subscribe to report progress without being
//! wired into the controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::trajectory::Verdict;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A trajectory received a verdict
    TrajectoryJudged {
        task_id: String,
        verdict: Verdict,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    /// Extracted items were written to the store
    MemoryStored {
        task_id: String,
        ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A trajectory was dropped without learning
    TrajectoryDiscarded {
        task_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A learning step failed; the batch continues
    ErrorOccurred {
        context: String,
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
        // No subscribers is fine.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::TrajectoryJudged {
            task_id: "t1".into(),
            verdict: Verdict::Success,
            confidence: 0.9,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::TrajectoryJudged { task_id, verdict, .. } => {
                assert_eq!(task_id, "t1");
                assert_eq!(*verdict, Verdict::Success);
            }
            _ => panic!("Expected TrajectoryJudged event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}

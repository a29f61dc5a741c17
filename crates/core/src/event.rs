//! Pipeline event system: decoupled observation of orchestration progress.
//!
//! Events are published as a conversation moves through the pipeline.
//! Other components (CLI progress output, tests) can subscribe without
//! coupling to the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All pipeline events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// The router classified an utterance
    IntentClassified {
        user_id: String,
        intent: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    /// The planner produced a plan (possibly empty)
    PlanCreated {
        user_id: String,
        steps: usize,
        capabilities: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A step settled and its result was recorded
    StepCompleted {
        user_id: String,
        step_index: usize,
        success: bool,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// A failed step is about to be retried
    StepReplanned {
        user_id: String,
        step_index: usize,
        replaced: bool,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// The final reply was generated
    ResponseGenerated {
        user_id: String,
        chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// The fact extractor finished a job
    FactsExtracted {
        user_id: String,
        saved: usize,
        timestamp: DateTime<Utc>,
    },

    /// The entity extractor finished a job
    EntitiesExtracted {
        user_id: String,
        entities: usize,
        relationships: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for pipeline events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<PipelineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PipelineEvent>> {
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

        bus.publish(PipelineEvent::StepCompleted {
            user_id: "u1".into(),
            step_index: 0,
            success: true,
            attempt: 1,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            PipelineEvent::StepCompleted { step_index, success, .. } => {
                assert_eq!(*step_index, 0);
                assert!(success);
            }
            _ => panic!("Expected StepCompleted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(PipelineEvent::ResponseGenerated {
            user_id: "u1".into(),
            chars: 12,
            timestamp: Utc::now(),
        });
    }
}

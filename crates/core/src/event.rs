//! Events the turn loop reports while it works.
//!
//! The agent publishes answers, dispatched actions, compactions and errors on
//! an [`EventBus`]; consoles and loggers subscribe to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The agent produced a final answer for an ask
    ResponseGenerated {
        conversation_id: String,
        provider: String,
        cycles: u32,
        timestamp: DateTime<Utc>,
    },

    /// An action was dispatched
    ActionDispatched {
        action: String,
        label: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The conversation was compacted
    ConversationCompacted {
        conversation_id: String,
        chars_before: usize,
        chars_after: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short kind name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResponseGenerated { .. } => "response",
            Self::ActionDispatched { .. } => "action",
            Self::ConversationCompacted { .. } => "compaction",
            Self::ErrorOccurred { .. } => "error",
        }
    }

    /// A one-line console notice for events the ask sinks do not carry.
    ///
    /// Answers, action labels and failed replies already reach the caller, so
    /// only a compaction produces a notice.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::ConversationCompacted {
                chars_before,
                chars_after,
                ..
            } => Some(format!(
                "conversation compacted: {chars_before} -> {chars_after} chars"
            )),
            _ => None,
        }
    }
}

/// Events kept for subscribers that fall behind.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out of [`DomainEvent`]s from agents to whoever listens.
///
/// Publishing never blocks the turn loop: a lagging subscriber loses the
/// oldest events instead.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event and return how many subscribers received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let kind = event.kind();
        let delivered = self.sender.send(Arc::new(event)).unwrap_or(0);
        trace!(kind, delivered, "Domain event");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compacted() -> DomainEvent {
        DomainEvent::ConversationCompacted {
            conversation_id: "c1".into(),
            chars_before: 16_000,
            chars_after: 2_400,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let delivered = bus.publish(DomainEvent::ActionDispatched {
            action: "CMD".into(),
            label: "CMD: ls".into(),
            duration_ms: 42,
            timestamp: Utc::now(),
        });
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ActionDispatched { action, label, .. } => {
                assert_eq!(action, "CMD");
                assert_eq!(label, "CMD: ls");
            }
            other => panic!("Expected ActionDispatched, got {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_reaches_nobody() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(compacted()), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_loses_oldest_events() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();
        bus.publish(compacted());
        bus.publish(DomainEvent::ErrorOccurred {
            context: "ask".into(),
            error_message: "late".into(),
            timestamp: Utc::now(),
        });

        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().kind(), "error");
    }

    #[test]
    fn only_compaction_produces_a_notice() {
        assert_eq!(
            compacted().notice().as_deref(),
            Some("conversation compacted: 16000 -> 2400 chars")
        );
        let error = DomainEvent::ErrorOccurred {
            context: "provider".into(),
            error_message: "timed out".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(error.kind(), "error");
        assert!(error.notice().is_none());

        let response = DomainEvent::ResponseGenerated {
            conversation_id: "c1".into(),
            provider: "mistral".into(),
            cycles: 1,
            timestamp: Utc::now(),
        };
        assert_eq!(response.kind(), "response");
        assert!(response.notice().is_none());
    }
}

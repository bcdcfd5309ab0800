//! Event bus for debate progress
//!
//! Pub/sub over a Tokio broadcast channel, with an optional in-memory
//! history so late subscribers can replay a run.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::history::EventHistory;
use super::types::DebateEvent;
use crate::debate::roster::ParticipantId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Subscriber lagged behind and missed {0} events")]
    Lagged(u64),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channel and optional history
pub struct EventBus {
    sender: broadcast::Sender<DebateEvent>,
    history: Option<Arc<EventHistory>>,
}

impl EventBus {
    /// Create a new event bus without history
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: None,
        }
    }

    /// Create an event bus that retains published events
    pub fn with_history(history: Arc<EventHistory>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Some(history),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    pub fn history(&self) -> Option<&Arc<EventHistory>> {
        self.history.as_ref()
    }

    /// Publish an event to all subscribers, returning how many received it.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: DebateEvent) -> usize {
        let event_type = event.event_type();

        if let Some(history) = &self.history {
            history.record(event.clone());
        }

        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DebateEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by run ID
    pub run_id: Option<String>,
    /// Filter by participant
    pub participant: Option<ParticipantId>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by run ID
    pub fn run(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    /// Filter by participant. Events without a participant still match.
    pub fn participant(mut self, participant: &ParticipantId) -> Self {
        self.participant = Some(participant.clone());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &DebateEvent) -> bool {
        if let Some(ref rid) = self.run_id {
            if event.run_id() != rid {
                return false;
            }
        }

        if let Some(ref pid) = self.participant {
            if let Some(event_pid) = event.participant() {
                if event_pid != pid {
                    return false;
                }
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<DebateEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<DebateEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> EventBusResult<DebateEvent> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::ChannelClosed,
                broadcast::error::RecvError::Lagged(n) => EventBusError::Lagged(n),
            })?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    /// Subscribe with a filter
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::state::DebatePhase;
    use chrono::Utc;

    fn model_start(run: &str, who: &str) -> DebateEvent {
        DebateEvent::ModelStart {
            run_id: run.to_string(),
            participant: who.into(),
            phase: DebatePhase::Propose,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        assert_eq!(bus.publish(model_start("run-1", "claude")), 1);

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "model_start");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(model_start("run-1", "gpt"));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        assert_eq!(bus.publish(model_start("run-1", "gpt")), 0);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .run("run-1")
            .participant(&"claude".into())
            .types(vec!["model_start", "phase_start"]);

        assert!(filter.matches(&model_start("run-1", "claude")));
        assert!(!filter.matches(&model_start("run-2", "claude")));
        assert!(!filter.matches(&model_start("run-1", "gpt")));

        let phase = DebateEvent::PhaseStart {
            run_id: "run-1".into(),
            phase: DebatePhase::Vote,
            participants: 3,
            timestamp: Utc::now(),
        };
        assert!(filter.matches(&phase));

        let wrong_type = DebateEvent::ModelTimeout {
            run_id: "run-1".into(),
            participant: "claude".into(),
            phase: DebatePhase::Vote,
            timeout_ms: 10,
            timestamp: Utc::now(),
        };
        assert!(!filter.matches(&wrong_type));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().run("target"));

        tokio::spawn(async move {
            bus.publish(model_start("other", "claude"));
            bus.publish(model_start("target", "gpt"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.run_id(), "target");

        // Publisher dropped the bus; the channel is now closed.
        assert!(matches!(
            filtered.recv().await,
            Err(EventBusError::ChannelClosed)
        ));
    }

    #[test]
    fn test_history_retains_published_events() {
        let history = Arc::new(EventHistory::default());
        let bus = EventBus::with_history(history.clone());
        bus.publish(model_start("run-1", "claude"));
        bus.publish(model_start("run-1", "gpt"));
        assert_eq!(history.len(), 2);
        assert!(bus.history().is_some());
    }
}

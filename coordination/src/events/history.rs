//! In-memory event history for replay and inspection.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

use super::bus::EventFilter;
use super::types::DebateEvent;

/// Default number of events retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 4_096;

/// Counts over the retained history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventStats {
    pub total: usize,
    pub runs: usize,
    pub by_type: BTreeMap<String, usize>,
}

/// Bounded, append-only event log. Oldest events are evicted first.
pub struct EventHistory {
    events: Mutex<VecDeque<DebateEvent>>,
    capacity: usize,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<DebateEvent>> {
        // A panicking publisher cannot leave the deque half-written.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an event, evicting the oldest when full.
    pub fn record(&self, event: DebateEvent) {
        let mut events = self.guard();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Snapshot of all retained events in publish order.
    pub fn events(&self) -> Vec<DebateEvent> {
        self.guard().iter().cloned().collect()
    }

    /// Events of one run, in publish order.
    pub fn events_for_run(&self, run_id: &str) -> Vec<DebateEvent> {
        self.guard()
            .iter()
            .filter(|e| e.run_id() == run_id)
            .cloned()
            .collect()
    }

    /// Replay retained events that match `filter`.
    pub fn replay(&self, filter: &EventFilter) -> Vec<DebateEvent> {
        let events: Vec<DebateEvent> = self
            .guard()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        debug!(count = events.len(), "Replaying events from history");
        events
    }

    pub fn stats(&self) -> EventStats {
        let events = self.guard();
        let mut stats = EventStats {
            total: events.len(),
            ..Default::default()
        };
        let mut runs = std::collections::BTreeSet::new();
        for event in events.iter() {
            *stats.by_type.entry(event.event_type().to_string()).or_default() += 1;
            runs.insert(event.run_id());
        }
        stats.runs = runs.len();
        stats
    }

    pub fn clear(&self) {
        self.guard().clear();
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

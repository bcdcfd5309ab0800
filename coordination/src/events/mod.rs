//! Debate progress events
//!
//! The event stream is how external progress UIs follow a run.
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the nine debate event kinds.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with
//!    filtered subscriptions.
//!
//! 3. **Event History** (`history.rs`): bounded in-memory log for replay.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Controller  │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │   History    │
//!                      │  (replay)    │
//!                      └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use coordination::events::{EventBus, EventBusExt, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut rx = bus.subscribe_filtered(EventFilter::new().types(vec!["final_decision"]));
//! // hand `bus` to the DebateController, then:
//! let event = rx.recv().await?;
//! ```

pub mod bus;
pub mod history;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus,
};
pub use history::{EventHistory, EventStats, DEFAULT_HISTORY_CAPACITY};
pub use types::{DebateEvent, EVENT_TYPES};

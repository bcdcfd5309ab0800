//! Trade Council Coordination Library
//!
//! This library provides:
//! - A debate controller that turns the opinions of several independent
//!   participants into one executed trading decision
//! - A broadcast event stream for following a run as it happens
//!
//! # Features
//!
//! ## Debate
//! - Concurrent phase fan-out with per-call timeouts and failure isolation
//! - Strict-majority consensus detection with early exit
//! - Ranked-choice voting with deterministic tie-breaking
//! - Validate-then-execute finalisation down a ranked fallback chain
//! - Quorum and global-deadline guardrails that degrade to HOLD
//!
//! ## Events
//! - `phase_start`, `model_start`, `model_complete`, `model_error`,
//!   `model_timeout`, `consensus_check`, `early_exit`, `vote_results`,
//!   `final_decision`
//!
//! # Usage
//!
//! ```ignore
//! use coordination::{DebateConfig, DebateController, MarketContext};
//!
//! let controller = DebateController::new(config, roster, agents, venue)?;
//! let output = controller.run(MarketContext::new(chrono::Utc::now())).await;
//! println!("{}", output.summary_line());
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod debate;
pub mod events;

// Re-export key debate types
pub use debate::{
    ActionKind, ActionResult, AgentError, Ballot, BallotDraft, ConsensusChecker, ConsensusResult,
    ConsensusType, ControllerError, Critique, CritiqueDraft, DebateAgent, DebateConfig,
    DebateController, DebateFault, DebateMetadata, DebateOutput, DebatePhase, DebateVariant,
    DecisionFinalizer, DecisionPath, ExecutionVenue, FinalDecision, MarketContext,
    NormalizedAction, OpenOrder, OrderDetails, ParticipantId, Proposal, ProposalDraft,
    RetryPolicy, Roster, RosterEntry, TradeAction, ValidationReport, VenueError,
};

// Re-export key event types
pub use events::{
    DebateEvent, EventBus, EventBusExt, EventFilter, EventHistory, FilteredReceiver,
    SharedEventBus,
};

//! Debate Orchestration: multi-participant trading decisions
//!
//! A fixed roster of independent participants proposes trade actions for one
//! market snapshot. The controller looks for early agreement, optionally runs
//! a critique/revise round, falls back to a ranked vote, and finally walks the
//! ranked candidates against the execution venue.
//!
//! # Debate Flow
//!
//! ```text
//! Idle → Propose → ConsensusCheck ─┬─ agreed → EarlyExit → Finalize → Done
//!          │             │          │
//!          │             │          ├─ lean ────────────→ Vote → Finalize → Done
//!          │             │          │
//!          │             │          └─ extended → Critique → Revise → ConsensusCheck
//!          │             │                                              (second and last)
//!          │             │
//!          └─────────────┴── quorum lost → FailedQuorum   (HOLD)
//!                            budget spent → DeadlineExceeded (HOLD)
//! ```

pub mod action;
pub mod agent;
pub mod consensus;
pub mod context;
pub mod finalizer;
pub mod guardrails;
pub mod orchestrator;
pub mod output;
pub mod phase;
pub mod proposal;
pub mod retry;
pub mod roster;
pub mod state;
pub mod voting;

pub use action::{ActionKind, NormalizedAction, TradeAction};
pub use agent::{
    ActionResult, AgentError, DebateAgent, ExecutionVenue, OrderDetails, ValidationReport,
    VenueError,
};
pub use consensus::{ConsensusChecker, ConsensusResult, ConsensusType};
pub use context::{MarketContext, OpenOrder, SharedContext};
pub use finalizer::{DecisionFinalizer, FinalDecision};
pub use guardrails::{GuardrailEngine, GuardrailOutcome};
pub use orchestrator::{ControllerError, DebateConfig, DebateController, DebateVariant};
pub use output::{DebateFault, DebateMetadata, DebateOutput, DecisionPath, ValidationRejection};
pub use phase::{Participant, PhaseOrchestrator, PhaseOutcome, PhaseReport, Settlement};
pub use proposal::{Critique, CritiqueDraft, Proposal, ProposalDraft, ProposalError};
pub use retry::{retry_with_backoff, RetryPolicy, RetryingAgent};
pub use roster::{ParticipantId, Roster, RosterEntry};
pub use state::{DebatePhase, DebateSession, DebateTransition, TransitionError};
pub use voting::{
    tally, tie_break, Ballot, BallotDraft, BallotRejection, RankEntry, RejectedBallot,
    TallyReport, TieBreak, TieBreakRule, VoteScore, VotingMatrix,
};

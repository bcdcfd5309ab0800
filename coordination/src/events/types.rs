//! Debate progress events.
//!
//! Every participant invocation produces exactly one `model_start` and one
//! terminal event (`model_complete`, `model_error`, or `model_timeout`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::consensus::{ConsensusResult, ConsensusType};
use crate::debate::output::DebateOutput;
use crate::debate::roster::ParticipantId;
use crate::debate::state::DebatePhase;
use crate::debate::voting::VoteScore;

/// Every event kind, in wire spelling.
pub const EVENT_TYPES: &[&str] = &[
    "phase_start",
    "model_start",
    "model_complete",
    "model_error",
    "model_timeout",
    "consensus_check",
    "early_exit",
    "vote_results",
    "final_decision",
];

/// All debate progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    /// A fan-out phase is about to invoke its participants
    PhaseStart {
        run_id: String,
        phase: DebatePhase,
        participants: usize,
        timestamp: DateTime<Utc>,
    },

    /// One participant was invoked
    ModelStart {
        run_id: String,
        participant: ParticipantId,
        phase: DebatePhase,
        timestamp: DateTime<Utc>,
    },

    /// A participant returned a valid payload
    ModelComplete {
        run_id: String,
        participant: ParticipantId,
        phase: DebatePhase,
        payload: serde_json::Value,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A participant failed or returned an invalid payload
    ModelError {
        run_id: String,
        participant: ParticipantId,
        phase: DebatePhase,
        reason: String,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A participant did not settle within its per-call timeout
    ModelTimeout {
        run_id: String,
        participant: ParticipantId,
        phase: DebatePhase,
        timeout_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ConsensusCheck {
        run_id: String,
        result: ConsensusResult,
        timestamp: DateTime<Utc>,
    },

    /// Consensus found; the vote is skipped
    EarlyExit {
        run_id: String,
        consensus_type: ConsensusType,
        timestamp: DateTime<Utc>,
    },

    VoteResults {
        run_id: String,
        scores: Vec<VoteScore>,
        winner: Option<ParticipantId>,
        timestamp: DateTime<Utc>,
    },

    /// Terminal event of every run
    FinalDecision {
        run_id: String,
        output: Box<DebateOutput>,
        timestamp: DateTime<Utc>,
    },
}

impl DebateEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PhaseStart { timestamp, .. }
            | Self::ModelStart { timestamp, .. }
            | Self::ModelComplete { timestamp, .. }
            | Self::ModelError { timestamp, .. }
            | Self::ModelTimeout { timestamp, .. }
            | Self::ConsensusCheck { timestamp, .. }
            | Self::EarlyExit { timestamp, .. }
            | Self::VoteResults { timestamp, .. }
            | Self::FinalDecision { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseStart { .. } => "phase_start",
            Self::ModelStart { .. } => "model_start",
            Self::ModelComplete { .. } => "model_complete",
            Self::ModelError { .. } => "model_error",
            Self::ModelTimeout { .. } => "model_timeout",
            Self::ConsensusCheck { .. } => "consensus_check",
            Self::EarlyExit { .. } => "early_exit",
            Self::VoteResults { .. } => "vote_results",
            Self::FinalDecision { .. } => "final_decision",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::PhaseStart { run_id, .. }
            | Self::ModelStart { run_id, .. }
            | Self::ModelComplete { run_id, .. }
            | Self::ModelError { run_id, .. }
            | Self::ModelTimeout { run_id, .. }
            | Self::ConsensusCheck { run_id, .. }
            | Self::EarlyExit { run_id, .. }
            | Self::VoteResults { run_id, .. }
            | Self::FinalDecision { run_id, .. } => run_id,
        }
    }

    /// Participant this event is about, if any
    pub fn participant(&self) -> Option<&ParticipantId> {
        match self {
            Self::ModelStart { participant, .. }
            | Self::ModelComplete { participant, .. }
            | Self::ModelError { participant, .. }
            | Self::ModelTimeout { participant, .. } => Some(participant),
            _ => None,
        }
    }

    /// Phase this event belongs to, if it is phase-scoped
    pub fn phase(&self) -> Option<DebatePhase> {
        match self {
            Self::PhaseStart { phase, .. }
            | Self::ModelStart { phase, .. }
            | Self::ModelComplete { phase, .. }
            | Self::ModelError { phase, .. }
            | Self::ModelTimeout { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Whether this settles a participant invocation
    pub fn is_settlement(&self) -> bool {
        matches!(
            self,
            Self::ModelComplete { .. } | Self::ModelError { .. } | Self::ModelTimeout { .. }
        )
    }

    /// One-line human-readable rendering
    pub fn describe(&self) -> String {
        match self {
            Self::PhaseStart {
                phase,
                participants,
                ..
            } => format!("{} started with {} participants", phase, participants),
            Self::ModelStart {
                participant, phase, ..
            } => format!("{} → {}", participant, phase),
            Self::ModelComplete {
                participant,
                phase,
                elapsed_ms,
                ..
            } => format!("{} ✓ {} ({}ms)", participant, phase, elapsed_ms),
            Self::ModelError {
                participant,
                phase,
                reason,
                ..
            } => format!("{} ✗ {}: {}", participant, phase, reason),
            Self::ModelTimeout {
                participant,
                phase,
                timeout_ms,
                ..
            } => format!("{} timed out in {} after {}ms", participant, phase, timeout_ms),
            Self::ConsensusCheck { result, .. } => match result.action {
                Some(action) if result.reached => {
                    format!("consensus {} on {}", result.consensus_type, action)
                }
                _ => "no consensus".to_string(),
            },
            Self::EarlyExit { consensus_type, .. } => {
                format!("early exit on {} consensus", consensus_type)
            }
            Self::VoteResults { scores, winner, .. } => format!(
                "vote: {} candidates, winner {}",
                scores.len(),
                winner.as_ref().map(|w| w.as_str()).unwrap_or("-")
            ),
            Self::FinalDecision { output, .. } => output.summary_line(),
        }
    }
}

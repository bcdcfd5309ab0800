//! The single, final result of one debate run and its fault taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{ActionKind, TradeAction};
use super::agent::ActionResult;
use super::consensus::ConsensusType;
use super::orchestrator::DebateVariant;
use super::proposal::Proposal;
use super::roster::ParticipantId;
use super::state::{DebatePhase, DebateTransition};
use super::voting::{RejectedBallot, TieBreak, VoteScore, VotingMatrix};

/// How the final decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    /// Consensus on the initial proposals.
    EarlyConsensus,
    /// Consensus after critique and revision.
    RevisedConsensus,
    /// Ranked vote.
    Vote,
    /// Too few valid proposals or ballots; HOLD.
    QuorumFailed,
    /// Global budget exhausted; HOLD.
    DeadlineExceeded,
}

impl std::fmt::Display for DecisionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EarlyConsensus => write!(f, "early_consensus"),
            Self::RevisedConsensus => write!(f, "revised_consensus"),
            Self::Vote => write!(f, "vote"),
            Self::QuorumFailed => write!(f, "quorum_failed"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
        }
    }
}

/// A recoverable failure observed during a run.
///
/// Faults are recorded, never returned: every run still ends in a
/// [`DebateOutput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebateFault {
    ParticipantTimeout {
        participant: ParticipantId,
        phase: DebatePhase,
    },
    ParticipantError {
        participant: ParticipantId,
        phase: DebatePhase,
        reason: String,
    },
    InsufficientQuorum {
        phase: DebatePhase,
        received: usize,
        required: usize,
    },
    ExecutionValidationFailure {
        candidate: ParticipantId,
        errors: Vec<String>,
    },
    ExecutionFailure {
        candidate: ParticipantId,
        reason: String,
    },
    DeadlineExceeded {
        phase: DebatePhase,
        budget_ms: u64,
    },
}

impl std::fmt::Display for DebateFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParticipantTimeout { participant, phase } => {
                write!(f, "{} timed out during {}", participant, phase)
            }
            Self::ParticipantError {
                participant,
                phase,
                reason,
            } => write!(f, "{} failed during {}: {}", participant, phase, reason),
            Self::InsufficientQuorum {
                phase,
                received,
                required,
            } => write!(
                f,
                "insufficient quorum in {}: {} valid of {} required",
                phase, received, required
            ),
            Self::ExecutionValidationFailure { candidate, errors } => write!(
                f,
                "validation rejected {}: {}",
                candidate,
                errors.join("; ")
            ),
            Self::ExecutionFailure { candidate, reason } => {
                write!(f, "execution of {} failed: {}", candidate, reason)
            }
            Self::DeadlineExceeded { phase, budget_ms } => {
                write!(f, "debate budget of {}ms exhausted during {}", budget_ms, phase)
            }
        }
    }
}

/// One candidate refused by the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRejection {
    pub candidate: ParticipantId,
    pub errors: Vec<String>,
}

/// Audit data attached to every output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateMetadata {
    /// Participant whose actions were executed, if any.
    pub selected_participant: Option<ParticipantId>,
    pub consensus_type: ConsensusType,
    pub path: DecisionPath,
    pub variant: DebateVariant,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_scores: Option<Vec<VoteScore>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_matrix: Option<VotingMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_break: Option<TieBreak>,
    /// Every successful initial proposal.
    pub proposals: Vec<Proposal>,
    /// Proposals after the revise phase (extended variant only).
    #[serde(default)]
    pub revised_proposals: Vec<Proposal>,
    #[serde(default)]
    pub execution_results: Vec<ActionResult>,
    #[serde(default)]
    pub rejected_ballots: Vec<RejectedBallot>,
    #[serde(default)]
    pub validation_rejections: Vec<ValidationRejection>,
    #[serde(default)]
    pub faults: Vec<DebateFault>,
    #[serde(default)]
    pub transitions: Vec<DebateTransition>,
}

/// Final, immutable result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateOutput {
    pub run_id: String,
    pub actions: Vec<TradeAction>,
    pub plan: String,
    pub reasoning: String,
    pub metadata: DebateMetadata,
}

impl DebateOutput {
    /// Whether the final action list is a single HOLD.
    pub fn is_hold(&self) -> bool {
        matches!(self.actions.as_slice(), [a] if a.kind == ActionKind::Hold)
    }

    /// Whether every executed action succeeded.
    pub fn executed_cleanly(&self) -> bool {
        self.metadata.execution_results.iter().all(|r| r.success)
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let selected = self
            .metadata
            .selected_participant
            .as_ref()
            .map(|p| p.as_str())
            .unwrap_or("-");
        let actions: Vec<String> = self.actions.iter().map(|a| a.to_string()).collect();
        format!(
            "[{}] {} | selected={} | consensus={} | {} faults | {}ms",
            self.metadata.path,
            actions.join(", "),
            selected,
            self.metadata.consensus_type,
            self.metadata.faults.len(),
            self.metadata.elapsed_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(actions: Vec<TradeAction>) -> DebateOutput {
        let now = Utc::now();
        DebateOutput {
            run_id: "run-1".into(),
            actions,
            plan: "plan".into(),
            reasoning: "why".into(),
            metadata: DebateMetadata {
                selected_participant: Some("claude".into()),
                consensus_type: ConsensusType::Majority,
                path: DecisionPath::EarlyConsensus,
                variant: DebateVariant::Lean,
                elapsed_ms: 42,
                started_at: now,
                finished_at: now,
                vote_scores: None,
                voting_matrix: None,
                tie_break: None,
                proposals: vec![],
                revised_proposals: vec![],
                execution_results: vec![],
                rejected_ballots: vec![],
                validation_rejections: vec![],
                faults: vec![DebateFault::ParticipantTimeout {
                    participant: "gpt".into(),
                    phase: DebatePhase::Propose,
                }],
                transitions: vec![],
            },
        }
    }

    #[test]
    fn test_is_hold() {
        assert!(output(vec![TradeAction::hold("x")]).is_hold());
        assert!(!output(vec![TradeAction::market_buy("BTCUSDT", 1.0)]).is_hold());
        assert!(!output(vec![TradeAction::hold("x"), TradeAction::hold("y")]).is_hold());
    }

    #[test]
    fn test_summary_line() {
        let line = output(vec![TradeAction::hold("x")]).summary_line();
        assert!(line.starts_with("[early_consensus] HOLD"));
        assert!(line.contains("selected=claude"));
        assert!(line.contains("consensus=majority"));
        assert!(line.contains("1 faults"));
    }

    #[test]
    fn test_fault_serde_tagged() {
        let fault = DebateFault::InsufficientQuorum {
            phase: DebatePhase::Vote,
            received: 1,
            required: 3,
        };
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["kind"], "insufficient_quorum");
        assert_eq!(json["phase"], "vote");
        assert_eq!(
            fault.to_string(),
            "insufficient quorum in vote: 1 valid of 3 required"
        );
    }

    #[test]
    fn test_output_json_round_trip_keeps_optional_sections_absent() {
        let out = output(vec![TradeAction::hold("x")]);
        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains("vote_scores"));
        let back: DebateOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata.faults, out.metadata.faults);
        assert_eq!(back.metadata.path, DecisionPath::EarlyConsensus);
    }
}

//! Debate state machine: phases, transitions, and run tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Phase of a debate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Run created but not started.
    Idle,
    /// Every participant proposes.
    Propose,
    /// Every proposer critiques the proposal set (extended variant).
    Critique,
    /// Every proposer revises against the critiques it received.
    Revise,
    /// Proposals are inspected for early agreement.
    ConsensusCheck,
    /// Consensus found; the vote is skipped.
    EarlyExit,
    /// Every participant ranks the candidates.
    Vote,
    /// Candidates are validated and the first accepted one executed.
    Finalize,
    /// Run completed normally.
    Done,
    /// Too few valid proposals or ballots.
    FailedQuorum,
    /// Global debate budget exhausted.
    DeadlineExceeded,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::FailedQuorum | Self::DeadlineExceeded
        )
    }

    /// Whether participants are invoked in this phase.
    pub fn is_fan_out(self) -> bool {
        matches!(
            self,
            Self::Propose | Self::Critique | Self::Revise | Self::Vote
        )
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Idle => &[Self::Propose],
            Self::Propose => &[
                Self::ConsensusCheck,
                Self::FailedQuorum,
                Self::DeadlineExceeded,
            ],
            Self::ConsensusCheck => &[
                Self::EarlyExit,
                Self::Critique,
                Self::Vote,
                Self::DeadlineExceeded,
            ],
            Self::Critique => &[Self::Revise, Self::FailedQuorum, Self::DeadlineExceeded],
            Self::Revise => &[
                Self::ConsensusCheck,
                Self::FailedQuorum,
                Self::DeadlineExceeded,
            ],
            Self::EarlyExit => &[Self::Finalize, Self::DeadlineExceeded],
            Self::Vote => &[Self::Finalize, Self::FailedQuorum, Self::DeadlineExceeded],
            Self::Finalize => &[Self::Done],
            Self::Done | Self::FailedQuorum | Self::DeadlineExceeded => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Propose => write!(f, "propose"),
            Self::Critique => write!(f, "critique"),
            Self::Revise => write!(f, "revise"),
            Self::ConsensusCheck => write!(f, "consensus_check"),
            Self::EarlyExit => write!(f, "early_exit"),
            Self::Vote => write!(f, "vote"),
            Self::Finalize => write!(f, "finalize"),
            Self::Done => write!(f, "done"),
            Self::FailedQuorum => write!(f, "failed_quorum"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
}

/// State of one debate run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    /// Run identifier.
    pub id: String,
    pub phase: DebatePhase,
    /// Number of consensus checks performed so far (at most two).
    pub consensus_checks: u32,
    pub transitions: Vec<DebateTransition>,
    pub created_at: DateTime<Utc>,
}

impl DebateSession {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            phase: DebatePhase::Idle,
            consensus_checks: 0,
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }
        if to == DebatePhase::Critique && self.consensus_checks > 1 {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: "critique already ran in this debate".to_string(),
            });
        }

        debug!(run_id = %self.id, from = %self.phase, %to, reason, "Debate transition");
        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        if to == DebatePhase::ConsensusCheck {
            self.consensus_checks += 1;
        }
        Ok(())
    }

    /// Start the run (Idle → Propose).
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(DebatePhase::Propose, "debate started")
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = DebateSession::new("run-1");
        assert_eq!(session.phase, DebatePhase::Idle);
        assert_eq!(session.consensus_checks, 0);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_lean_path_with_vote() {
        let mut s = DebateSession::new("run-1");
        s.start().unwrap();
        s.transition(DebatePhase::ConsensusCheck, "proposals in").unwrap();
        s.transition(DebatePhase::Vote, "no consensus").unwrap();
        s.transition(DebatePhase::Finalize, "tallied").unwrap();
        s.transition(DebatePhase::Done, "executed").unwrap();
        assert!(s.is_complete());
        assert_eq!(
            s.transitions.iter().map(|t| t.to).collect::<Vec<_>>(),
            vec![
                DebatePhase::Propose,
                DebatePhase::ConsensusCheck,
                DebatePhase::Vote,
                DebatePhase::Finalize,
                DebatePhase::Done,
            ]
        );
    }

    #[test]
    fn test_extended_path_revisits_consensus_check_once() {
        let mut s = DebateSession::new("run-1");
        s.start().unwrap();
        s.transition(DebatePhase::ConsensusCheck, "proposals in").unwrap();
        assert_eq!(s.consensus_checks, 1);
        s.transition(DebatePhase::Critique, "no consensus").unwrap();
        s.transition(DebatePhase::Revise, "critiques in").unwrap();
        s.transition(DebatePhase::ConsensusCheck, "revisions in").unwrap();
        assert_eq!(s.consensus_checks, 2);

        let err = s.transition(DebatePhase::Critique, "again").unwrap_err();
        assert!(err.reason.contains("already"));

        s.transition(DebatePhase::EarlyExit, "agreed").unwrap();
        s.transition(DebatePhase::Finalize, "consensus").unwrap();
        s.transition(DebatePhase::Done, "executed").unwrap();
    }

    #[test]
    fn test_failed_quorum_from_propose_and_vote() {
        let mut s = DebateSession::new("run-1");
        s.start().unwrap();
        s.transition(DebatePhase::FailedQuorum, "1 of 3").unwrap();
        assert!(s.is_complete());

        let mut s = DebateSession::new("run-2");
        s.start().unwrap();
        s.transition(DebatePhase::ConsensusCheck, "in").unwrap();
        s.transition(DebatePhase::Vote, "none").unwrap();
        s.transition(DebatePhase::FailedQuorum, "0 ballots").unwrap();
        assert!(s.is_complete());
    }

    #[test]
    fn test_invalid_transition() {
        let mut s = DebateSession::new("run-1");
        let err = s.transition(DebatePhase::Vote, "skip").unwrap_err();
        assert_eq!(err.from, DebatePhase::Idle);
        assert_eq!(err.to, DebatePhase::Vote);
        assert!(err.to_string().contains("idle → vote"));
    }

    #[test]
    fn test_terminal_no_transitions() {
        for terminal in [
            DebatePhase::Done,
            DebatePhase::FailedQuorum,
            DebatePhase::DeadlineExceeded,
        ] {
            assert!(terminal.is_terminal());
            assert!(terminal.valid_transitions().is_empty());
        }
    }

    #[test]
    fn test_finalize_cannot_abort() {
        assert_eq!(
            DebatePhase::Finalize.valid_transitions(),
            &[DebatePhase::Done]
        );
    }

    #[test]
    fn test_phase_display_and_serde_agree() {
        for phase in [
            DebatePhase::Idle,
            DebatePhase::Propose,
            DebatePhase::Critique,
            DebatePhase::Revise,
            DebatePhase::ConsensusCheck,
            DebatePhase::EarlyExit,
            DebatePhase::Vote,
            DebatePhase::Finalize,
            DebatePhase::Done,
            DebatePhase::FailedQuorum,
            DebatePhase::DeadlineExceeded,
        ] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase));
        }
    }

    #[test]
    fn test_start_only_once() {
        let mut s = DebateSession::new("run-42");
        s.start().unwrap();
        assert_eq!(s.phase, DebatePhase::Propose);
        assert_eq!(s.transitions[0].reason, "debate started");
        assert!(s.start().is_err());
    }

    #[test]
    fn test_fan_out_phases() {
        assert!(DebatePhase::Propose.is_fan_out());
        assert!(DebatePhase::Vote.is_fan_out());
        assert!(!DebatePhase::ConsensusCheck.is_fan_out());
        assert!(!DebatePhase::Finalize.is_fan_out());
    }
}

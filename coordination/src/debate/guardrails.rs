//! Quorum and deadline guardrails for a debate run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::output::DebateFault;
use super::state::DebatePhase;

/// Outcome when guardrails are evaluated after a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailOutcome {
    /// Continue the run.
    Continue,
    /// Fewer valid responses than the configured minimum.
    QuorumFailed { received: usize, required: usize },
    /// Global budget exhausted.
    DeadlineExceeded { elapsed_ms: u64, budget_ms: u64 },
}

impl GuardrailOutcome {
    /// Whether the run should stop.
    pub fn should_stop(&self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// Terminal phase this outcome leads to, if any.
    pub fn terminal_phase(&self) -> Option<DebatePhase> {
        match self {
            Self::Continue => None,
            Self::QuorumFailed { .. } => Some(DebatePhase::FailedQuorum),
            Self::DeadlineExceeded { .. } => Some(DebatePhase::DeadlineExceeded),
        }
    }

    /// Fault to record for this outcome in `phase`.
    pub fn fault(&self, phase: DebatePhase) -> Option<DebateFault> {
        match self {
            Self::Continue => None,
            Self::QuorumFailed { received, required } => Some(DebateFault::InsufficientQuorum {
                phase,
                received: *received,
                required: *required,
            }),
            Self::DeadlineExceeded { budget_ms, .. } => Some(DebateFault::DeadlineExceeded {
                phase,
                budget_ms: *budget_ms,
            }),
        }
    }
}

impl std::fmt::Display for GuardrailOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::QuorumFailed { received, required } => {
                write!(f, "quorum_failed ({}/{})", received, required)
            }
            Self::DeadlineExceeded {
                elapsed_ms,
                budget_ms,
            } => write!(f, "deadline_exceeded ({}ms / {}ms)", elapsed_ms, budget_ms),
        }
    }
}

/// Evaluates quorum and the global budget against a running debate.
#[derive(Debug, Clone)]
pub struct GuardrailEngine {
    min_quorum: usize,
    budget: Duration,
    started: Instant,
}

impl GuardrailEngine {
    /// Start the clock now.
    pub fn new(min_quorum: usize, budget_ms: u64) -> Self {
        Self {
            min_quorum,
            budget: Duration::from_millis(budget_ms),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget left; zero once exhausted.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Clip a per-call timeout to the remaining budget.
    pub fn clip(&self, per_call: Duration) -> Duration {
        per_call.min(self.remaining())
    }

    /// Check the deadline, then (if given) the count of valid responses.
    pub fn evaluate(&self, valid_responses: Option<usize>) -> GuardrailOutcome {
        if self.expired() {
            return GuardrailOutcome::DeadlineExceeded {
                elapsed_ms: self.elapsed().as_millis() as u64,
                budget_ms: self.budget.as_millis() as u64,
            };
        }
        match valid_responses {
            Some(received) if received < self.min_quorum => GuardrailOutcome::QuorumFailed {
                received,
                required: self.min_quorum,
            },
            _ => GuardrailOutcome::Continue,
        }
    }
}

//! Proposals and critiques: the per-phase artifacts produced by participants.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::action::{NormalizedAction, TradeAction};
use super::roster::ParticipantId;

/// Why a proposal payload was refused at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposalError {
    #[error("proposal has no actions")]
    Empty,

    #[error("action {index}: {reason}")]
    InvalidAction { index: usize, reason: String },

    #[error("payload does not match the proposal schema: {0}")]
    Schema(String),
}

/// Wire payload an agent returns for the propose/revise phases.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProposalDraft {
    /// Ordered, non-empty list of atomic actions.
    pub actions: Vec<TradeAction>,
    /// Human-readable plan.
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub reasoning: String,
}

impl ProposalDraft {
    /// Parse a JSON payload strictly.
    pub fn from_json(json: &str) -> Result<Self, ProposalError> {
        serde_json::from_str(json).map_err(|e| ProposalError::Schema(e.to_string()))
    }
}

/// A validated proposal from one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub participant: ParticipantId,
    pub actions: Vec<TradeAction>,
    pub plan: String,
    pub reasoning: String,
    /// Derived from the first action; used for agreement and tie-break only.
    pub normalized: NormalizedAction,
    /// Quantity of the first action (0 when it has none).
    pub quantity: f64,
}

impl Proposal {
    /// Validate a draft and derive the normalised action.
    pub fn from_draft(
        participant: ParticipantId,
        draft: ProposalDraft,
    ) -> Result<Self, ProposalError> {
        let first = draft.actions.first().ok_or(ProposalError::Empty)?;
        for (index, action) in draft.actions.iter().enumerate() {
            action
                .check_shape()
                .map_err(|reason| ProposalError::InvalidAction { index, reason })?;
        }
        let normalized = first.kind.normalized();
        let quantity = first.quantity.unwrap_or(0.0);
        Ok(Self {
            participant,
            actions: draft.actions,
            plan: draft.plan,
            reasoning: draft.reasoning,
            normalized,
            quantity,
        })
    }

    /// A single-HOLD proposal.
    pub fn hold(participant: ParticipantId, reasoning: &str) -> Self {
        Self {
            participant,
            actions: vec![TradeAction::hold(reasoning)],
            plan: "Hold".to_string(),
            reasoning: reasoning.to_string(),
            normalized: NormalizedAction::Hold,
            quantity: 0.0,
        }
    }

    /// Whether the leading action is a price-bounded order.
    pub fn is_limit(&self) -> bool {
        self.actions.first().is_some_and(|a| a.kind.is_limit())
    }

    /// Back to the wire shape (e.g. for handing a candidate to a voter).
    pub fn to_draft(&self) -> ProposalDraft {
        ProposalDraft {
            actions: self.actions.clone(),
            plan: self.plan.clone(),
            reasoning: self.reasoning.clone(),
        }
    }
}

/// Wire payload for one critique.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CritiqueDraft {
    /// Free-text name of the participant being critiqued.
    pub target: String,
    pub critique: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
}

/// A critique with both ends resolved to roster identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub author: ParticipantId,
    pub target: ParticipantId,
    pub critique: String,
    pub risks: Vec<String>,
    pub conflicts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::action::ActionKind;

    fn draft(actions: Vec<TradeAction>) -> ProposalDraft {
        ProposalDraft {
            actions,
            plan: "plan".into(),
            reasoning: "because".into(),
        }
    }

    #[test]
    fn test_from_draft_derives_normalized_from_first_action() {
        let p = Proposal::from_draft(
            "claude".into(),
            draft(vec![
                TradeAction::limit_buy("BTCUSDT", 0.001, 60_000.0),
                TradeAction::market_sell("ADAUSDT", 40.0),
            ]),
        )
        .unwrap();
        assert_eq!(p.normalized, NormalizedAction::Buy);
        assert!((p.quantity - 0.001).abs() < f64::EPSILON);
        assert!(p.is_limit());
    }

    #[test]
    fn test_from_draft_rejects_empty() {
        let err = Proposal::from_draft("claude".into(), draft(vec![])).unwrap_err();
        assert_eq!(err, ProposalError::Empty);
    }

    #[test]
    fn test_from_draft_rejects_bad_action() {
        let mut bad = TradeAction::limit_sell("BTCUSDT", 0.001, 60_000.0);
        bad.price = None;
        let err = Proposal::from_draft(
            "gpt".into(),
            draft(vec![TradeAction::hold("x"), bad]),
        )
        .unwrap_err();
        assert!(matches!(err, ProposalError::InvalidAction { index: 1, .. }));
    }

    #[test]
    fn test_hold_proposal() {
        let p = Proposal::hold("gemini".into(), "wait");
        assert_eq!(p.normalized, NormalizedAction::Hold);
        assert_eq!(p.quantity, 0.0);
        assert_eq!(p.actions[0].kind, ActionKind::Hold);
        assert!(!p.is_limit());
    }

    #[test]
    fn test_draft_from_json_is_strict() {
        let ok = ProposalDraft::from_json(
            r#"{"actions":[{"type":"HOLD"}],"plan":"wait","reasoning":"flat"}"#,
        );
        assert!(ok.is_ok());

        let bad = ProposalDraft::from_json(r#"{"actions":[{"type":"YOLO"}]}"#);
        assert!(matches!(bad, Err(ProposalError::Schema(_))));
    }
}

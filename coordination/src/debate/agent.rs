//! Collaborator contracts: the participant adapter and the execution venue.
//!
//! The core never builds prompts, calls models, or talks to an exchange. It
//! only depends on these two traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::action::TradeAction;
use super::context::MarketContext;
use super::proposal::{Critique, CritiqueDraft, Proposal, ProposalDraft};
use super::roster::ParticipantId;
use super::voting::BallotDraft;

/// Failure reported by a participant adapter.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("{0} is not supported by this participant")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Whether the call is worth retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited(_))
    }
}

/// One independent decision source.
///
/// `critique` and `revise` are optional: the defaults contribute no
/// critiques and keep the original proposal.
#[async_trait]
pub trait DebateAgent: Send + Sync {
    /// Roster identity of this participant.
    fn id(&self) -> &ParticipantId;

    async fn propose(&self, ctx: &MarketContext) -> Result<ProposalDraft, AgentError>;

    async fn critique(
        &self,
        _proposals: &[Proposal],
        _ctx: &MarketContext,
    ) -> Result<Vec<CritiqueDraft>, AgentError> {
        Ok(Vec::new())
    }

    async fn revise(
        &self,
        own: &Proposal,
        _critiques: &[Critique],
        _ctx: &MarketContext,
    ) -> Result<ProposalDraft, AgentError> {
        Ok(own.to_draft())
    }

    /// Rank every candidate, 1 = best.
    async fn vote(
        &self,
        candidates: &[Proposal],
        ctx: &MarketContext,
    ) -> Result<BallotDraft, AgentError>;
}

#[async_trait]
impl<T: DebateAgent + ?Sized> DebateAgent for std::sync::Arc<T> {
    fn id(&self) -> &ParticipantId {
        (**self).id()
    }

    async fn propose(&self, ctx: &MarketContext) -> Result<ProposalDraft, AgentError> {
        (**self).propose(ctx).await
    }

    async fn critique(
        &self,
        proposals: &[Proposal],
        ctx: &MarketContext,
    ) -> Result<Vec<CritiqueDraft>, AgentError> {
        (**self).critique(proposals, ctx).await
    }

    async fn revise(
        &self,
        own: &Proposal,
        critiques: &[Critique],
        ctx: &MarketContext,
    ) -> Result<ProposalDraft, AgentError> {
        (**self).revise(own, critiques, ctx).await
    }

    async fn vote(
        &self,
        candidates: &[Proposal],
        ctx: &MarketContext,
    ) -> Result<BallotDraft, AgentError> {
        (**self).vote(candidates, ctx).await
    }
}

/// Failure talking to the execution venue.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    #[error("venue unavailable: {0}")]
    Unavailable(String),

    #[error("venue rejected request: {0}")]
    Rejected(String),
}

/// Outcome of a pre-execution risk check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub allowed: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            errors: Vec::new(),
        }
    }

    pub fn rejected(errors: Vec<String>) -> Self {
        Self {
            allowed: false,
            errors,
        }
    }
}

/// Venue-side details of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_id: String,
    #[serde(default)]
    pub executed_price: Option<f64>,
    #[serde(default)]
    pub executed_quantity: Option<f64>,
    #[serde(default)]
    pub fee: Option<f64>,
}

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub action: TradeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn succeeded(action: TradeAction, order: Option<OrderDetails>) -> Self {
        Self {
            success: true,
            action,
            order,
            error: None,
        }
    }

    pub fn failed(action: TradeAction, error: &str) -> Self {
        Self {
            success: false,
            action,
            order: None,
            error: Some(error.to_string()),
        }
    }
}

/// Order validation and execution, serialised by the implementor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    async fn validate(
        &self,
        actions: &[TradeAction],
        ctx: &MarketContext,
    ) -> Result<ValidationReport, VenueError>;

    async fn execute(
        &self,
        actions: &[TradeAction],
        ctx: &MarketContext,
    ) -> Result<Vec<ActionResult>, VenueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(AgentError::Transport("reset".into()).is_retriable());
        assert!(AgentError::RateLimited("429".into()).is_retriable());
        assert!(!AgentError::Malformed("bad json".into()).is_retriable());
        assert!(!AgentError::Unsupported("critique".into()).is_retriable());
        assert!(!AgentError::Other("boom".into()).is_retriable());
    }

    #[test]
    fn test_action_result_constructors() {
        let ok = ActionResult::succeeded(TradeAction::hold("x"), None);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ActionResult::failed(TradeAction::hold("x"), "venue down");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("venue down"));
    }

    #[test]
    fn test_validation_report_serde_default_errors() {
        let report: ValidationReport = serde_json::from_str(r#"{"allowed":true}"#).unwrap();
        assert_eq!(report, ValidationReport::allowed());
    }
}

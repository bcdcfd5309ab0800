//! Decision Finalizer: validate-then-execute down a ranked candidate list.
//!
//! The first candidate the venue accepts is executed and the chain stops.
//! If every candidate is rejected the decision degrades to a single HOLD.
//! Nothing here returns an error to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::action::TradeAction;
use super::agent::{ActionResult, ExecutionVenue};
use super::context::MarketContext;
use super::output::{DebateFault, ValidationRejection};
use super::proposal::Proposal;
use super::roster::ParticipantId;

/// What the finalizer settled on.
#[derive(Debug, Clone)]
pub struct FinalDecision {
    /// Candidate whose actions were executed; `None` when degraded to HOLD.
    pub selected: Option<ParticipantId>,
    pub actions: Vec<TradeAction>,
    pub plan: String,
    pub reasoning: String,
    pub execution_results: Vec<ActionResult>,
    pub validation_rejections: Vec<ValidationRejection>,
    pub faults: Vec<DebateFault>,
}

impl FinalDecision {
    /// A HOLD decision carrying `reason`.
    pub fn hold(reason: &str) -> Self {
        Self {
            selected: None,
            actions: vec![TradeAction::hold(reason)],
            plan: "Hold".to_string(),
            reasoning: reason.to_string(),
            execution_results: Vec::new(),
            validation_rejections: Vec::new(),
            faults: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.selected.is_none()
    }
}

/// Walks ranked candidates against the execution venue.
pub struct DecisionFinalizer {
    venue: Arc<dyn ExecutionVenue>,
    venue_timeout: Duration,
}

enum Verdict {
    Accepted,
    Rejected(Vec<String>),
}

impl DecisionFinalizer {
    pub fn new(venue: Arc<dyn ExecutionVenue>, venue_timeout: Duration) -> Self {
        Self {
            venue,
            venue_timeout,
        }
    }

    /// Try `ranked` in order; execute the first candidate that validates.
    pub async fn finalize(&self, ranked: &[Proposal], ctx: &MarketContext) -> FinalDecision {
        let mut rejections: Vec<ValidationRejection> = Vec::new();
        let mut faults: Vec<DebateFault> = Vec::new();

        for (position, candidate) in ranked.iter().enumerate() {
            match self.validate(candidate, ctx).await {
                Verdict::Rejected(errors) => {
                    warn!(
                        candidate = %candidate.participant,
                        rank = position + 1,
                        errors = %errors.join("; "),
                        "Candidate failed validation, trying next"
                    );
                    faults.push(DebateFault::ExecutionValidationFailure {
                        candidate: candidate.participant.clone(),
                        errors: errors.clone(),
                    });
                    rejections.push(ValidationRejection {
                        candidate: candidate.participant.clone(),
                        errors,
                    });
                }
                Verdict::Accepted => {
                    let results = self.execute(candidate, ctx, &mut faults).await;
                    info!(
                        candidate = %candidate.participant,
                        rank = position + 1,
                        actions = candidate.actions.len(),
                        succeeded = results.iter().filter(|r| r.success).count(),
                        "Candidate executed"
                    );
                    return FinalDecision {
                        selected: Some(candidate.participant.clone()),
                        actions: candidate.actions.clone(),
                        plan: candidate.plan.clone(),
                        reasoning: candidate.reasoning.clone(),
                        execution_results: results,
                        validation_rejections: rejections,
                        faults,
                    };
                }
            }
        }

        let reason = degraded_reason(&rejections);
        warn!(candidates = ranked.len(), "No candidate passed validation, holding");
        FinalDecision {
            validation_rejections: rejections,
            faults,
            ..FinalDecision::hold(&reason)
        }
    }

    async fn validate(&self, candidate: &Proposal, ctx: &MarketContext) -> Verdict {
        let attempt = tokio::time::timeout(
            self.venue_timeout,
            self.venue.validate(&candidate.actions, ctx),
        )
        .await;
        match attempt {
            Ok(Ok(report)) if report.allowed => Verdict::Accepted,
            Ok(Ok(report)) if report.errors.is_empty() => {
                Verdict::Rejected(vec!["rejected without reason".to_string()])
            }
            Ok(Ok(report)) => Verdict::Rejected(report.errors),
            Ok(Err(e)) => Verdict::Rejected(vec![e.to_string()]),
            Err(_) => Verdict::Rejected(vec![format!(
                "validation timed out after {}ms",
                self.venue_timeout.as_millis()
            )]),
        }
    }

    /// Execute a validated candidate. Venue failures mark every action failed.
    async fn execute(
        &self,
        candidate: &Proposal,
        ctx: &MarketContext,
        faults: &mut Vec<DebateFault>,
    ) -> Vec<ActionResult> {
        let attempt = tokio::time::timeout(
            self.venue_timeout,
            self.venue.execute(&candidate.actions, ctx),
        )
        .await;
        let failure = match attempt {
            Ok(Ok(results)) => {
                let errors: Vec<String> = results
                    .iter()
                    .filter(|r| !r.success)
                    .map(|r| format!("{}: {}", r.action, r.error.as_deref().unwrap_or("failed")))
                    .collect();
                if !errors.is_empty() {
                    faults.push(DebateFault::ExecutionFailure {
                        candidate: candidate.participant.clone(),
                        reason: errors.join("; "),
                    });
                }
                return results;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "execution timed out after {}ms",
                self.venue_timeout.as_millis()
            ),
        };

        warn!(candidate = %candidate.participant, error = %failure, "Execution failed");
        faults.push(DebateFault::ExecutionFailure {
            candidate: candidate.participant.clone(),
            reason: failure.clone(),
        });
        candidate
            .actions
            .iter()
            .map(|a| ActionResult::failed(a.clone(), &failure))
            .collect()
    }
}

fn degraded_reason(rejections: &[ValidationRejection]) -> String {
    if rejections.is_empty() {
        return "No candidates available for execution".to_string();
    }
    let details: Vec<String> = rejections
        .iter()
        .map(|r| format!("{}: {}", r.candidate, r.errors.join(", ")))
        .collect();
    format!(
        "All {} candidates failed validation ({})",
        rejections.len(),
        details.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::action::ActionKind;
    use crate::debate::agent::{MockExecutionVenue, OrderDetails, ValidationReport, VenueError};
    use crate::debate::proposal::ProposalDraft;
    use async_trait::async_trait;
    use chrono::Utc;

    fn proposal(who: &str, action: TradeAction) -> Proposal {
        Proposal::from_draft(
            who.into(),
            ProposalDraft {
                actions: vec![action],
                plan: format!("{who} plan"),
                reasoning: format!("{who} reasoning"),
            },
        )
        .unwrap()
    }

    fn ctx() -> MarketContext {
        MarketContext::new(Utc::now()).with_price("BTCUSDT", 60_000.0)
    }

    fn filled(actions: &[TradeAction]) -> Vec<ActionResult> {
        actions
            .iter()
            .map(|a| {
                ActionResult::succeeded(
                    a.clone(),
                    Some(OrderDetails {
                        order_id: "1".into(),
                        executed_price: a.price,
                        executed_quantity: a.quantity,
                        fee: Some(0.0),
                    }),
                )
            })
            .collect()
    }

    fn finalizer(venue: impl ExecutionVenue + 'static) -> DecisionFinalizer {
        DecisionFinalizer::new(Arc::new(venue), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_first_candidate_accepted() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_validate()
            .times(1)
            .returning(|_, _| Ok(ValidationReport::allowed()));
        venue
            .expect_execute()
            .times(1)
            .returning(|actions, _| Ok(filled(actions)));

        let ranked = vec![
            proposal("a", TradeAction::limit_buy("BTCUSDT", 0.001, 59_000.0)),
            proposal("b", TradeAction::hold("x")),
        ];
        let decision = finalizer(venue).finalize(&ranked, &ctx()).await;
        assert_eq!(decision.selected, Some("a".into()));
        assert_eq!(decision.plan, "a plan");
        assert_eq!(decision.execution_results.len(), 1);
        assert!(decision.faults.is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_next_candidate() {
        let mut venue = MockExecutionVenue::new();
        venue.expect_validate().times(2).returning(|actions, _| {
            if actions[0].kind == ActionKind::PlaceMarketBuy {
                Ok(ValidationReport::rejected(vec!["exposure above 50%".into()]))
            } else {
                Ok(ValidationReport::allowed())
            }
        });
        venue
            .expect_execute()
            .times(1)
            .returning(|actions, _| Ok(filled(actions)));

        let ranked = vec![
            proposal("greedy", TradeAction::market_buy("BTCUSDT", 5.0)),
            proposal("modest", TradeAction::limit_buy("BTCUSDT", 0.001, 59_000.0)),
        ];
        let decision = finalizer(venue).finalize(&ranked, &ctx()).await;
        assert_eq!(decision.selected, Some("modest".into()));
        assert_eq!(decision.validation_rejections.len(), 1);
        assert_eq!(decision.validation_rejections[0].candidate.as_str(), "greedy");
        assert!(matches!(
            decision.faults[0],
            DebateFault::ExecutionValidationFailure { .. }
        ));
    }

    #[tokio::test]
    async fn test_all_rejected_degrades_to_hold() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_validate()
            .times(2)
            .returning(|_, _| Ok(ValidationReport::rejected(vec!["price deviation".into()])));
        venue.expect_execute().never();

        let ranked = vec![
            proposal("a", TradeAction::market_buy("BTCUSDT", 1.0)),
            proposal("b", TradeAction::market_sell("BTCUSDT", 1.0)),
        ];
        let decision = finalizer(venue).finalize(&ranked, &ctx()).await;
        assert!(decision.is_degraded());
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.actions[0].kind, ActionKind::Hold);
        assert!(decision.reasoning.contains("failed validation"));
        assert!(decision.reasoning.contains("a: price deviation"));
        assert!(decision.execution_results.is_empty());
        assert_eq!(decision.validation_rejections.len(), 2);
    }

    #[tokio::test]
    async fn test_validate_error_counts_as_rejection() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_validate()
            .returning(|_, _| Err(VenueError::Unavailable("503".into())));
        let ranked = vec![proposal("a", TradeAction::hold("x"))];
        let decision = finalizer(venue).finalize(&ranked, &ctx()).await;
        assert!(decision.is_degraded());
        assert!(decision.validation_rejections[0].errors[0].contains("503"));
    }

    #[tokio::test]
    async fn test_execute_error_stops_chain() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_validate()
            .times(1)
            .returning(|_, _| Ok(ValidationReport::allowed()));
        venue
            .expect_execute()
            .times(1)
            .returning(|_, _| Err(VenueError::Rejected("insufficient balance".into())));

        let ranked = vec![
            proposal("a", TradeAction::market_buy("BTCUSDT", 1.0)),
            proposal("b", TradeAction::hold("x")),
        ];
        let decision = finalizer(venue).finalize(&ranked, &ctx()).await;
        assert_eq!(decision.selected, Some("a".into()));
        assert_eq!(decision.execution_results.len(), 1);
        assert!(!decision.execution_results[0].success);
        assert!(matches!(
            &decision.faults[0],
            DebateFault::ExecutionFailure { reason, .. } if reason.contains("insufficient")
        ));
    }

    #[tokio::test]
    async fn test_partial_fill_failure_recorded() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_validate()
            .returning(|_, _| Ok(ValidationReport::allowed()));
        venue.expect_execute().returning(|actions, _| {
            Ok(vec![
                ActionResult::succeeded(actions[0].clone(), None),
                ActionResult::failed(actions[1].clone(), "unknown order"),
            ])
        });
        let ranked = vec![Proposal::from_draft(
            "a".into(),
            ProposalDraft {
                actions: vec![
                    TradeAction::market_buy("BTCUSDT", 1.0),
                    TradeAction::cancel("BTCUSDT", "77"),
                ],
                plan: String::new(),
                reasoning: String::new(),
            },
        )
        .unwrap()];
        let decision = finalizer(venue).finalize(&ranked, &ctx()).await;
        assert_eq!(decision.execution_results.len(), 2);
        assert_eq!(decision.faults.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let venue = MockExecutionVenue::new();
        let decision = finalizer(venue).finalize(&[], &ctx()).await;
        assert!(decision.is_degraded());
        assert!(decision.reasoning.contains("No candidates"));
    }

    struct StallingVenue;

    #[async_trait]
    impl ExecutionVenue for StallingVenue {
        async fn validate(
            &self,
            _actions: &[TradeAction],
            _ctx: &MarketContext,
        ) -> Result<ValidationReport, VenueError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ValidationReport::allowed())
        }

        async fn execute(
            &self,
            _actions: &[TradeAction],
            _ctx: &MarketContext,
        ) -> Result<Vec<ActionResult>, VenueError> {
            unreachable!("validation never completes")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_timeout_is_rejection() {
        let ranked = vec![proposal("a", TradeAction::hold("x"))];
        let decision = finalizer(StallingVenue).finalize(&ranked, &ctx()).await;
        assert!(decision.is_degraded());
        assert!(decision.validation_rejections[0].errors[0].contains("timed out"));
    }
}

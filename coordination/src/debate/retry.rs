//! Retry-with-backoff around participant calls.
//!
//! The retry loop runs inside the phase's per-call timeout, so a slow
//! participant can never extend a phase by retrying.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::agent::{AgentError, DebateAgent};
use super::context::MarketContext;
use super::proposal::{Critique, CritiqueDraft, Proposal, ProposalDraft};
use super::roster::ParticipantId;
use super::voting::BallotDraft;

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-indexed; 0 means no wait).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }
}

impl Default for RetryPolicy {
    /// 2 retries, 500ms initial backoff, 2x multiplier, 5s max.
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

/// Run `op`, retrying retriable [`AgentError`]s according to `policy`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && policy.should_retry(attempt) => {
                attempt += 1;
                let backoff = policy.backoff_duration(attempt);
                warn!(
                    label,
                    attempt,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient error, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A [`DebateAgent`] whose every call is wrapped in [`retry_with_backoff`].
pub struct RetryingAgent<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: DebateAgent> RetryingAgent<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<A: DebateAgent> DebateAgent for RetryingAgent<A> {
    fn id(&self) -> &ParticipantId {
        self.inner.id()
    }

    async fn propose(&self, ctx: &MarketContext) -> Result<ProposalDraft, AgentError> {
        retry_with_backoff(&self.policy, "propose", || self.inner.propose(ctx)).await
    }

    async fn critique(
        &self,
        proposals: &[Proposal],
        ctx: &MarketContext,
    ) -> Result<Vec<CritiqueDraft>, AgentError> {
        retry_with_backoff(&self.policy, "critique", || {
            self.inner.critique(proposals, ctx)
        })
        .await
    }

    async fn revise(
        &self,
        own: &Proposal,
        critiques: &[Critique],
        ctx: &MarketContext,
    ) -> Result<ProposalDraft, AgentError> {
        retry_with_backoff(&self.policy, "revise", || {
            self.inner.revise(own, critiques, ctx)
        })
        .await
    }

    async fn vote(
        &self,
        candidates: &[Proposal],
        ctx: &MarketContext,
    ) -> Result<BallotDraft, AgentError> {
        retry_with_backoff(&self.policy, "vote", || self.inner.vote(candidates, ctx)).await
    }
}

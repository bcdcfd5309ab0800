//! Fixture-driven participants.
//!
//! A fixture is a JSON document holding one market snapshot and, per
//! participant, the replies it gives in each phase. Used for dry runs of a
//! council configuration without any model behind it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordination::debate::{
    AgentError, BallotDraft, Critique, CritiqueDraft, DebateAgent, MarketContext, ParticipantId,
    Proposal, ProposalDraft,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("fixture has no participants")]
    Empty,
}

/// A scripted reply: the payload, or a failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scripted<T> {
    Reply(T),
    Failure {
        error: String,
        /// Report the failure as retriable.
        #[serde(default)]
        transient: bool,
    },
}

impl<T: Clone> Scripted<T> {
    fn play(&self) -> Result<T, AgentError> {
        match self {
            Self::Reply(value) => Ok(value.clone()),
            Self::Failure {
                error,
                transient: true,
            } => Err(AgentError::Transport(error.clone())),
            Self::Failure { error, .. } => Err(AgentError::Other(error.clone())),
        }
    }
}

/// Everything one participant says during a run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParticipantScript {
    /// Delay before every reply.
    pub delay_ms: u64,
    pub propose: Option<Scripted<ProposalDraft>>,
    pub critiques: Vec<CritiqueDraft>,
    /// Absent: keep the original proposal.
    pub revise: Option<Scripted<ProposalDraft>>,
    /// Absent: own proposal first, then the rest in candidate order.
    pub vote: Option<Scripted<BallotDraft>>,
}

/// A market snapshot plus per-participant scripts.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub market: MarketContext,
    pub participants: BTreeMap<String, ParticipantScript>,
}

impl Fixture {
    pub fn from_json(text: &str) -> Result<Self, FixtureError> {
        let fixture: Self = serde_json::from_str(text)?;
        if fixture.participants.is_empty() {
            return Err(FixtureError::Empty);
        }
        Ok(fixture)
    }

    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// One agent per scripted participant.
    pub fn agents(&self) -> Vec<Arc<dyn DebateAgent>> {
        self.participants
            .iter()
            .map(|(id, script)| {
                Arc::new(ScriptedAgent::new(id, script.clone())) as Arc<dyn DebateAgent>
            })
            .collect()
    }
}

/// A participant that replays its script.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    id: ParticipantId,
    script: ParticipantScript,
}

impl ScriptedAgent {
    pub fn new(id: &str, script: ParticipantScript) -> Self {
        Self {
            id: ParticipantId::new(id),
            script,
        }
    }

    async fn pause(&self) {
        if self.script.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.script.delay_ms)).await;
        }
    }
}

#[async_trait]
impl DebateAgent for ScriptedAgent {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn propose(&self, _ctx: &MarketContext) -> Result<ProposalDraft, AgentError> {
        self.pause().await;
        match &self.script.propose {
            Some(reply) => reply.play(),
            None => Err(AgentError::Unsupported("propose".to_string())),
        }
    }

    async fn critique(
        &self,
        _proposals: &[Proposal],
        _ctx: &MarketContext,
    ) -> Result<Vec<CritiqueDraft>, AgentError> {
        self.pause().await;
        Ok(self.script.critiques.clone())
    }

    async fn revise(
        &self,
        own: &Proposal,
        critiques: &[Critique],
        _ctx: &MarketContext,
    ) -> Result<ProposalDraft, AgentError> {
        self.pause().await;
        debug!(participant = %self.id, critiques = critiques.len(), "Scripted revision");
        match &self.script.revise {
            Some(reply) => reply.play(),
            None => Ok(own.to_draft()),
        }
    }

    async fn vote(
        &self,
        candidates: &[Proposal],
        _ctx: &MarketContext,
    ) -> Result<BallotDraft, AgentError> {
        self.pause().await;
        if let Some(reply) = &self.script.vote {
            return reply.play();
        }
        let mut order: Vec<&str> = candidates
            .iter()
            .map(|p| p.participant.as_str())
            .filter(|c| *c == self.id.as_str())
            .collect();
        order.extend(
            candidates
                .iter()
                .map(|p| p.participant.as_str())
                .filter(|c| *c != self.id.as_str()),
        );
        Ok(BallotDraft::ranked(&order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coordination::debate::{ActionKind, TradeAction};

    const FIXTURE: &str = r#"{
        "market": { "as_of": "2026-01-05T12:00:00Z", "prices": { "BTCUSDT": 60000.0 }, "quote_balance": 1000.0 },
        "participants": {
            "alpha": {
                "propose": { "actions": [{ "type": "PLACE_LIMIT_BUY", "asset": "BTCUSDT", "quantity": 0.001, "price": 59500.0 }], "plan": "dip buy" },
                "vote": { "rankings": [{ "candidate": "beta", "rank": 1 }, { "candidate": "alpha", "rank": 2 }] }
            },
            "beta": {
                "propose": { "error": "upstream 503", "transient": true }
            },
            "gamma": {
                "delay_ms": 5,
                "propose": { "error": "refused" }
            }
        }
    }"#;

    fn ctx() -> MarketContext {
        MarketContext::new(Utc::now())
    }

    #[test]
    fn test_parse_fixture() {
        let fixture = Fixture::from_json(FIXTURE).unwrap();
        assert_eq!(fixture.participants.len(), 3);
        assert_eq!(fixture.market.price("BTCUSDT"), Some(60_000.0));
        assert_eq!(fixture.agents().len(), 3);
        assert!(matches!(
            fixture.participants["alpha"].propose,
            Some(Scripted::Reply(_))
        ));
        assert!(matches!(
            fixture.participants["beta"].propose,
            Some(Scripted::Failure { transient: true, .. })
        ));
    }

    #[test]
    fn test_empty_fixture_rejected() {
        let err = Fixture::from_json(r#"{ "market": { "as_of": "2026-01-05T12:00:00Z" }, "participants": {} }"#)
            .unwrap_err();
        assert!(matches!(err, FixtureError::Empty));
        assert!(matches!(
            Fixture::from_json("not json").unwrap_err(),
            FixtureError::Parse(_)
        ));
    }

    #[tokio::test]
    async fn test_replies_and_failures() {
        let fixture = Fixture::from_json(FIXTURE).unwrap();
        let alpha = ScriptedAgent::new("alpha", fixture.participants["alpha"].clone());
        let draft = alpha.propose(&ctx()).await.unwrap();
        assert_eq!(draft.actions[0].kind, ActionKind::PlaceLimitBuy);
        assert_eq!(draft.plan, "dip buy");

        let beta = ScriptedAgent::new("beta", fixture.participants["beta"].clone());
        assert!(beta.propose(&ctx()).await.unwrap_err().is_retriable());

        let gamma = ScriptedAgent::new("gamma", fixture.participants["gamma"].clone());
        assert!(!gamma.propose(&ctx()).await.unwrap_err().is_retriable());
    }

    #[tokio::test]
    async fn test_default_vote_ranks_self_first() {
        let agent = ScriptedAgent::new("b", ParticipantScript::default());
        let candidates: Vec<Proposal> = ["a", "b", "c"]
            .iter()
            .map(|id| Proposal::hold((*id).into(), "x"))
            .collect();
        let ballot = agent.vote(&candidates, &ctx()).await.unwrap();
        let order: Vec<(&str, u32)> = ballot
            .rankings
            .iter()
            .map(|r| (r.candidate.as_str(), r.rank))
            .collect();
        assert_eq!(order, vec![("b", 1), ("a", 2), ("c", 3)]);
    }

    #[tokio::test]
    async fn test_default_revise_keeps_proposal() {
        let agent = ScriptedAgent::new("a", ParticipantScript::default());
        let own = Proposal::from_draft(
            "a".into(),
            ProposalDraft {
                actions: vec![TradeAction::market_sell("BTCUSDT", 0.5)],
                plan: "trim".into(),
                reasoning: String::new(),
            },
        )
        .unwrap();
        let revised = agent.revise(&own, &[], &ctx()).await.unwrap();
        assert_eq!(revised.actions, own.actions);
        assert!(matches!(
            agent.propose(&ctx()).await,
            Err(AgentError::Unsupported(_))
        ));
    }
}

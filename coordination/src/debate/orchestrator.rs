//! Debate controller: drives one run through the state machine.
//!
//! Ties together the phase orchestrator, consensus checker, vote tally,
//! guardrails, and decision finalizer, and always produces exactly one
//! [`DebateOutput`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::agent::{DebateAgent, ExecutionVenue};
use super::consensus::{ConsensusChecker, ConsensusResult, ConsensusType};
use super::context::{MarketContext, SharedContext};
use super::finalizer::{DecisionFinalizer, FinalDecision};
use super::guardrails::{GuardrailEngine, GuardrailOutcome};
use super::output::{DebateFault, DebateMetadata, DebateOutput, DecisionPath};
use super::phase::{Participant, PhaseOrchestrator};
use super::proposal::{Critique, CritiqueDraft, Proposal};
use super::retry::{RetryPolicy, RetryingAgent};
use super::roster::{ParticipantId, Roster};
use super::state::{DebatePhase, DebateSession};
use super::voting::{
    ranked_candidates, tally, tie_break, Ballot, BallotDraft, RejectedBallot, TallyReport,
    TieBreak,
};
use crate::events::{DebateEvent, EventBus, SharedEventBus};

/// Which generation of the debate algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateVariant {
    /// Propose, then vote.
    #[default]
    Lean,
    /// Propose, critique, revise, then vote.
    Extended,
}

impl std::fmt::Display for DebateVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lean => write!(f, "lean"),
            Self::Extended => write!(f, "extended"),
        }
    }
}

impl std::str::FromStr for DebateVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lean" => Ok(Self::Lean),
            "extended" => Ok(Self::Extended),
            other => Err(format!("unknown debate variant '{other}' (expected lean|extended)")),
        }
    }
}

/// Configuration for the debate controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    pub variant: DebateVariant,
    /// Skip the vote when a consensus check succeeds.
    pub early_exit: bool,
    /// Minimum valid proposals and ballots to proceed.
    pub min_quorum: usize,
    pub per_call_timeout_ms: u64,
    /// Global budget for all debate phases.
    pub debate_timeout_ms: u64,
    /// Bound on each execution collaborator call.
    pub venue_timeout_ms: u64,
    pub consensus_tolerance_pct: f64,
    pub retry: RetryPolicy,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            variant: DebateVariant::Lean,
            early_exit: true,
            min_quorum: 2,
            per_call_timeout_ms: 60_000,
            debate_timeout_ms: 300_000,
            venue_timeout_ms: 30_000,
            consensus_tolerance_pct: 30.0,
            retry: RetryPolicy::default(),
        }
    }
}

impl DebateConfig {
    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        let invalid = |msg: &str| Err(ControllerError::InvalidConfig(msg.to_string()));
        if self.min_quorum == 0 {
            return invalid("min_quorum must be at least 1");
        }
        if self.per_call_timeout_ms == 0 {
            return invalid("per_call_timeout_ms must be positive");
        }
        if self.debate_timeout_ms == 0 {
            return invalid("debate_timeout_ms must be positive");
        }
        if self.venue_timeout_ms == 0 {
            return invalid("venue_timeout_ms must be positive");
        }
        if !self.consensus_tolerance_pct.is_finite() || self.consensus_tolerance_pct < 0.0 {
            return invalid("consensus_tolerance_pct must be a non-negative number");
        }
        Ok(())
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }
}

/// Error building a controller. Runs themselves never fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("roster is empty")]
    EmptyRoster,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("agent '{0}' does not resolve to a roster participant")]
    UnknownAgent(ParticipantId),

    #[error("more than one agent answers for {0}")]
    DuplicateAgent(ParticipantId),

    #[error("no agent answers for {0}")]
    MissingAgent(ParticipantId),

    #[error("min_quorum {quorum} exceeds roster size {roster}")]
    QuorumExceedsRoster { quorum: usize, roster: usize },
}

/// Mutable bookkeeping for one run.
struct RunState {
    session: DebateSession,
    started_at: DateTime<Utc>,
    consensus: Option<ConsensusResult>,
    proposals: Vec<Proposal>,
    revised: Vec<Proposal>,
    tally: Option<TallyReport>,
    tie_break: Option<TieBreak>,
    rejected_ballots: Vec<RejectedBallot>,
    faults: Vec<DebateFault>,
}

impl RunState {
    fn new(run_id: &str) -> Self {
        Self {
            session: DebateSession::new(run_id),
            started_at: Utc::now(),
            consensus: None,
            proposals: Vec::new(),
            revised: Vec::new(),
            tally: None,
            tie_break: None,
            rejected_ballots: Vec::new(),
            faults: Vec::new(),
        }
    }

    fn advance(&mut self, to: DebatePhase, reason: &str) {
        if let Err(e) = self.session.transition(to, reason) {
            warn!(run_id = %self.session.id, error = %e, "Ignoring invalid transition");
        }
    }

    fn run_id(&self) -> &str {
        &self.session.id
    }
}

/// The debate controller.
///
/// Usage:
/// 1. Build with `new()` from a config, roster, agents, and venue
/// 2. Optionally attach a shared event bus with `with_event_bus()`
/// 3. Call `run()` once per market snapshot
pub struct DebateController {
    config: DebateConfig,
    roster: Roster,
    participants: Vec<Participant>,
    venue: Arc<dyn ExecutionVenue>,
    bus: SharedEventBus,
    checker: ConsensusChecker,
}

impl DebateController {
    /// Bind each agent to its roster entry.
    ///
    /// Every roster participant must be answered for by exactly one agent.
    /// Agents are wrapped in the configured retry policy.
    pub fn new(
        config: DebateConfig,
        roster: Roster,
        agents: Vec<Arc<dyn DebateAgent>>,
        venue: Arc<dyn ExecutionVenue>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        if roster.is_empty() {
            return Err(ControllerError::EmptyRoster);
        }
        if config.min_quorum > roster.len() {
            return Err(ControllerError::QuorumExceedsRoster {
                quorum: config.min_quorum,
                roster: roster.len(),
            });
        }

        let mut bound: HashMap<ParticipantId, Arc<dyn DebateAgent>> = HashMap::new();
        for agent in agents {
            let id = roster
                .resolve(agent.id().as_str())
                .ok_or_else(|| ControllerError::UnknownAgent(agent.id().clone()))?;
            if bound.contains_key(&id) {
                return Err(ControllerError::DuplicateAgent(id));
            }
            bound.insert(id, agent);
        }

        let mut participants = Vec::with_capacity(roster.len());
        for id in roster.ids() {
            let agent = bound
                .remove(&id)
                .ok_or_else(|| ControllerError::MissingAgent(id.clone()))?;
            let agent: Arc<dyn DebateAgent> = if config.retry.max_retries > 0 {
                Arc::new(RetryingAgent::new(agent, config.retry.clone()))
            } else {
                agent
            };
            participants.push(Participant::new(id, agent));
        }

        Ok(Self {
            checker: ConsensusChecker::new(config.consensus_tolerance_pct),
            config,
            roster,
            participants,
            venue,
            bus: EventBus::new().shared(),
        })
    }

    /// Publish progress on an externally owned bus.
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Run one debate over `ctx`. Always yields a well-formed output.
    pub async fn run(&self, ctx: MarketContext) -> DebateOutput {
        let ctx: SharedContext = Arc::new(ctx);
        let run_id = Uuid::new_v4().to_string();
        let phases = PhaseOrchestrator::new(&run_id, self.bus.clone());
        let guard = GuardrailEngine::new(self.config.min_quorum, self.config.debate_timeout_ms);
        let mut run = RunState::new(&run_id);

        info!(
            run_id = %run_id,
            variant = %self.config.variant,
            participants = self.participants.len(),
            min_quorum = self.config.min_quorum,
            "Debate started"
        );
        if let Err(e) = run.session.start() {
            warn!(run_id = %run_id, error = %e, "Run was already started");
        }

        // ── Propose ──
        let report = phases
            .run_phase(
                DebatePhase::Propose,
                &self.participants,
                guard.clip(self.config.per_call_timeout()),
                {
                    let ctx = ctx.clone();
                    move |id, agent| {
                        let ctx = ctx.clone();
                        async move {
                            let draft = agent.propose(&ctx).await.map_err(|e| e.to_string())?;
                            Proposal::from_draft(id, draft).map_err(|e| e.to_string())
                        }
                        .boxed()
                    }
                },
            )
            .await;
        run.faults.extend(report.faults());
        run.proposals = report.into_successes().into_iter().map(|(_, p)| p).collect();

        let outcome = guard.evaluate(Some(run.proposals.len()));
        if outcome.should_stop() {
            return self.abort(run, &guard, outcome, DebatePhase::Propose);
        }

        // ── First consensus check ──
        run.advance(DebatePhase::ConsensusCheck, "proposals collected");
        let mut candidates = run.proposals.clone();
        let first = self.check_consensus(&mut run, &candidates);
        if first.reached && self.config.early_exit {
            let ranked = first.ranked_candidates(&candidates);
            return self
                .early_exit(
                    run,
                    &guard,
                    &ctx,
                    &first,
                    &candidates,
                    ranked,
                    DecisionPath::EarlyConsensus,
                )
                .await;
        }

        // ── Critique / revise (extended variant) ──
        if self.config.variant == DebateVariant::Extended {
            let outcome = guard.evaluate(None);
            if outcome.should_stop() {
                return self.abort(run, &guard, outcome, DebatePhase::ConsensusCheck);
            }
            run.advance(DebatePhase::Critique, "no early consensus");
            let critiques = self.critique_phase(&phases, &guard, &ctx, &mut run).await;

            let outcome = guard.evaluate(None);
            if outcome.should_stop() {
                return self.abort(run, &guard, outcome, DebatePhase::Critique);
            }
            run.advance(DebatePhase::Revise, "critiques collected");
            candidates = self
                .revise_phase(&phases, &guard, &ctx, &mut run, critiques)
                .await;
            run.revised = candidates.clone();

            let outcome = guard.evaluate(Some(candidates.len()));
            if outcome.should_stop() {
                return self.abort(run, &guard, outcome, DebatePhase::Revise);
            }

            run.advance(DebatePhase::ConsensusCheck, "revisions collected");
            let second = self.check_consensus(&mut run, &candidates);
            if second.reached && self.config.early_exit {
                let ranked = second.ranked_candidates(&candidates);
                return self
                    .early_exit(
                        run,
                        &guard,
                        &ctx,
                        &second,
                        &candidates,
                        ranked,
                        DecisionPath::RevisedConsensus,
                    )
                    .await;
            }
        }

        // ── Vote ──
        let outcome = guard.evaluate(None);
        if outcome.should_stop() {
            return self.abort(run, &guard, outcome, DebatePhase::ConsensusCheck);
        }
        run.advance(DebatePhase::Vote, "no consensus to act on");
        let ballots = self.vote_phase(&phases, &guard, &ctx, &mut run, &candidates).await;

        let outcome = guard.evaluate(Some(ballots.len()));
        if outcome.should_stop() {
            return self.abort(run, &guard, outcome, DebatePhase::Vote);
        }

        let candidate_ids: Vec<ParticipantId> =
            candidates.iter().map(|p| p.participant.clone()).collect();
        let report = tally(&ballots, &candidate_ids);
        run.rejected_ballots.extend(report.rejected.iter().cloned());
        let decision = tie_break(&report, &candidates);
        if let Some(tb) = &decision {
            info!(
                run_id = %run.run_id(),
                winner = %tb.winner,
                rule = %tb.rule,
                tied = tb.tied.len(),
                "Vote resolved"
            );
        }
        self.bus.publish(DebateEvent::VoteResults {
            run_id: run.run_id().to_string(),
            scores: report.scores.clone(),
            winner: decision.as_ref().map(|t| t.winner.clone()),
            timestamp: Utc::now(),
        });

        let ranked = match &decision {
            Some(tb) => ranked_candidates(&report, &tb.winner),
            None => Vec::new(),
        };
        run.tally = Some(report);
        run.tie_break = decision;

        run.advance(DebatePhase::Finalize, "vote tallied");
        let final_decision = self.finalize(&ctx, &candidates, &ranked).await;
        self.conclude(run, &guard, final_decision, DecisionPath::Vote)
    }

    fn check_consensus(&self, run: &mut RunState, proposals: &[Proposal]) -> ConsensusResult {
        let result = self.checker.check(proposals);
        info!(
            run_id = %run.run_id(),
            reached = result.reached,
            consensus_type = %result.consensus_type,
            proposals = proposals.len(),
            "Consensus check"
        );
        self.bus.publish(DebateEvent::ConsensusCheck {
            run_id: run.run_id().to_string(),
            result: result.clone(),
            timestamp: Utc::now(),
        });
        run.consensus = Some(result.clone());
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn early_exit(
        &self,
        mut run: RunState,
        guard: &GuardrailEngine,
        ctx: &SharedContext,
        consensus: &ConsensusResult,
        candidates: &[Proposal],
        ranked: Vec<ParticipantId>,
        path: DecisionPath,
    ) -> DebateOutput {
        run.advance(DebatePhase::EarlyExit, "consensus reached");
        self.bus.publish(DebateEvent::EarlyExit {
            run_id: run.run_id().to_string(),
            consensus_type: consensus.consensus_type,
            timestamp: Utc::now(),
        });

        let outcome = guard.evaluate(None);
        if outcome.should_stop() {
            return self.abort(run, guard, outcome, DebatePhase::EarlyExit);
        }
        run.advance(DebatePhase::Finalize, "early exit");
        let decision = self.finalize(ctx, candidates, &ranked).await;
        self.conclude(run, guard, decision, path)
    }

    async fn critique_phase(
        &self,
        phases: &PhaseOrchestrator,
        guard: &GuardrailEngine,
        ctx: &SharedContext,
        run: &mut RunState,
    ) -> Vec<Critique> {
        let proposers = self.proposers(&run.proposals);
        let proposals = Arc::new(run.proposals.clone());
        let report = phases
            .run_phase(
                DebatePhase::Critique,
                &proposers,
                guard.clip(self.config.per_call_timeout()),
                {
                    let ctx = ctx.clone();
                    move |_id, agent| {
                        let ctx = ctx.clone();
                        let proposals = proposals.clone();
                        async move {
                            agent
                                .critique(&proposals, &ctx)
                                .await
                                .map_err(|e| e.to_string())
                        }
                        .boxed()
                    }
                },
            )
            .await;
        run.faults.extend(report.faults());

        let mut critiques = Vec::new();
        for (author, drafts) in report.into_successes() {
            for draft in drafts {
                if let Some(c) = self.resolve_critique(&author, draft, &run.proposals) {
                    critiques.push(c);
                }
            }
        }
        critiques
    }

    fn resolve_critique(
        &self,
        author: &ParticipantId,
        draft: CritiqueDraft,
        proposals: &[Proposal],
    ) -> Option<Critique> {
        let Some(target) = self.roster.resolve(&draft.target) else {
            warn!(%author, target = %draft.target, "Dropping critique with unresolved target");
            return None;
        };
        if !proposals.iter().any(|p| p.participant == target) {
            warn!(%author, %target, "Dropping critique of a participant without a proposal");
            return None;
        }
        Some(Critique {
            author: author.clone(),
            target,
            critique: draft.critique,
            risks: draft.risks,
            conflicts: draft.conflicts,
        })
    }

    async fn revise_phase(
        &self,
        phases: &PhaseOrchestrator,
        guard: &GuardrailEngine,
        ctx: &SharedContext,
        run: &mut RunState,
        critiques: Vec<Critique>,
    ) -> Vec<Proposal> {
        let proposers = self.proposers(&run.proposals);
        let mut inbox: HashMap<ParticipantId, (Proposal, Vec<Critique>)> = run
            .proposals
            .iter()
            .map(|p| (p.participant.clone(), (p.clone(), Vec::new())))
            .collect();
        for c in critiques {
            if let Some((_, received)) = inbox.get_mut(&c.target) {
                received.push(c);
            }
        }
        let inbox = Arc::new(inbox);

        let report = phases
            .run_phase(
                DebatePhase::Revise,
                &proposers,
                guard.clip(self.config.per_call_timeout()),
                {
                    let ctx = ctx.clone();
                    move |id, agent| {
                        let ctx = ctx.clone();
                        let inbox = inbox.clone();
                        async move {
                            let (own, received) = inbox
                                .get(&id)
                                .ok_or_else(|| format!("no proposal on record for {id}"))?;
                            let draft = agent
                                .revise(own, received, &ctx)
                                .await
                                .map_err(|e| e.to_string())?;
                            Proposal::from_draft(id, draft).map_err(|e| e.to_string())
                        }
                        .boxed()
                    }
                },
            )
            .await;
        run.faults.extend(report.faults());

        let mut revised: HashMap<ParticipantId, Proposal> =
            report.into_successes().into_iter().collect();
        run.proposals
            .iter()
            .map(|original| {
                revised.remove(&original.participant).unwrap_or_else(|| {
                    warn!(
                        participant = %original.participant,
                        "Revision failed, keeping original proposal"
                    );
                    original.clone()
                })
            })
            .collect()
    }

    async fn vote_phase(
        &self,
        phases: &PhaseOrchestrator,
        guard: &GuardrailEngine,
        ctx: &SharedContext,
        run: &mut RunState,
        candidates: &[Proposal],
    ) -> Vec<Ballot> {
        let shared = Arc::new(candidates.to_vec());
        let report = phases
            .run_phase(
                DebatePhase::Vote,
                &self.participants,
                guard.clip(self.config.per_call_timeout()),
                {
                    let ctx = ctx.clone();
                    move |_id, agent| {
                        let ctx = ctx.clone();
                        let candidates = shared.clone();
                        async move {
                            agent
                                .vote(&candidates, &ctx)
                                .await
                                .map_err(|e| e.to_string())
                        }
                        .boxed()
                    }
                },
            )
            .await;
        run.faults.extend(report.faults());

        let candidate_ids: Vec<ParticipantId> =
            candidates.iter().map(|p| p.participant.clone()).collect();
        let mut ballots = Vec::new();
        for (voter, draft) in report.into_successes() {
            match self.resolve_ballot(&voter, draft, &candidate_ids) {
                Ok(b) => ballots.push(b),
                Err(rejected) => run.rejected_ballots.push(rejected),
            }
        }
        ballots
    }

    fn resolve_ballot(
        &self,
        voter: &ParticipantId,
        draft: BallotDraft,
        candidates: &[ParticipantId],
    ) -> Result<Ballot, RejectedBallot> {
        Ballot::from_draft(voter.clone(), draft, candidates, &self.roster).map_err(|reason| {
            warn!(%voter, %reason, "Rejecting ballot");
            RejectedBallot {
                voter: voter.clone(),
                reason: reason.to_string(),
            }
        })
    }

    fn proposers(&self, proposals: &[Proposal]) -> Vec<Participant> {
        self.participants
            .iter()
            .filter(|p| proposals.iter().any(|x| x.participant == p.id))
            .cloned()
            .collect()
    }

    async fn finalize(
        &self,
        ctx: &MarketContext,
        candidates: &[Proposal],
        ranked: &[ParticipantId],
    ) -> FinalDecision {
        let ordered: Vec<Proposal> = ranked
            .iter()
            .filter_map(|id| candidates.iter().find(|p| &p.participant == id).cloned())
            .collect();
        DecisionFinalizer::new(self.venue.clone(), self.config.venue_timeout())
            .finalize(&ordered, ctx)
            .await
    }

    /// End the run in `FailedQuorum` or `DeadlineExceeded` with a HOLD.
    fn abort(
        &self,
        mut run: RunState,
        guard: &GuardrailEngine,
        outcome: GuardrailOutcome,
        phase: DebatePhase,
    ) -> DebateOutput {
        let (terminal, path) = match outcome.terminal_phase() {
            Some(DebatePhase::DeadlineExceeded) => {
                (DebatePhase::DeadlineExceeded, DecisionPath::DeadlineExceeded)
            }
            _ => (DebatePhase::FailedQuorum, DecisionPath::QuorumFailed),
        };
        let reason = match outcome.fault(phase) {
            Some(fault) => {
                let reason = fault.to_string();
                run.faults.push(fault);
                reason
            }
            None => outcome.to_string(),
        };
        warn!(run_id = %run.run_id(), %phase, %reason, "Debate aborted, holding");
        run.advance(terminal, &reason);
        self.conclude(run, guard, FinalDecision::hold(&reason), path)
    }

    fn conclude(
        &self,
        mut run: RunState,
        guard: &GuardrailEngine,
        decision: FinalDecision,
        path: DecisionPath,
    ) -> DebateOutput {
        if !run.session.is_complete() {
            run.advance(DebatePhase::Done, "decision finalized");
        }
        run.faults.extend(decision.faults);

        let consensus_type = run
            .consensus
            .as_ref()
            .map(|c| c.consensus_type)
            .unwrap_or(ConsensusType::None);
        let (vote_scores, voting_matrix) = match run.tally {
            Some(report) => (Some(report.scores), Some(report.matrix)),
            None => (None, None),
        };

        let output = DebateOutput {
            run_id: run.session.id.clone(),
            actions: decision.actions,
            plan: decision.plan,
            reasoning: decision.reasoning,
            metadata: DebateMetadata {
                selected_participant: decision.selected,
                consensus_type,
                path,
                variant: self.config.variant,
                elapsed_ms: guard.elapsed().as_millis() as u64,
                started_at: run.started_at,
                finished_at: Utc::now(),
                vote_scores,
                voting_matrix,
                tie_break: run.tie_break,
                proposals: run.proposals,
                revised_proposals: run.revised,
                execution_results: decision.execution_results,
                rejected_ballots: run.rejected_ballots,
                validation_rejections: decision.validation_rejections,
                faults: run.faults,
                transitions: run.session.transitions,
            },
        };

        info!(run_id = %output.run_id, "{}", output.summary_line());
        self.bus.publish(DebateEvent::FinalDecision {
            run_id: output.run_id.clone(),
            output: Box::new(output.clone()),
            timestamp: Utc::now(),
        });
        output
    }
}

//! Phase Orchestrator: one fan-out/fan-in over every participant.
//!
//! ```text
//! phase_start
//!   model_start × N            (in roster order, before any call runs)
//!   tokio::spawn(call_i)       (the participant's work, detached)
//!   JoinSet::spawn(race_i)     (timeout(call_i) → one terminal event)
//! join_next until all N settle → outcomes in roster order
//! ```
//!
//! A timed-out call is not aborted. Its task keeps running and whatever it
//! eventually returns is dropped with the handle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::agent::DebateAgent;
use super::output::DebateFault;
use super::roster::ParticipantId;
use super::state::DebatePhase;
use crate::events::{DebateEvent, SharedEventBus};

/// Settlement of one participant call.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome<T> {
    Success(T),
    Timeout,
    Error(String),
}

impl<T> PhaseOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Timeout => "timeout",
            Self::Error(_) => "error",
        }
    }
}

/// One participant's settled call.
#[derive(Debug, Clone)]
pub struct Settlement<T> {
    pub participant: ParticipantId,
    pub outcome: PhaseOutcome<T>,
    pub elapsed_ms: u64,
}

/// All settlements of a phase, in roster order.
#[derive(Debug, Clone)]
pub struct PhaseReport<T> {
    pub phase: DebatePhase,
    pub settlements: Vec<Settlement<T>>,
}

impl<T> PhaseReport<T> {
    pub fn success_count(&self) -> usize {
        self.settlements
            .iter()
            .filter(|s| s.outcome.is_success())
            .count()
    }

    pub fn into_successes(self) -> Vec<(ParticipantId, T)> {
        self.settlements
            .into_iter()
            .filter_map(|s| match s.outcome {
                PhaseOutcome::Success(v) => Some((s.participant, v)),
                _ => None,
            })
            .collect()
    }

    /// Faults for every participant that did not succeed.
    pub fn faults(&self) -> Vec<DebateFault> {
        self.settlements
            .iter()
            .filter_map(|s| match &s.outcome {
                PhaseOutcome::Success(_) => None,
                PhaseOutcome::Timeout => Some(DebateFault::ParticipantTimeout {
                    participant: s.participant.clone(),
                    phase: self.phase,
                }),
                PhaseOutcome::Error(reason) => Some(DebateFault::ParticipantError {
                    participant: s.participant.clone(),
                    phase: self.phase,
                    reason: reason.clone(),
                }),
            })
            .collect()
    }
}

/// A roster identity bound to the adapter that answers for it.
#[derive(Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub agent: Arc<dyn DebateAgent>,
}

impl Participant {
    pub fn new(id: ParticipantId, agent: Arc<dyn DebateAgent>) -> Self {
        Self { id, agent }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant").field("id", &self.id).finish()
    }
}

/// Drives fan-out phases for one run and reports progress on the bus.
pub struct PhaseOrchestrator {
    run_id: String,
    bus: SharedEventBus,
}

impl PhaseOrchestrator {
    pub fn new(run_id: &str, bus: SharedEventBus) -> Self {
        Self {
            run_id: run_id.to_string(),
            bus,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Invoke every participant concurrently and join all outcomes.
    ///
    /// `invoke` receives the roster identity and the adapter and must
    /// return an owned future; an `Err` from it settles as `Error`.
    pub async fn run_phase<T, F>(
        &self,
        phase: DebatePhase,
        participants: &[Participant],
        timeout: Duration,
        invoke: F,
    ) -> PhaseReport<T>
    where
        T: Serialize + Send + 'static,
        F: Fn(ParticipantId, Arc<dyn DebateAgent>) -> BoxFuture<'static, Result<T, String>>,
    {
        let timeout_ms = timeout.as_millis() as u64;
        info!(
            run_id = %self.run_id,
            %phase,
            participants = participants.len(),
            timeout_ms,
            "Phase started"
        );
        self.bus.publish(DebateEvent::PhaseStart {
            run_id: self.run_id.clone(),
            phase,
            participants: participants.len(),
            timestamp: Utc::now(),
        });

        let mut join_set: JoinSet<(usize, Settlement<T>)> = JoinSet::new();

        for (idx, participant) in participants.iter().enumerate() {
            let id = participant.id.clone();
            self.bus.publish(DebateEvent::ModelStart {
                run_id: self.run_id.clone(),
                participant: id.clone(),
                phase,
                timestamp: Utc::now(),
            });

            let call = tokio::spawn(invoke(id.clone(), participant.agent.clone()));
            let bus = self.bus.clone();
            let run_id = self.run_id.clone();

            join_set.spawn(async move {
                let start = Instant::now();
                let raced = tokio::time::timeout(timeout, call).await;
                let elapsed_ms = start.elapsed().as_millis() as u64;

                let outcome = match raced {
                    Ok(Ok(Ok(value))) => PhaseOutcome::Success(value),
                    Ok(Ok(Err(reason))) => PhaseOutcome::Error(reason),
                    Ok(Err(join_err)) => {
                        PhaseOutcome::Error(format!("participant task failed: {join_err}"))
                    }
                    Err(_) => PhaseOutcome::Timeout,
                };

                let event = match &outcome {
                    PhaseOutcome::Success(value) => DebateEvent::ModelComplete {
                        run_id,
                        participant: id.clone(),
                        phase,
                        payload: serde_json::to_value(value).unwrap_or_default(),
                        elapsed_ms,
                        timestamp: Utc::now(),
                    },
                    PhaseOutcome::Error(reason) => {
                        warn!(participant = %id, %phase, %reason, "Participant failed");
                        DebateEvent::ModelError {
                            run_id,
                            participant: id.clone(),
                            phase,
                            reason: reason.clone(),
                            elapsed_ms,
                            timestamp: Utc::now(),
                        }
                    }
                    PhaseOutcome::Timeout => {
                        warn!(participant = %id, %phase, timeout_ms, "Participant timed out");
                        DebateEvent::ModelTimeout {
                            run_id,
                            participant: id.clone(),
                            phase,
                            timeout_ms,
                            timestamp: Utc::now(),
                        }
                    }
                };
                bus.publish(event);

                (
                    idx,
                    Settlement {
                        participant: id,
                        outcome,
                        elapsed_ms,
                    },
                )
            });
        }

        let mut slots: Vec<Option<Settlement<T>>> =
            std::iter::repeat_with(|| None).take(participants.len()).collect();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, settlement)) => {
                    debug!(
                        participant = %settlement.participant,
                        %phase,
                        outcome = settlement.outcome.label(),
                        elapsed_ms = settlement.elapsed_ms,
                        "Participant settled"
                    );
                    slots[idx] = Some(settlement);
                }
                Err(e) => warn!(%phase, "Settlement task panicked: {}", e),
            }
        }

        let settlements: Vec<Settlement<T>> = slots
            .into_iter()
            .zip(participants)
            .map(|(slot, p)| {
                slot.unwrap_or_else(|| Settlement {
                    participant: p.id.clone(),
                    outcome: PhaseOutcome::Error("settlement lost".to_string()),
                    elapsed_ms: 0,
                })
            })
            .collect();

        let report = PhaseReport {
            phase,
            settlements,
        };
        info!(
            run_id = %self.run_id,
            %phase,
            succeeded = report.success_count(),
            total = participants.len(),
            "Phase complete"
        );
        report
    }
}

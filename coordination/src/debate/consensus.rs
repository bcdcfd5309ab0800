//! Early-agreement detection over a settled proposal set.
//!
//! A strict majority of proposals sharing a normalised action is consensus.
//! The quantity tolerance check is informative only and never blocks it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::action::NormalizedAction;
use super::proposal::Proposal;
use super::roster::ParticipantId;

/// Kind of agreement found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusType {
    Unanimous,
    Majority,
    None,
}

impl std::fmt::Display for ConsensusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unanimous => write!(f, "unanimous"),
            Self::Majority => write!(f, "majority"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Result of one consensus check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub reached: bool,
    pub consensus_type: ConsensusType,
    /// Agreed normalised action.
    pub action: Option<NormalizedAction>,
    /// Median quantity over the agreeing proposals.
    pub median_quantity: Option<f64>,
    /// Spread of the agreeing quantities is within the configured tolerance.
    pub within_tolerance: bool,
    /// Identities of the agreeing participants.
    pub participants: Vec<ParticipantId>,
}

impl ConsensusResult {
    pub fn none() -> Self {
        Self {
            reached: false,
            consensus_type: ConsensusType::None,
            action: None,
            median_quantity: None,
            within_tolerance: false,
            participants: Vec::new(),
        }
    }

    /// Agreeing proposals ordered by distance from the median, then identity.
    pub fn ranked_candidates(&self, proposals: &[Proposal]) -> Vec<ParticipantId> {
        let median = self.median_quantity.unwrap_or(0.0);
        let mut agreeing: Vec<&Proposal> = proposals
            .iter()
            .filter(|p| self.participants.contains(&p.participant))
            .collect();
        agreeing.sort_by(|a, b| {
            (a.quantity - median)
                .abs()
                .total_cmp(&(b.quantity - median).abs())
                .then_with(|| a.participant.cmp(&b.participant))
        });
        agreeing.into_iter().map(|p| p.participant.clone()).collect()
    }
}

/// Consensus checker with a quantity tolerance in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsensusChecker {
    pub tolerance_pct: f64,
}

impl Default for ConsensusChecker {
    fn default() -> Self {
        Self {
            tolerance_pct: 30.0,
        }
    }
}

impl ConsensusChecker {
    pub fn new(tolerance_pct: f64) -> Self {
        Self { tolerance_pct }
    }

    /// Inspect a proposal set for a strict-majority normalised action.
    pub fn check(&self, proposals: &[Proposal]) -> ConsensusResult {
        let n = proposals.len();
        if n == 0 {
            return ConsensusResult::none();
        }

        let mut groups: BTreeMap<NormalizedAction, Vec<&Proposal>> = BTreeMap::new();
        for p in proposals {
            groups.entry(p.normalized).or_default().push(p);
        }

        let threshold = n / 2 + 1;
        let Some((&action, group)) = groups.iter().find(|(_, g)| g.len() >= threshold) else {
            debug!(proposals = n, groups = groups.len(), "No consensus");
            return ConsensusResult::none();
        };

        let consensus_type = if group.len() == n {
            ConsensusType::Unanimous
        } else {
            ConsensusType::Majority
        };
        let quantities: Vec<f64> = group.iter().map(|p| p.quantity).collect();
        let median_quantity = median(&quantities);
        let within_tolerance = within_tolerance(&quantities, self.tolerance_pct);

        debug!(
            %action,
            %consensus_type,
            agreeing = group.len(),
            proposals = n,
            within_tolerance,
            "Consensus found"
        );

        ConsensusResult {
            reached: true,
            consensus_type,
            action: Some(action),
            median_quantity,
            within_tolerance,
            participants: group.iter().map(|p| p.participant.clone()).collect(),
        }
    }
}

/// Median of a set; even counts average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// `(max - min) / ((max + min) / 2) * 100 <= pct`.
///
/// With a zero average the spread is only in tolerance when all values match.
pub fn within_tolerance(values: &[f64], pct: f64) -> bool {
    let Some(max) = values.iter().copied().reduce(f64::max) else {
        return false;
    };
    let min = values.iter().copied().fold(max, f64::min);
    let avg = (max + min) / 2.0;
    if avg == 0.0 {
        return max == min;
    }
    (max - min) / avg * 100.0 <= pct
}

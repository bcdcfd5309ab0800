//! Ranked-ballot voting with deterministic, conservative tie-breaking.
//!
//! Every ballot must rank all K candidates with unique ranks 1..K. A ballot
//! that does not is excluded as a whole; it never contributes partial points.
//! Rank r earns `K + 1 - r` points.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::action::NormalizedAction;
use super::proposal::Proposal;
use super::roster::{ParticipantId, Roster};

/// One ranking entry as returned by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankEntry {
    /// Free-text name of the candidate's author.
    pub candidate: String,
    /// 1 = most preferred.
    pub rank: u32,
}

/// Wire payload for the vote phase.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BallotDraft {
    pub rankings: Vec<RankEntry>,
    #[serde(default)]
    pub reasoning: String,
}

impl BallotDraft {
    /// Build a draft ranking candidates in the given order.
    pub fn ranked(order: &[&str]) -> Self {
        Self {
            rankings: order
                .iter()
                .enumerate()
                .map(|(i, c)| RankEntry {
                    candidate: (*c).to_string(),
                    rank: i as u32 + 1,
                })
                .collect(),
            reasoning: String::new(),
        }
    }
}

/// Why a ballot was excluded from the tally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotRejection {
    #[error("candidate '{0}' does not resolve to a roster participant")]
    UnresolvedCandidate(String),

    #[error("'{0}' is not a candidate in this vote")]
    NotACandidate(ParticipantId),

    #[error("candidate {0} ranked more than once")]
    DuplicateCandidate(ParticipantId),

    #[error("candidate {0} not ranked")]
    MissingCandidate(ParticipantId),

    #[error("rank {rank} outside 1..={candidates}")]
    RankOutOfRange { rank: u32, candidates: usize },

    #[error("rank {0} used more than once")]
    DuplicateRank(u32),
}

/// A ballot with every candidate resolved to a roster identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter: ParticipantId,
    pub ranks: BTreeMap<ParticipantId, u32>,
    #[serde(default)]
    pub reasoning: String,
}

impl Ballot {
    /// Resolve a draft against the roster and check it covers `candidates`.
    pub fn from_draft(
        voter: ParticipantId,
        draft: BallotDraft,
        candidates: &[ParticipantId],
        roster: &Roster,
    ) -> Result<Self, BallotRejection> {
        let mut ranks = BTreeMap::new();
        for entry in &draft.rankings {
            let id = roster
                .resolve(&entry.candidate)
                .ok_or_else(|| BallotRejection::UnresolvedCandidate(entry.candidate.clone()))?;
            if ranks.insert(id.clone(), entry.rank).is_some() {
                return Err(BallotRejection::DuplicateCandidate(id));
            }
        }
        let ballot = Self {
            voter,
            ranks,
            reasoning: draft.reasoning,
        };
        ballot.check_complete(candidates)?;
        Ok(ballot)
    }

    /// Verify the ballot ranks exactly `candidates` with unique ranks 1..=K.
    pub fn check_complete(&self, candidates: &[ParticipantId]) -> Result<(), BallotRejection> {
        let k = candidates.len();
        let expected: BTreeSet<&ParticipantId> = candidates.iter().collect();

        if let Some(extra) = self.ranks.keys().find(|c| !expected.contains(c)) {
            return Err(BallotRejection::NotACandidate(extra.clone()));
        }
        if let Some(missing) = candidates.iter().find(|c| !self.ranks.contains_key(*c)) {
            return Err(BallotRejection::MissingCandidate(missing.clone()));
        }

        let mut seen = BTreeSet::new();
        for &rank in self.ranks.values() {
            if rank == 0 || rank as usize > k {
                return Err(BallotRejection::RankOutOfRange {
                    rank,
                    candidates: k,
                });
            }
            if !seen.insert(rank) {
                return Err(BallotRejection::DuplicateRank(rank));
            }
        }
        Ok(())
    }
}

/// A ballot that was not counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedBallot {
    pub voter: ParticipantId,
    pub reason: String,
}

/// Accumulated result for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteScore {
    pub candidate: ParticipantId,
    pub score: u32,
    pub first_place: u32,
}

/// voter → candidate → rank, for counted ballots only.
pub type VotingMatrix = BTreeMap<ParticipantId, BTreeMap<ParticipantId, u32>>;

/// Full tally output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyReport {
    /// Sorted: score desc, first places desc, identity asc.
    pub scores: Vec<VoteScore>,
    pub matrix: VotingMatrix,
    pub rejected: Vec<RejectedBallot>,
}

impl TallyReport {
    /// Number of ballots that were counted.
    pub fn counted(&self) -> usize {
        self.matrix.len()
    }

    /// Candidates sharing the top score, in tally order.
    pub fn top_tied(&self) -> Vec<ParticipantId> {
        let Some(top) = self.scores.first().map(|s| s.score) else {
            return Vec::new();
        };
        self.scores
            .iter()
            .take_while(|s| s.score == top)
            .map(|s| s.candidate.clone())
            .collect()
    }
}

/// Score all valid ballots over `candidates`.
pub fn tally(ballots: &[Ballot], candidates: &[ParticipantId]) -> TallyReport {
    let k = candidates.len() as u32;
    let mut totals: BTreeMap<ParticipantId, (u32, u32)> =
        candidates.iter().map(|c| (c.clone(), (0, 0))).collect();
    let mut report = TallyReport::default();

    for ballot in ballots {
        if let Err(reason) = ballot.check_complete(candidates) {
            warn!(voter = %ballot.voter, %reason, "Excluding malformed ballot");
            report.rejected.push(RejectedBallot {
                voter: ballot.voter.clone(),
                reason: reason.to_string(),
            });
            continue;
        }
        if report.matrix.contains_key(&ballot.voter) {
            report.rejected.push(RejectedBallot {
                voter: ballot.voter.clone(),
                reason: "voter already cast a ballot".to_string(),
            });
            continue;
        }
        for (candidate, &rank) in &ballot.ranks {
            if let Some(entry) = totals.get_mut(candidate) {
                entry.0 += k + 1 - rank;
                if rank == 1 {
                    entry.1 += 1;
                }
            }
        }
        report
            .matrix
            .insert(ballot.voter.clone(), ballot.ranks.clone());
    }

    let mut scores: Vec<VoteScore> = totals
        .into_iter()
        .map(|(candidate, (score, first_place))| VoteScore {
            candidate,
            score,
            first_place,
        })
        .collect();
    sort_scores(&mut scores);

    debug!(
        candidates = candidates.len(),
        counted = report.matrix.len(),
        rejected = report.rejected.len(),
        "Tally complete"
    );
    report.scores = scores;
    report
}

/// Total order: score desc, first places desc, identity asc.
pub fn sort_scores(scores: &mut [VoteScore]) {
    scores.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.first_place.cmp(&a.first_place))
            .then(a.candidate.cmp(&b.candidate))
    });
}

/// Which rule picked the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakRule {
    /// Top score was not shared.
    Uncontested,
    /// A tied candidate proposed HOLD.
    PreferHold,
    /// Smallest quantity among tied limit-order candidates.
    SmallestLimit,
    /// Smallest quantity among all tied candidates.
    SmallestQuantity,
}

impl std::fmt::Display for TieBreakRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uncontested => write!(f, "uncontested"),
            Self::PreferHold => write!(f, "prefer_hold"),
            Self::SmallestLimit => write!(f, "smallest_limit"),
            Self::SmallestQuantity => write!(f, "smallest_quantity"),
        }
    }
}

/// Winner selection after tie-break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreak {
    pub winner: ParticipantId,
    pub tied: Vec<ParticipantId>,
    pub rule: TieBreakRule,
}

/// Resolve a shared top score with the capital-minimising policy.
///
/// HOLD wins outright; else the smallest limit order; else the smallest
/// quantity. Remaining ties keep tally order.
pub fn tie_break(report: &TallyReport, proposals: &[Proposal]) -> Option<TieBreak> {
    let tied = report.top_tied();
    let first = tied.first()?.clone();
    if tied.len() == 1 {
        return Some(TieBreak {
            winner: first,
            tied,
            rule: TieBreakRule::Uncontested,
        });
    }

    let lookup = |id: &ParticipantId| proposals.iter().find(|p| &p.participant == id);
    let tied_proposals: Vec<&Proposal> = tied.iter().filter_map(|id| lookup(id)).collect();

    let smallest = |candidates: &[&Proposal]| -> Option<ParticipantId> {
        candidates
            .iter()
            .min_by(|a, b| a.quantity.total_cmp(&b.quantity))
            .map(|p| p.participant.clone())
    };

    let (winner, rule) = if let Some(hold) = tied_proposals
        .iter()
        .find(|p| p.normalized == NormalizedAction::Hold)
    {
        (hold.participant.clone(), TieBreakRule::PreferHold)
    } else {
        let limits: Vec<&Proposal> = tied_proposals
            .iter()
            .copied()
            .filter(|p| p.is_limit())
            .collect();
        if let Some(w) = smallest(&limits) {
            (w, TieBreakRule::SmallestLimit)
        } else if let Some(w) = smallest(&tied_proposals) {
            (w, TieBreakRule::SmallestQuantity)
        } else {
            (first, TieBreakRule::SmallestQuantity)
        }
    };

    Some(TieBreak { winner, tied, rule })
}

/// Finalisation order: the tie-break winner, then everyone else in tally order.
pub fn ranked_candidates(report: &TallyReport, winner: &ParticipantId) -> Vec<ParticipantId> {
    std::iter::once(winner.clone())
        .chain(
            report
                .scores
                .iter()
                .map(|s| s.candidate.clone())
                .filter(|c| c != winner),
        )
        .collect()
}

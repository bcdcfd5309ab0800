//! Participant roster and free-text identity resolution.
//!
//! Agents refer to each other (ballot candidates, critique targets) by
//! whatever name their backing model chooses to echo, which is frequently a
//! vendor model name rather than the roster identity. Every such reference is
//! resolved against the fixed roster before it is counted.

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Canonical identity of a debate participant.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One roster member with the alternative names it may be referred to by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: ParticipantId,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RosterEntry {
    pub fn new(id: &str) -> Self {
        Self {
            id: ParticipantId::new(id),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }
}

/// The fixed set of participants for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static pattern"))
}

/// Lowercase and strip everything that is not an ASCII letter or digit.
pub fn canonicalize(name: &str) -> String {
    separators()
        .replace_all(&name.to_lowercase(), "")
        .into_owned()
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a free-text name to a roster identity.
    ///
    /// Exact canonical match on id or alias first; otherwise a containment
    /// match. When several participants are contained, the one with the
    /// longest matching name wins, provided every other match is nested
    /// inside it (`gpt` within `gpt-mini`). Anything ambiguous or unknown is
    /// `None`.
    pub fn resolve(&self, name: &str) -> Option<ParticipantId> {
        let needle = canonicalize(name);
        if needle.is_empty() {
            return None;
        }

        for entry in &self.entries {
            if Self::names(entry).any(|n| n == needle) {
                return Some(entry.id.clone());
            }
        }

        let hits: Vec<(&RosterEntry, String)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                Self::names(entry)
                    .filter(|n| !n.is_empty() && (needle.contains(n) || n.contains(&needle)))
                    .max_by_key(|n| n.len())
                    .map(|n| (entry, n))
            })
            .collect();

        let (best, best_name) = hits.iter().max_by_key(|(_, n)| n.len())?;
        let nested = hits
            .iter()
            .filter(|(e, _)| e.id != best.id)
            .all(|(_, n)| n.len() < best_name.len() && best_name.contains(n.as_str()));
        nested.then(|| best.id.clone())
    }

    fn names(entry: &RosterEntry) -> impl Iterator<Item = String> + '_ {
        std::iter::once(canonicalize(entry.id.as_str()))
            .chain(entry.aliases.iter().map(|a| canonicalize(a)))
    }

    /// Duplicate canonical names across entries, if any.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashMap::new();
        let mut dups = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            for name in Self::names(entry) {
                if let Some(prev) = seen.insert(name.clone(), idx) {
                    if prev != idx && !dups.contains(&name) {
                        dups.push(name);
                    }
                }
            }
        }
        dups
    }
}

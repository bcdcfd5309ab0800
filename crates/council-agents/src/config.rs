use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use coordination::debate::{DebateConfig, Roster, RosterEntry};
use serde::Deserialize;

use crate::paper::RiskLimits;

/// One `[[participants]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantConfig {
    pub id: String,
    /// Other names the participant may be referred to by in ballots and critiques.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Where run results go.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Append-only JSONL file receiving one line per run.
    pub path: Option<PathBuf>,
    /// Print events to stdout as they are published.
    pub print_events: bool,
}

/// Top-level council configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CouncilConfig {
    #[serde(default)]
    pub debate: DebateConfig,
    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub output: OutputConfig,
}

impl CouncilConfig {
    /// Parse TOML without applying the environment or validating.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse council config")
    }

    /// Read a TOML file, apply `COUNCIL_*` environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`; values found there win over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("COUNCIL_VARIANT") {
            self.debate.variant = v
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("COUNCIL_VARIANT")?;
        }
        if let Some(v) = lookup("COUNCIL_MIN_QUORUM") {
            self.debate.min_quorum = v.trim().parse().context("COUNCIL_MIN_QUORUM")?;
        }
        if let Some(v) = lookup("COUNCIL_PER_CALL_TIMEOUT_MS") {
            self.debate.per_call_timeout_ms =
                v.trim().parse().context("COUNCIL_PER_CALL_TIMEOUT_MS")?;
        }
        if let Some(v) = lookup("COUNCIL_DEBATE_TIMEOUT_MS") {
            self.debate.debate_timeout_ms =
                v.trim().parse().context("COUNCIL_DEBATE_TIMEOUT_MS")?;
        }
        if let Some(v) = lookup("COUNCIL_OUTPUT_PATH") {
            self.output.path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.participants.is_empty() {
            bail!("config has no participants");
        }
        let mut seen = HashSet::new();
        for p in &self.participants {
            if p.id.trim().is_empty() {
                bail!("participant with empty id");
            }
            if !seen.insert(p.id.as_str()) {
                bail!("duplicate participant id '{}'", p.id);
            }
        }
        let duplicates = self.roster().duplicate_names();
        if !duplicates.is_empty() {
            bail!(
                "participant names collide after normalisation: {}",
                duplicates.join(", ")
            );
        }
        if self.debate.min_quorum > self.participants.len() {
            bail!(
                "min_quorum {} exceeds the {} configured participants",
                self.debate.min_quorum,
                self.participants.len()
            );
        }
        self.debate.validate().context("Invalid [debate] section")?;
        Ok(())
    }

    pub fn roster(&self) -> Roster {
        Roster::new(
            self.participants
                .iter()
                .map(|p| {
                    p.aliases
                        .iter()
                        .fold(RosterEntry::new(&p.id), |entry, alias| entry.with_alias(alias))
                })
                .collect(),
        )
    }
}

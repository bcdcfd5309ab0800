//! Run recording for offline analysis.
//!
//! Every finished run is appended to a JSONL file (one complete
//! `DebateOutput` per line). `RunLog` reads such a file back and aggregates
//! it.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use coordination::debate::{DebateOutput, DecisionPath};
use serde::Serialize;
use tracing::{info, warn};

/// Appends finished runs to a JSONL file.
#[derive(Debug, Clone)]
pub struct RunRecorder {
    path: PathBuf,
}

impl RunRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one run. Failures are logged and otherwise ignored.
    pub fn record(&self, output: &DebateOutput) {
        if let Err(e) = self.try_record(output) {
            warn!(path = %self.path.display(), "Failed to record run: {e}");
        }
    }

    pub fn try_record(&self, output: &DebateOutput) -> std::io::Result<()> {
        let json = serde_json::to_string(output)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        info!(path = %self.path.display(), run_id = %output.run_id, "Recorded run");
        Ok(())
    }
}

/// Aggregate figures over recorded runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub holds: usize,
    pub by_path: BTreeMap<String, usize>,
    pub faults: usize,
    pub mean_elapsed_ms: u64,
}

impl RunStats {
    pub fn summary(&self) -> String {
        let paths: Vec<String> = self
            .by_path
            .iter()
            .map(|(path, n)| format!("{path}={n}"))
            .collect();
        format!(
            "{} runs | {} holds | {} faults | mean {}ms | {}",
            self.total,
            self.holds,
            self.faults,
            self.mean_elapsed_ms,
            paths.join(" ")
        )
    }
}

/// Recorded runs loaded from a JSONL file.
pub struct RunLog {
    runs: Vec<DebateOutput>,
}

impl RunLog {
    pub fn read_from_file(path: &Path) -> std::io::Result<Self> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut runs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let run: DebateOutput = serde_json::from_str(&line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            runs.push(run);
        }
        Ok(Self { runs })
    }

    pub fn runs(&self) -> &[DebateOutput] {
        &self.runs
    }

    pub fn count_path(&self, path: DecisionPath) -> usize {
        self.runs
            .iter()
            .filter(|r| r.metadata.path == path)
            .count()
    }

    pub fn stats(&self) -> RunStats {
        if self.runs.is_empty() {
            return RunStats::default();
        }
        let mut stats = RunStats {
            total: self.runs.len(),
            ..RunStats::default()
        };
        let mut elapsed = 0u64;
        for run in &self.runs {
            if run.is_hold() {
                stats.holds += 1;
            }
            *stats
                .by_path
                .entry(run.metadata.path.to_string())
                .or_default() += 1;
            stats.faults += run.metadata.faults.len();
            elapsed += run.metadata.elapsed_ms;
        }
        stats.mean_elapsed_ms = elapsed / self.runs.len() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coordination::debate::{
        ConsensusType, DebateFault, DebateMetadata, DebatePhase, DebateVariant, TradeAction,
    };

    fn output(
        run_id: &str,
        path: DecisionPath,
        actions: Vec<TradeAction>,
        elapsed_ms: u64,
    ) -> DebateOutput {
        DebateOutput {
            run_id: run_id.to_string(),
            actions,
            plan: String::new(),
            reasoning: String::new(),
            metadata: DebateMetadata {
                selected_participant: None,
                consensus_type: ConsensusType::None,
                path,
                variant: DebateVariant::Lean,
                elapsed_ms,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                vote_scores: None,
                voting_matrix: None,
                tie_break: None,
                proposals: Vec::new(),
                revised_proposals: Vec::new(),
                execution_results: Vec::new(),
                rejected_ballots: Vec::new(),
                validation_rejections: Vec::new(),
                faults: Vec::new(),
                transitions: Vec::new(),
            },
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path().join("nested").join("runs.jsonl"));

        let mut failed = output(
            "r1",
            DecisionPath::QuorumFailed,
            vec![TradeAction::hold("q")],
            100,
        );
        failed.metadata.faults.push(DebateFault::InsufficientQuorum {
            phase: DebatePhase::Propose,
            received: 1,
            required: 2,
        });
        recorder.try_record(&failed).unwrap();
        recorder.record(&output(
            "r2",
            DecisionPath::Vote,
            vec![TradeAction::market_buy("BTCUSDT", 0.01)],
            300,
        ));

        let log = RunLog::read_from_file(recorder.path()).unwrap();
        assert_eq!(log.runs().len(), 2);
        assert_eq!(log.runs()[0].run_id, "r1");
        assert_eq!(log.count_path(DecisionPath::Vote), 1);

        let stats = log.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.holds, 1);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.mean_elapsed_ms, 200);
        assert!(stats.summary().starts_with("2 runs | 1 holds"));
    }

    #[test]
    fn test_corrupt_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        let err = RunLog::read_from_file(&path).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_log_stats() {
        let log = RunLog { runs: Vec::new() };
        assert_eq!(log.stats(), RunStats::default());
    }
}

//! Trade council runner.
//!
//! Loads a council configuration, binds participants to the debate
//! controller from `coordination`, executes decisions on a paper venue, and
//! records every run.

pub mod config;
pub mod council;
pub mod paper;
pub mod scripted;
pub mod telemetry;

pub use config::{CouncilConfig, OutputConfig, ParticipantConfig};
pub use council::Council;
pub use paper::{PaperVenue, RiskLimits};
pub use scripted::{Fixture, FixtureError, ParticipantScript, Scripted, ScriptedAgent};
pub use telemetry::{RunLog, RunRecorder, RunStats};

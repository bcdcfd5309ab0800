//! Wiring: configuration + participants + paper venue → one controller.

use std::sync::Arc;

use anyhow::{Context, Result};
use coordination::debate::{DebateAgent, DebateController, DebateOutput, MarketContext};
use coordination::events::SharedEventBus;
use tracing::info;

use crate::config::CouncilConfig;
use crate::paper::PaperVenue;
use crate::telemetry::RunRecorder;

/// A configured council ready to run debates.
pub struct Council {
    controller: DebateController,
    venue: Arc<PaperVenue>,
    recorder: Option<RunRecorder>,
}

impl Council {
    /// Bind `agents` to the configured roster on a paper venue.
    pub fn build(
        config: &CouncilConfig,
        agents: Vec<Arc<dyn DebateAgent>>,
        bus: SharedEventBus,
    ) -> Result<Self> {
        let venue = Arc::new(PaperVenue::new(config.risk.clone()));
        let controller = DebateController::new(
            config.debate.clone(),
            config.roster(),
            agents,
            venue.clone(),
        )
        .context("Failed to assemble council")?
        .with_event_bus(bus);

        info!(
            participants = config.participants.len(),
            variant = %config.debate.variant,
            min_quorum = config.debate.min_quorum,
            "Council assembled"
        );

        Ok(Self {
            controller,
            venue,
            recorder: config.output.path.clone().map(RunRecorder::new),
        })
    }

    pub fn venue(&self) -> &PaperVenue {
        &self.venue
    }

    pub fn controller(&self) -> &DebateController {
        &self.controller
    }

    /// Run one debate and record the result if an output path is configured.
    pub async fn run(&self, market: MarketContext) -> DebateOutput {
        let output = self.controller.run(market).await;
        if let Some(recorder) = &self.recorder {
            recorder.record(&output);
        }
        output
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use coordination::debate::{BallotDraft, CritiqueDraft, ProposalDraft};
use coordination::events::{DebateEvent, EventBus, EventBusExt, EventFilter, EVENT_TYPES};
use council_agents::{Council, CouncilConfig, Fixture, RunLog};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "council-agents", about = "Run a trade council debate")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one debate over a scripted fixture on the paper venue.
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        fixture: PathBuf,
        /// Print every event as a JSON line on stdout.
        #[arg(long)]
        events: bool,
        /// Only print these event types (comma separated).
        #[arg(
            long,
            value_delimiter = ',',
            value_parser = PossibleValuesParser::new(EVENT_TYPES.iter().copied())
        )]
        event_types: Vec<String>,
        /// Append the result to this JSONL file (overrides the config).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the JSON Schemas of the participant payloads.
    Schema,
    /// Summarise a JSONL file of recorded runs.
    Stats {
        #[arg(long)]
        log: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run {
            config,
            fixture,
            events,
            event_types,
            output,
        } => run(config, fixture, events, event_types, output).await,
        Command::Schema => schema(),
        Command::Stats { log } => stats(log),
    }
}

async fn run(
    config_path: PathBuf,
    fixture_path: PathBuf,
    events: bool,
    event_types: Vec<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = CouncilConfig::load(&config_path)?;
    if output.is_some() {
        config.output.path = output;
    }
    let fixture = Fixture::load(&fixture_path)
        .with_context(|| format!("Failed to load fixture {}", fixture_path.display()))?;

    let bus = EventBus::new().shared();
    let printer = if events || config.output.print_events {
        let types: Vec<&str> = event_types.iter().map(|s| s.as_str()).collect();
        let mut filter = EventFilter::new();
        if !types.is_empty() {
            filter = filter.types(types);
        }
        let mut rx = bus.subscribe_filtered(filter);
        let mut settled = bus.subscribe_filtered(EventFilter::new().types(vec!["final_decision"]));
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Ok(event) => print_event(&event),
                        Err(e) => {
                            warn!("Event stream ended: {e}");
                            break;
                        }
                    },
                    _ = settled.recv() => {
                        // Drain whatever is still buffered, then stop.
                        while let Ok(Some(event)) =
                            tokio::time::timeout(std::time::Duration::ZERO, rx.recv())
                                .await
                                .map(|r| r.ok())
                        {
                            print_event(&event);
                        }
                        break;
                    }
                }
            }
        }))
    } else {
        None
    };

    let council = Council::build(&config, fixture.agents(), bus)?;
    let result = council.run(fixture.market.clone()).await;

    if let Some(handle) = printer {
        handle.await.context("Event printer panicked")?;
    }

    info!("{}", result.summary_line());
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialise output")?
    );
    Ok(())
}

fn print_event(event: &DebateEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Failed to serialise event: {e}"),
    }
}

fn schema() -> Result<()> {
    let schemas = serde_json::json!({
        "proposal": schemars::schema_for!(ProposalDraft),
        "critique": schemars::schema_for!(CritiqueDraft),
        "ballot": schemars::schema_for!(BallotDraft),
    });
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}

fn stats(log: PathBuf) -> Result<()> {
    let runs = RunLog::read_from_file(&log)
        .with_context(|| format!("Failed to read run log {}", log.display()))?;
    println!("{}", runs.stats().summary());
    Ok(())
}

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use genesis_pipeline::{
    DirectivePipeline, DirectiveResult, PipelineConfig, PipelineTelemetry, ReportEntry,
};
use serde_json::json;
use shared_event_bus::{
    EventPublisher, EventRecord, EventSubscriber, FanoutPublisher, FileEventPublisher,
    MemoryEventBus,
};
use shared_logging::LogLevel;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "genesis", version, about = "Directive evaluation pipeline")]
struct Cli {
    /// Emit debug diagnostics on stderr.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluates one directive and prints the aggregate result.
    Run(RunArgs),
    /// Prints fresh planner and simulator reports.
    Reports(ConfigArgs),
    /// Loads and validates a configuration without running anything.
    CheckConfig(ConfigArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Reflective,
    Autonomous,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// TOML configuration file; overrides `--preset`.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Preset::Reflective)]
    preset: Preset,
}

impl ConfigArgs {
    /// Returns a validated configuration from the file or the preset.
    fn load(&self) -> Result<PipelineConfig> {
        if let Some(path) = &self.config {
            return PipelineConfig::load(path);
        }
        let config = match self.preset {
            Preset::Reflective => PipelineConfig::reflective(),
            Preset::Autonomous => PipelineConfig::autonomous(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directive text.
    directive: String,
    #[command(flatten)]
    config: ConfigArgs,
    /// Disables the veto so the decision executes without review.
    #[arg(long)]
    governance_override: bool,
    /// Prints the result as JSON.
    #[arg(long)]
    json: bool,
    /// Appends structured log records to this file.
    #[arg(long)]
    log_path: Option<PathBuf>,
    /// Appends pipeline events to this file as JSON lines.
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Prints the events emitted during the run after the result.
    #[arg(long)]
    show_events: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run(args) => handle_run(args),
        Commands::Reports(args) => {
            let pipeline = DirectivePipeline::new(args.load()?)?;
            let reports = pipeline.latest_reports();
            print_report("Planner", &reports.planner);
            print_report("Simulator", &reports.simulator);
            Ok(())
        }
        Commands::CheckConfig(args) => {
            let config = args.load()?;
            let summary = json!({
                "threshold_polarity": config.threshold_polarity.label(),
                "threshold": config.threshold,
                "values": config.value_names(),
                "goals": config.goal_names.len(),
                "vectors": config.vector_names.len(),
                "veto_enabled": config.veto_enabled,
                "external_call_timeout_ms": config.external_call_timeout_ms,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn handle_run(args: RunArgs) -> Result<()> {
    let config = args.config.load()?;

    let mut builder = PipelineTelemetry::builder("genesis");
    if let Some(path) = &args.log_path {
        builder = builder.log_path(path);
    }
    let bus = Arc::new(MemoryEventBus::default());
    let mut events = bus.subscribe();
    let mut fanout = FanoutPublisher::new();
    if args.show_events {
        fanout = fanout.with(bus.clone());
    }
    if let Some(path) = &args.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        fanout = fanout.with(Arc::new(publisher));
    }
    if !fanout.is_empty() {
        let publisher: Arc<dyn EventPublisher> = Arc::new(fanout);
        builder = builder.event_publisher(publisher);
    }
    let telemetry = builder.build().context("initialising telemetry")?;

    let pipeline = DirectivePipeline::builder(config)
        .telemetry(telemetry.clone())
        .build()?;
    if args.governance_override {
        tracing::warn!(directive = %args.directive, "governance veto disabled for this run");
        telemetry.log(
            LogLevel::Warn,
            "cli.governance_override",
            json!({ "veto_enabled": false }),
        )?;
        pipeline.set_governance_override(true);
    }

    let runtime = Runtime::new()?;
    let result = runtime.block_on(pipeline.process(&args.directive))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if args.show_events {
        let mut emitted: Vec<EventRecord> = Vec::new();
        while let Ok(event) = events.try_recv() {
            emitted.push(event);
        }
        if args.json {
            println!("{}", serde_json::to_string_pretty(&emitted)?);
        } else {
            println!("events:");
            for event in &emitted {
                println!("  {} {}", event.event_type, event.payload);
            }
        }
    }
    Ok(())
}

fn print_result(result: &DirectiveResult) {
    println!("{}", result.acknowledgement);
    println!(
        "belief: confidence {:.2}{}",
        result.belief.confidence,
        if result.belief.flagged { " (flagged)" } else { "" }
    );
    println!("score: {:.3}", result.evaluation.score);
    for (value, term) in &result.evaluation.contributions {
        println!("  {value}: {term:.3}");
    }
    println!("justification: {}", result.justification.explanation);
    if let Some(err) = &result.justification_error {
        println!("  ({err})");
    }
    for (value, weight) in &result.justification.adjusted_weights {
        println!("  {value} -> {weight:.2}");
    }
    print_report("Planner", &result.planner_report);
    print_report("Simulator", &result.simulator_report);
    println!("decision: {}", result.decision.status);
    if !result.decision.reviewers.is_empty() {
        println!("  reviewers: {}", result.decision.reviewers.join(", "));
    }
    for warning in &result.warnings {
        println!(
            "warning: {:?} {} received {} applied {}",
            warning.stage, warning.subject, warning.received, warning.applied
        );
    }
}

fn print_report(title: &str, report: &ReportEntry) {
    println!("{title}:");
    for (name, text) in &report.entries {
        println!("  {name}: {text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn presets_load_validated() {
        let args = ConfigArgs {
            config: None,
            preset: Preset::Autonomous,
        };
        let config = args.load().unwrap();
        assert!((config.default_confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn run_accepts_event_flags() {
        let cli = Cli::parse_from([
            "genesis",
            "run",
            "Expand outreach",
            "--preset",
            "autonomous",
            "--show-events",
            "--governance-override",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.show_events);
        assert!(args.governance_override);
        assert!(args.event_log.is_none());
    }
}

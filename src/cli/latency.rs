//! `latency` command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use log_bench_backends::BackendSession;
use log_bench_core::config::DEFAULT_REPORT_GRANULARITY;
use log_bench_core::{OrchestratorBuilder, StopCondition};
use log_bench_report::{
    corrected_output_path, default_output_name, write_corrected_distribution,
    write_latency_distribution, CsvExporter, JsonExporter,
};

use super::BackendArgs;

#[derive(Args, Debug)]
pub struct LatencyArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Aggregate requests per second across all connections (0 = unlimited)
    #[arg(short, long, default_value_t = 5000.0)]
    pub rate: f64,

    /// Payload size in bytes
    #[arg(long = "size", visible_alias = "sz", default_value_t = 2048)]
    pub size: usize,

    /// How long to run
    #[arg(short, long, value_parser = humantime::parse_duration, default_value = "15s")]
    pub duration: Duration,

    /// Concurrent connections, one worker each
    #[arg(short, long, default_value_t = 1)]
    pub connections: usize,

    /// Quantile ticks per half-distance in the distribution file
    #[arg(long, default_value_t = DEFAULT_REPORT_GRANULARITY)]
    pub granularity: u32,

    /// Distribution file (default: <system>_<rate>_<size>.txt)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write the percentile table as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Also write run totals and headline latencies as CSV
    #[arg(long)]
    pub csv_summary: Option<PathBuf>,

    /// Also write the summary and derived figures as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Idle this long after the run before exiting
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    pub drain: Duration,
}

pub async fn run(args: LatencyArgs) -> Result<()> {
    let system = args.backend.system;
    let session = BackendSession::open(args.backend.into_config(args.size))
        .context("failed to open backend")?;
    let factory = session
        .requester_factory()
        .context("failed to create requester factory")?;

    let orchestrator = OrchestratorBuilder::new()
        .factory(factory)
        .connections(args.connections)
        .rate_limit(Some(args.rate))
        .stop_condition(StopCondition::Duration(args.duration))
        .report_granularity(args.granularity)
        .drain(args.drain)
        .build()
        .context("invalid latency configuration")?;

    tracing::info!(
        system = %system,
        rate = args.rate,
        size = args.size,
        connections = args.connections,
        duration = %humantime::format_duration(args.duration),
        "Starting latency benchmark"
    );

    let summary = orchestrator
        .run_with_signal_handling()
        .await
        .context("latency benchmark failed")?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(default_output_name(system.id(), args.rate, args.size)));
    write_latency_distribution(&summary, &output)
        .context("failed to write latency distribution")?;
    let corrected_output = corrected_output_path(&output);
    let wrote_corrected = write_corrected_distribution(&summary, &corrected_output)
        .context("failed to write corrected latency distribution")?;
    if let Some(path) = &args.csv {
        CsvExporter::export_percentiles(&summary, path).context("failed to write CSV report")?;
    }
    if let Some(path) = &args.csv_summary {
        CsvExporter::export_summary(&summary, path).context("failed to write CSV summary")?;
    }
    if let Some(path) = &args.json {
        JsonExporter::export(&summary, path).context("failed to write JSON report")?;
    }

    println!("{summary}");
    println!("Distribution written to {}", output.display());
    if wrote_corrected {
        println!("Corrected distribution written to {}", corrected_output.display());
    }
    if summary.is_degraded() {
        tracing::warn!(errors = summary.errors, "Run completed with request errors");
        println!(
            "degraded: {} of {} requests failed ({:.2}%)",
            summary.errors,
            summary.total_requests,
            summary.error_rate() * 100.0
        );
    }

    Ok(())
}

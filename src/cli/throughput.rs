//! `throughput` command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use log_bench_backends::BackendSession;
use log_bench_core::{Consumer, ErrorPolicy, Producer, ThroughputConfig, ThroughputReport};
use log_bench_report::{CsvExporter, JsonExporter};

use super::BackendArgs;

/// Which side(s) this process runs
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Send messages only
    Producer,
    /// Receive messages only
    Consumer,
    /// Subscribe a consumer, then produce into it
    Both,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    /// Errored messages count toward throughput
    Include,
    /// Errored messages are subtracted from throughput
    Exclude,
}

impl From<PolicyArg> for ErrorPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Include => ErrorPolicy::Include,
            PolicyArg::Exclude => ErrorPolicy::Exclude,
        }
    }
}

#[derive(Args, Debug)]
pub struct ThroughputArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Payload size in bytes
    #[arg(long = "size", visible_alias = "sz", default_value_t = 204_800)]
    pub size: usize,

    /// Messages to send, or to wait for
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    pub messages: u64,

    /// Side(s) to run in this process
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    pub mode: Mode,

    /// Whether errored messages count toward throughput
    #[arg(long, value_enum)]
    pub error_policy: PolicyArg,

    /// Consumer gives up after this long without a message
    #[arg(long, value_parser = humantime::parse_duration)]
    pub recv_timeout: Option<Duration>,

    /// Idle this long after the run before exiting
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    pub drain: Duration,

    /// Write the reports as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Append one CSV row per report, creating the file with a header
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

impl ThroughputArgs {
    fn config(&self) -> ThroughputConfig {
        let config = ThroughputConfig::new(self.messages, self.error_policy.into())
            .with_drain(self.drain);
        match self.recv_timeout {
            Some(timeout) => config.with_recv_timeout(timeout),
            None => config,
        }
    }
}

pub async fn run(args: ThroughputArgs) -> Result<()> {
    let config = args.config();
    let session = BackendSession::open(args.backend.clone().into_config(args.size))
        .context("failed to open backend")?;

    tracing::info!(
        system = %session.config().system,
        messages = args.messages,
        size = args.size,
        mode = ?args.mode,
        "Starting throughput benchmark"
    );

    let (reports, failure) = match args.mode {
        Mode::Producer => (vec![run_producer(&session, config).await?], None),
        Mode::Consumer => {
            let mut consumer = Consumer::new(session.stream_benchmark()?, config);
            (vec![consumer.run().await.context("consumer failed")?], None)
        }
        Mode::Both => run_both(&session, config).await?,
    };

    if let Some(path) = &args.json {
        JsonExporter::export_throughput(&reports, path).context("failed to write JSON report")?;
    }
    if let Some(path) = &args.csv {
        for report in &reports {
            CsvExporter::append_throughput(report, path).context("failed to write CSV report")?;
        }
    }

    for report in &reports {
        println!("{report}");
        if report.errors > 0 {
            tracing::warn!(role = %report.role, errors = report.errors, "Per-message errors");
            println!("degraded: {} errors occurred", report.errors);
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// How long a consumer without a receive timeout may keep draining after
/// its producer failed
const FAILED_PRODUCER_GRACE: Duration = Duration::from_secs(5);

async fn run_producer(
    session: &BackendSession,
    config: ThroughputConfig,
) -> Result<ThroughputReport> {
    let mut producer = Producer::new(session.stream_benchmark()?, config);
    producer.run().await.context("producer failed")
}

/// Subscribe first so no message is produced before the consumer listens
///
/// A producer failure does not discard the consumer: its partial report is
/// returned together with the producer error.
async fn run_both(
    session: &BackendSession,
    config: ThroughputConfig,
) -> Result<(Vec<ThroughputReport>, Option<anyhow::Error>)> {
    let recv_timeout = config.recv_timeout;
    let mut consumer = Consumer::new(session.stream_benchmark()?, config.clone());
    let receiver = consumer
        .subscribe()
        .await
        .context("consumer failed to subscribe")?;
    let mut consumer_task = tokio::spawn(async move { consumer.run_subscribed(receiver).await });

    let produced = match run_producer(session, config).await {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(error = %err, "Producer failed, collecting partial consumer report");
            let consumed = match recv_timeout {
                Some(_) => Some((&mut consumer_task).await),
                None => tokio::time::timeout(FAILED_PRODUCER_GRACE, &mut consumer_task)
                    .await
                    .ok(),
            };
            let reports = match consumed {
                Some(Ok(Ok(report))) => vec![report],
                Some(Ok(Err(consumer_err))) => {
                    tracing::warn!(error = %consumer_err, "Consumer failed after producer failure");
                    Vec::new()
                }
                Some(Err(join_err)) => {
                    tracing::warn!(error = %join_err, "Consumer task ended abnormally");
                    Vec::new()
                }
                None => {
                    tracing::warn!(
                        grace_ms = FAILED_PRODUCER_GRACE.as_millis() as u64,
                        "Consumer still waiting after producer failure, aborting it"
                    );
                    consumer_task.abort();
                    Vec::new()
                }
            };
            return Ok((reports, Some(err)));
        }
    };

    let consumed = consumer_task
        .await
        .context("consumer task panicked")?
        .context("consumer failed")?;
    Ok((vec![produced, consumed], None))
}

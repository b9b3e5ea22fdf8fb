//! log-bench - latency and throughput load generator for message backends

use anyhow::Result;
use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    // RUST_LOG wins when set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!("log-bench starting");

    cli.run().await
}

//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use log_bench_backends::{Backend, BackendConfig, DEFAULT_TOPIC};

mod latency;
mod throughput;

pub use latency::LatencyArgs;
pub use throughput::ThroughputArgs;

#[derive(Parser)]
#[command(name = "log-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Closed-loop latency benchmark at a fixed request rate
    Latency(LatencyArgs),
    /// Open-loop producer/consumer throughput benchmark
    Throughput(ThroughputArgs),
}

impl Cli {
    /// Run the selected command to completion
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Latency(args) => latency::run(args).await,
            Commands::Throughput(args) => throughput::run(args).await,
        }
    }
}

/// Backend connection flags shared by both commands
#[derive(clap::Args, Debug, Clone)]
pub struct BackendArgs {
    /// Message backend to benchmark
    #[arg(short, long, default_value = "memory")]
    pub system: Backend,

    /// Broker address (defaults to the backend's usual address)
    #[arg(long)]
    pub url: Option<String>,

    /// Topic messages are published to
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,
}

impl BackendArgs {
    fn into_config(self, payload_size: usize) -> BackendConfig {
        let config = BackendConfig::new(self.system, payload_size).with_topic(self.topic);
        match self.url {
            Some(url) => config.with_url(url),
            None => config,
        }
    }
}

//! JSON export functionality

use anyhow::{Context, Result};
use log_bench_core::{Summary, ThroughputReport};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes summaries and throughput reports as JSON
pub struct JsonExporter;

impl JsonExporter {
    /// Export a closed-loop summary together with the derived error rate
    pub fn export(summary: &Summary, path: impl AsRef<Path>) -> Result<()> {
        let output = json!({
            "summary": summary,
            "derived": {
                "error_rate_percent": summary.error_rate() * 100.0,
                "degraded": summary.is_degraded(),
            },
        });
        write_pretty(&output, path.as_ref())
    }

    /// Export open-loop reports, one per role
    pub fn export_throughput(reports: &[ThroughputReport], path: impl AsRef<Path>) -> Result<()> {
        let output: Vec<_> = reports
            .iter()
            .map(|r| {
                json!({
                    "report": r,
                    "counted_messages": r.counted_messages(),
                    "throughput": r.throughput(),
                })
            })
            .collect();
        write_pretty(&output, path.as_ref())
    }
}

fn write_pretty<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create JSON file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

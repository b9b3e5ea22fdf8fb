//! CSV export functionality

use anyhow::{Context, Result};
use csv::Writer;
use log_bench_core::{LatencyDistribution, Summary, ThroughputReport};
use std::io::Write;
use std::path::Path;

/// Writes summaries and percentile tables as CSV
pub struct CsvExporter;

impl CsvExporter {
    /// Export the ordered percentile table of `summary` to `path`
    ///
    /// Columns: `percentile`, `latency_us`, and `corrected_us` when the run
    /// was rate limited.
    pub fn export_percentiles(summary: &Summary, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let wtr = Writer::from_path(path)
            .with_context(|| format!("failed to create CSV file {}", path.display()))?;
        Self::write_percentiles(summary, wtr)
    }

    /// Percentile table to any writer
    pub fn write_percentiles<W: Write>(summary: &Summary, mut wtr: Writer<W>) -> Result<()> {
        let corrected = summary.corrected_latency.as_ref();

        let mut header = vec!["percentile", "latency_us"];
        if corrected.is_some() {
            header.push("corrected_us");
        }
        wtr.write_record(&header)?;

        for p in &summary.latency.percentiles {
            let mut row = vec![p.percentile.to_string(), p.value_us.to_string()];
            if let Some(corrected) = corrected {
                row.push(
                    corrected
                        .percentile(p.percentile)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Export run totals and headline latencies as `metric,value` rows
    pub fn export_summary(summary: &Summary, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut wtr = Writer::from_path(path)
            .with_context(|| format!("failed to create CSV file {}", path.display()))?;

        wtr.write_record(["metric", "value"])?;
        wtr.write_record(["backend", summary.backend.as_str()])?;
        wtr.write_record(["connections", &summary.connections.to_string()])?;
        wtr.write_record([
            "rate_limit",
            &summary
                .rate_limit
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unlimited".to_string()),
        ])?;
        wtr.write_record(["total_requests", &summary.total_requests.to_string()])?;
        wtr.write_record(["successes", &summary.successes.to_string()])?;
        wtr.write_record(["errors", &summary.errors.to_string()])?;
        wtr.write_record([
            "error_rate_percent",
            &format!("{:.2}", summary.error_rate() * 100.0),
        ])?;
        wtr.write_record(["elapsed_s", &format!("{:.3}", summary.elapsed.as_secs_f64())])?;
        wtr.write_record(["throughput_rps", &format!("{:.2}", summary.throughput)])?;
        write_latency_rows(&mut wtr, &summary.latency)?;

        wtr.flush()?;
        Ok(())
    }

    /// Append one open-loop report per row, writing the header on a new file
    pub fn append_throughput(report: &ThroughputReport, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let exists = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open CSV file {}", path.display()))?;
        let mut wtr = Writer::from_writer(file);

        if !exists {
            wtr.write_record([
                "role",
                "messages",
                "errors",
                "elapsed_s",
                "throughput",
                "completed",
            ])?;
        }
        wtr.write_record([
            report.role.to_string(),
            report.messages.to_string(),
            report.errors.to_string(),
            format!("{:.3}", report.elapsed.as_secs_f64()),
            report
                .throughput()
                .map(|r| format!("{r:.2}"))
                .unwrap_or_default(),
            report.completed.to_string(),
        ])?;

        wtr.flush()?;
        Ok(())
    }
}

fn write_latency_rows<W: Write>(wtr: &mut Writer<W>, latency: &LatencyDistribution) -> Result<()> {
    wtr.write_record(["min_us", &latency.min_us.to_string()])?;
    wtr.write_record(["mean_us", &format!("{:.2}", latency.mean_us)])?;
    wtr.write_record(["stddev_us", &format!("{:.2}", latency.stddev_us)])?;
    wtr.write_record(["max_us", &latency.max_us.to_string()])?;
    for p in &latency.percentiles {
        wtr.write_record([format!("p{}_us", p.percentile), p.value_us.to_string()])?;
    }
    Ok(())
}

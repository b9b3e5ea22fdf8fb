//! HDR-style latency distribution output

use anyhow::{Context, Result};
use log_bench_core::{LatencyHistogram, Summary};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write the latency distribution of `summary` to `path`
///
/// One row per quantile step, `summary.report_granularity` steps per
/// half-distance to 100%, followed by a short statistics footer.
pub fn write_latency_distribution(summary: &Summary, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    write_to_file(summary.histogram(), summary.report_granularity, path)?;

    tracing::debug!(
        path = %path.display(),
        samples = summary.successes,
        "Latency distribution written"
    );
    Ok(())
}

/// Write the coordinated-omission corrected distribution of `summary`
///
/// Returns `false` without touching `path` when the run was not rate limited.
pub fn write_corrected_distribution(summary: &Summary, path: impl AsRef<Path>) -> Result<bool> {
    let Some(corrected) = summary.corrected_histogram() else {
        return Ok(false);
    };
    let path = path.as_ref();
    write_to_file(corrected, summary.report_granularity, path)?;

    tracing::debug!(
        path = %path.display(),
        samples = corrected.len(),
        "Corrected latency distribution written"
    );
    Ok(true)
}

fn write_to_file(histogram: &LatencyHistogram, ticks: u32, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create distribution file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_distribution(histogram, ticks, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a distribution table for `histogram` to any writer
pub fn write_distribution<W: Write>(
    histogram: &LatencyHistogram,
    ticks_per_half_distance: u32,
    writer: &mut W,
) -> Result<()> {
    writeln!(
        writer,
        "{:>12} {:>14} {:>10} {:>14}\n",
        "Value(ms)", "Percentile", "TotalCount", "1/(1-Percentile)"
    )?;

    for tick in histogram.quantile_ticks(ticks_per_half_distance) {
        let value_ms = tick.value_us as f64 / 1000.0;
        if tick.quantile < 1.0 {
            writeln!(
                writer,
                "{:>12.3} {:>14.12} {:>10} {:>14.2}",
                value_ms,
                tick.quantile,
                tick.total_count,
                1.0 / (1.0 - tick.quantile)
            )?;
        } else {
            writeln!(
                writer,
                "{:>12.3} {:>14.12} {:>10}",
                value_ms, tick.quantile, tick.total_count
            )?;
        }
    }

    let stats = histogram.distribution(&[]);
    writeln!(
        writer,
        "#[Mean    = {:>12.3}, StdDeviation   = {:>12.3}]",
        stats.mean_us / 1000.0,
        stats.stddev_us / 1000.0
    )?;
    writeln!(
        writer,
        "#[Max     = {:>12.3}, Total count    = {:>12}]",
        stats.max_us as f64 / 1000.0,
        stats.count
    )?;
    Ok(())
}

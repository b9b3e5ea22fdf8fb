//! Report sinks for benchmark results
//!
//! This crate turns a finished [`Summary`] into files:
//!
//! - HDR-style latency distribution text ([`write_latency_distribution`])
//! - CSV percentile tables ([`CsvExporter`])
//! - JSON summaries ([`JsonExporter`])
//!
//! [`Summary`]: log_bench_core::Summary

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod csv_export;
pub mod hdr;
pub mod json_export;

pub use csv_export::CsvExporter;
pub use hdr::{write_corrected_distribution, write_distribution, write_latency_distribution};
pub use json_export::JsonExporter;

use std::path::{Path, PathBuf};

/// Default distribution file name for a latency run: `<system>_<rate>_<size>.txt`
pub fn default_output_name(system: &str, rate: f64, payload_size: usize) -> String {
    format!("{system}_{rate}_{payload_size}.txt")
}

/// Sibling of a distribution file for its corrected counterpart: `<stem>_corrected.<ext>`
pub fn corrected_output_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{stem}_corrected.{}", ext.to_string_lossy()),
        None => format!("{stem}_corrected"),
    };
    output.with_file_name(name)
}

use crate::OutputFormat;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use trace2har_core::normalize::CanonicalTimings;
use trace2har_core::trace::{RecordSource, TraceReader, TransactionRecord};
use trace2har_core::{ConversionWarning, Outcome};

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub file: PathBuf,
    /// Archive codec, `None` for a bare trace.
    pub archive: Option<String>,
    pub version: u16,
    pub has_tz_offset: bool,
    pub records: Vec<RecordLine>,
    pub warnings: Vec<ConversionWarning>,
}

/// One record, reduced to what fits on a line.
#[derive(Debug, Clone, Serialize)]
pub struct RecordLine {
    pub started: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub request_bytes: usize,
    pub response_bytes: usize,
    /// Total time in milliseconds, summed the same way as the HAR `time`.
    pub time_ms: Option<f64>,
}

impl RecordLine {
    fn from_record(record: &TransactionRecord) -> Self {
        let started = DateTime::<Utc>::from_timestamp_millis(record.started_ms)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| record.started_ms.to_string());

        Self {
            started,
            method: record.method.clone(),
            url: record.url.clone(),
            status: record.status,
            request_bytes: record.request_body.as_ref().map_or(0, Vec::len),
            response_bytes: record.response_body.as_ref().map_or(0, Vec::len),
            time_ms: CanonicalTimings::from_record(&record.timings).total(),
        }
    }
}

/// Read a trace and describe its container and records.
pub fn inspect_trace(file: &Path) -> Result<InspectReport> {
    tracing::debug!("Inspecting trace file: {}", file.display());

    let mut reader = TraceReader::open(file)
        .with_context(|| format!("Failed to open trace {}", file.display()))?;
    let header = *reader.header();

    let mut records = Vec::new();
    while let Some(record) = reader.next_record()? {
        records.push(RecordLine::from_record(&record));
    }

    Ok(InspectReport {
        file: file.to_path_buf(),
        archive: header.archive.map(|codec| codec.to_string()),
        version: header.version,
        has_tz_offset: header.has_tz_offset(),
        records,
        warnings: reader.take_warnings(),
    })
}

pub fn execute(file: &Path, format: OutputFormat) -> Result<Outcome> {
    let report = inspect_trace(file)?;

    match format {
        OutputFormat::Json => output_json(&report)?,
        OutputFormat::Table => output_table(&report),
        OutputFormat::Pretty => output_pretty(&report),
    }

    Ok(if report.warnings.is_empty() {
        Outcome::Clean
    } else {
        Outcome::Degraded
    })
}

fn output_pretty(report: &InspectReport) {
    use console::style;

    let file_name = report
        .file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("\n{}", style(format!("Trace: {}", file_name)).bold().cyan());
    println!(
        "  Container:   {}",
        match &report.archive {
            Some(codec) => format!("archive ({})", codec),
            None => "plain trace".to_string(),
        }
    );
    println!("  Version:     {}", report.version);
    println!(
        "  Time zones:  {}",
        if report.has_tz_offset { "recorded" } else { "UTC" }
    );
    println!("  Records:     {}", report.records.len());

    if !report.records.is_empty() {
        println!("\n{}", style("Records:").bold());
        for (i, record) in report.records.iter().enumerate() {
            let time = record
                .time_ms
                .map(|ms| format!("{:.2} ms", ms))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:>4}. {} {} {} {} [{}]",
                i,
                style(&record.started).dim(),
                style(&record.method).yellow(),
                record.status,
                record.url,
                time
            );
        }
    }

    if !report.warnings.is_empty() {
        println!("\n{}", style("Warnings:").bold().yellow());
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }

    println!();
}

fn output_json(report: &InspectReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{}", json);
    Ok(())
}

fn output_table(report: &InspectReport) {
    println!("Index,Started,Method,Status,URL,Request Bytes,Response Bytes,Time (ms)");
    for (i, record) in report.records.iter().enumerate() {
        println!(
            "{},{},{},{},{},{},{},{}",
            i,
            record.started,
            record.method,
            record.status,
            record.url,
            record.request_bytes,
            record.response_bytes,
            record
                .time_ms
                .map(|ms| format!("{:.2}", ms))
                .unwrap_or_default()
        );
    }
}

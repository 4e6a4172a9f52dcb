use crate::OutputFormat;
use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use trace2har_core::{
    CancellationToken, ConversionSummary, ConvertConfig, Converter, Outcome,
};

/// Arguments of the `convert` subcommand.
#[derive(Debug, Clone, Default)]
pub struct ConvertArgs {
    pub files: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub jobs: usize,
    pub body_threshold: Option<usize>,
    pub config: Option<PathBuf>,
}

/// One input file and where its HAR goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Result of converting one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ConversionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn outcome(&self) -> Option<Outcome> {
        self.summary.as_ref().map(ConversionSummary::outcome)
    }
}

pub fn execute(args: ConvertArgs, format: OutputFormat) -> Result<Outcome> {
    let config = load_config(args.config.as_deref(), args.body_threshold)?;
    let jobs = plan_jobs(&args.files, args.output.as_deref(), args.output_dir.as_deref())?;

    tracing::info!(
        "Converting {} file(s) with up to {} worker(s)",
        jobs.len(),
        args.jobs.max(1)
    );

    let progress = if jobs.len() > 1 && format == OutputFormat::Pretty {
        let bar = ProgressBar::new(jobs.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let token = CancellationToken::new();
    let reports = convert_all(jobs, &config, args.jobs, &token, &progress)?;
    progress.finish_and_clear();

    match format {
        OutputFormat::Json => output_json(&reports)?,
        OutputFormat::Table => output_table(&reports),
        OutputFormat::Pretty => output_pretty(&reports),
    }

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        bail!("{} of {} file(s) failed to convert", failed, reports.len());
    }

    Ok(reports
        .iter()
        .filter_map(FileReport::outcome)
        .max()
        .unwrap_or(Outcome::Clean))
}

/// Load the configuration file, then apply command-line overrides.
///
/// Without `--config`, `<config dir>/trace2har/config.toml` is used when
/// it exists.
pub fn load_config(explicit: Option<&Path>, body_threshold: Option<usize>) -> Result<ConvertConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.is_file()),
    };

    let mut config = match path {
        Some(path) => ConvertConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConvertConfig::default(),
    };

    if let Some(threshold) = body_threshold {
        config.body_threshold = threshold;
    }
    config.validate()?;

    Ok(config)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("trace2har").join("config.toml"))
}

/// Work out the output path of every input and reject ambiguous plans.
pub fn plan_jobs(
    files: &[PathBuf],
    output: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<Vec<ConversionJob>> {
    if files.is_empty() {
        bail!("No input files given");
    }
    if output.is_some() && files.len() > 1 {
        bail!("--output can only be used with a single input file; use --output-dir instead");
    }

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(files.len());
    for input in files {
        let target = match output {
            Some(path) => path.to_path_buf(),
            None => output_path(input, output_dir),
        };
        if !seen.insert(target.clone()) {
            bail!(
                "Several inputs would be written to {}",
                target.display()
            );
        }
        jobs.push(ConversionJob {
            input: input.clone(),
            output: target,
        });
    }

    Ok(jobs)
}

/// `capture.chls` becomes `capture.har`, in `output_dir` when given.
pub fn output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input.file_stem().unwrap_or(OsStr::new("trace"));
    let mut name = stem.to_os_string();
    name.push(".har");

    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// Convert every job on a blocking worker, at most `parallelism` at once.
/// Ctrl-C cancels all of them; reports come back in input order.
pub fn convert_all(
    jobs: Vec<ConversionJob>,
    config: &ConvertConfig,
    parallelism: usize,
    token: &CancellationToken,
    progress: &ProgressBar,
) -> Result<Vec<FileReport>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let interrupt = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling conversions");
                    token.cancel();
                }
            })
        };

        let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
        let mut workers = JoinSet::new();
        let total = jobs.len();

        for (position, job) in jobs.into_iter().enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            let config = config.clone();
            let token = token.clone();
            let progress = progress.clone();

            workers.spawn_blocking(move || {
                let _permit = permit;
                progress.set_message(job.input.display().to_string());

                let result = Converter::new(&config).and_then(|converter| {
                    let mut converter = converter.with_cancellation(token);
                    converter.convert_file(&job.input, &job.output)
                });
                progress.inc(1);

                (position, job, result)
            });
        }

        let mut reports: Vec<Option<FileReport>> = vec![None; total];
        while let Some(joined) = workers.join_next().await {
            let (position, job, result) = joined.context("Conversion worker panicked")?;
            let report = match result {
                Ok(summary) => FileReport {
                    input: job.input,
                    output: job.output,
                    summary: Some(summary),
                    error: None,
                },
                Err(e) => {
                    tracing::debug!("{} failed: {}", job.input.display(), e);
                    FileReport {
                        input: job.input,
                        output: job.output,
                        summary: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports[position] = Some(report);
        }

        interrupt.abort();
        Ok::<_, anyhow::Error>(reports.into_iter().flatten().collect())
    })
}

fn output_pretty(reports: &[FileReport]) {
    use console::style;

    for report in reports {
        match (&report.summary, &report.error) {
            (Some(summary), _) => {
                let mark = match summary.outcome() {
                    Outcome::Clean => style("✓").green(),
                    Outcome::Degraded => style("!").yellow(),
                };
                println!(
                    "{} {} → {} ({} entries)",
                    mark,
                    report.input.display(),
                    report.output.display(),
                    summary.entries_written
                );
                if !summary.warnings.is_empty() {
                    println!(
                        "  {}",
                        style(format!(
                            "{} warning(s), {} record(s) degraded{}",
                            summary.warnings.len(),
                            summary.records_with_warnings,
                            if summary.is_truncated() {
                                ", input truncated"
                            } else {
                                ""
                            }
                        ))
                        .dim()
                    );
                }
            }
            (None, error) => {
                println!(
                    "{} {}: {}",
                    style("✗").red(),
                    report.input.display(),
                    error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
}

fn output_json(reports: &[FileReport]) -> Result<()> {
    let json = serde_json::to_string_pretty(reports)?;
    println!("{}", json);
    Ok(())
}

fn output_table(reports: &[FileReport]) {
    println!("Input,Output,Status,Entries,Warnings");
    for report in reports {
        let (status, entries, warnings) = match &report.summary {
            Some(summary) => (
                match summary.outcome() {
                    Outcome::Clean => "clean",
                    Outcome::Degraded => "degraded",
                },
                summary.entries_written,
                summary.warnings.len(),
            ),
            None => ("failed", 0, 0),
        };
        println!(
            "{},{},{},{},{}",
            report.input.display(),
            report.output.display(),
            status,
            entries,
            warnings
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_replaces_extension() {
        assert_eq!(
            output_path(Path::new("/captures/session.chls"), None),
            PathBuf::from("/captures/session.har")
        );
        assert_eq!(
            output_path(Path::new("archive.chrlz"), Some(Path::new("/out"))),
            PathBuf::from("/out/archive.har")
        );
    }

    #[test]
    fn test_output_requires_single_input() {
        let files = vec![PathBuf::from("a.chls"), PathBuf::from("b.chls")];
        assert!(plan_jobs(&files, Some(Path::new("x.har")), None).is_err());
    }

    #[test]
    fn test_colliding_outputs_are_rejected() {
        let files = vec![PathBuf::from("a.chls"), PathBuf::from("a.chrlz")];
        let err = plan_jobs(&files, None, None).unwrap_err();
        assert!(err.to_string().contains("a.har"));
    }

    #[test]
    fn test_config_file_and_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "creator_name = \"x\"\n").unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.creator_name, "x");
        assert_eq!(config.body_threshold, 1024 * 1024);

        let config = load_config(Some(&path), Some(4096)).unwrap();
        assert_eq!(config.body_threshold, 4096);

        assert!(load_config(Some(&path), Some(0)).is_err());
    }
}

use assert_cmd::Command;
use indicatif::ProgressBar;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trace2har_cli::commands::convert::{convert_all, plan_jobs};
use trace2har_core::har::HarReader;
use trace2har_core::trace::{RawHeader, TraceOptions, TraceWriter, TransactionRecord};
use trace2har_core::{CancellationToken, ConvertConfig, Outcome};

#[allow(deprecated)]
fn get_trace2har_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin("trace2har")
}

/// Command isolated from any user configuration file.
fn trace2har(config_home: &Path) -> Command {
    let mut cmd = Command::new(get_trace2har_bin());
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env_remove("TRACE2HAR_BODY_THRESHOLD");
    cmd
}

fn write_trace(dir: &Path, name: &str, count: usize) -> PathBuf {
    let mut writer = TraceWriter::new(Vec::new(), TraceOptions::default()).unwrap();
    for i in 0..count {
        let mut record =
            TransactionRecord::new("GET", format!("https://shop.example.com/products/{}", i), 200);
        record.started_ms = 1_700_000_000_000 + i as i64;
        record.response_headers = vec![RawHeader::new("Content-Type", "text/plain")];
        record.response_body = Some(format!("product {}", i).into_bytes());
        writer.write_record(&record).unwrap();
    }

    let path = dir.join(name);
    fs::write(&path, writer.into_inner().unwrap()).unwrap();
    path
}

#[test]
fn test_convert_all_keeps_input_order() {
    let dir = TempDir::new().unwrap();
    let files: Vec<PathBuf> = (0..4)
        .map(|i| write_trace(dir.path(), &format!("s{}.chls", i), i + 1))
        .collect();
    let out_dir = dir.path().join("out");

    let jobs = plan_jobs(&files, None, Some(&out_dir)).unwrap();
    let reports = convert_all(
        jobs,
        &ConvertConfig::default(),
        3,
        &CancellationToken::new(),
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert_eq!(reports.len(), 4);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.input, files[i]);
        assert_eq!(report.output, out_dir.join(format!("s{}.har", i)));
        assert_eq!(report.outcome(), Some(Outcome::Clean));

        let har = HarReader::from_file(&report.output).unwrap();
        assert_eq!(har.log.entries.len(), i + 1);
    }
}

#[test]
fn test_convert_all_reports_failures_per_file() {
    let dir = TempDir::new().unwrap();
    let good = write_trace(dir.path(), "good.chls", 2);
    let bad = dir.path().join("bad.chls");
    fs::write(&bad, b"not a trace at all").unwrap();

    let jobs = plan_jobs(&[good, bad], None, None).unwrap();
    let reports = convert_all(
        jobs,
        &ConvertConfig::default(),
        2,
        &CancellationToken::new(),
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert!(reports[0].error.is_none());
    assert!(reports[0].output.exists());
    assert!(reports[1].error.is_some());
    assert!(!reports[1].output.exists());
}

#[test]
fn test_cancelled_batch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write_trace(dir.path(), "a.chls", 3),
        write_trace(dir.path(), "b.chls", 3),
    ];

    let token = CancellationToken::new();
    token.cancel();
    let jobs = plan_jobs(&files, None, None).unwrap();
    let reports = convert_all(
        jobs,
        &ConvertConfig::default(),
        2,
        &token,
        &ProgressBar::hidden(),
    )
    .unwrap();

    for report in reports {
        assert!(report.error.is_some());
        assert!(!report.output.exists());
    }
}

#[test]
fn test_convert_single_file_exits_zero() {
    let dir = TempDir::new().unwrap();
    let input = write_trace(dir.path(), "session.chls", 3);

    trace2har(dir.path())
        .arg("convert")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("session.har"))
        .stdout(predicate::str::contains("3 entries"));

    let har = HarReader::from_file(&dir.path().join("session.har")).unwrap();
    HarReader::validate(&har).unwrap();
    assert_eq!(har.log.entries.len(), 3);
}

#[test]
fn test_convert_with_explicit_output() {
    let dir = TempDir::new().unwrap();
    let input = write_trace(dir.path(), "session.chls", 1);
    let output = dir.path().join("elsewhere.har");

    trace2har(dir.path())
        .arg("convert")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    assert!(output.exists());
    assert!(!dir.path().join("session.har").exists());
}

#[test]
fn test_truncated_trace_exits_with_two() {
    let dir = TempDir::new().unwrap();
    let input = write_trace(dir.path(), "cut.chls", 2);
    let bytes = fs::read(&input).unwrap();
    fs::write(&input, &bytes[..bytes.len() - 3]).unwrap();

    trace2har(dir.path())
        .arg("convert")
        .arg(&input)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("input truncated"));

    let har = HarReader::from_file(&dir.path().join("cut.har")).unwrap();
    assert_eq!(har.log.entries.len(), 1);
}

#[test]
fn test_invalid_trace_exits_with_one() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("junk.chls");
    fs::write(&input, b"JUNKJUNKJUNK").unwrap();

    trace2har(dir.path())
        .arg("convert")
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"));

    assert!(!dir.path().join("junk.har").exists());
}

#[test]
fn test_output_flag_rejects_several_inputs() {
    let dir = TempDir::new().unwrap();
    let a = write_trace(dir.path(), "a.chls", 1);
    let b = write_trace(dir.path(), "b.chls", 1);

    trace2har(dir.path())
        .arg("convert")
        .arg(&a)
        .arg(&b)
        .arg("-o")
        .arg(dir.path().join("both.har"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--output-dir"));
}

#[test]
fn test_json_report_for_batch() {
    let dir = TempDir::new().unwrap();
    let a = write_trace(dir.path(), "a.chls", 1);
    let b = write_trace(dir.path(), "b.chls", 2);
    let out_dir = dir.path().join("hars");

    let output = trace2har(dir.path())
        .arg("--format")
        .arg("json")
        .arg("convert")
        .arg(&a)
        .arg(&b)
        .arg("--output-dir")
        .arg(&out_dir)
        .arg("--jobs")
        .arg("2")
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["summary"]["entries_written"], 1);
    assert_eq!(reports[1]["summary"]["entries_written"], 2);
    assert!(out_dir.join("a.har").exists());
    assert!(out_dir.join("b.har").exists());
}

#[test]
fn test_body_threshold_from_environment() {
    let dir = TempDir::new().unwrap();
    let input = write_trace(dir.path(), "env.chls", 1);

    trace2har(dir.path())
        .env("TRACE2HAR_BODY_THRESHOLD", "4")
        .arg("convert")
        .arg(&input)
        .assert()
        .success();

    let har = HarReader::from_file(&dir.path().join("env.har")).unwrap();
    assert_eq!(
        har.log.entries[0].response.content.encoding.as_deref(),
        Some("base64")
    );
}

#[test]
fn test_config_file_sets_creator() {
    let dir = TempDir::new().unwrap();
    let input = write_trace(dir.path(), "cfg.chls", 1);
    let config = dir.path().join("custom.toml");
    fs::write(&config, "creator_name = \"lab-recorder\"\n").unwrap();

    trace2har(dir.path())
        .arg("convert")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    let har = HarReader::from_file(&dir.path().join("cfg.har")).unwrap();
    assert_eq!(har.log.creator.name, "lab-recorder");
}

#[test]
fn test_bad_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let input = write_trace(dir.path(), "cfg.chls", 1);
    let config = dir.path().join("bad.toml");
    fs::write(&config, "no_such_setting = true\n").unwrap();

    trace2har(dir.path())
        .arg("convert")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load config"));
}

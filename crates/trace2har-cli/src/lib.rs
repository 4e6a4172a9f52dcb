use clap::ValueEnum;
use std::process::ExitCode;
use trace2har_core::Outcome;

pub mod commands;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Table,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Pretty => "pretty",
            OutputFormat::Json => "json",
            OutputFormat::Table => "table",
        }
    }
}

/// Exit status for a finished command: 0 when clean, 2 when output was
/// produced with warnings. Failures exit with 1.
pub fn exit_code(outcome: Outcome) -> ExitCode {
    match outcome {
        Outcome::Clean => ExitCode::SUCCESS,
        Outcome::Degraded => ExitCode::from(2),
    }
}

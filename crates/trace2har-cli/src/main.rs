use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::process::ExitCode;
use trace2har_cli::commands::convert::ConvertArgs;
use trace2har_cli::{OutputFormat, commands, exit_code};
use trace2har_core::Outcome;

#[derive(Parser)]
#[command(name = "trace2har")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Convert proxy session traces (.chls / .chrlz) into HTTP Archive (HAR) files",
    long_about = "trace2har reads session traces recorded by an HTTP debugging proxy and \
                  writes standard HAR 1.2 documents that browsers and analysis tools can open."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (json, table, pretty)
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one or more trace files to HAR
    Convert {
        /// Trace files to convert
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Output HAR file (single input only)
        #[arg(short, long, conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Directory for output files (default: next to each input)
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,

        /// Number of files converted in parallel
        #[arg(short, long, default_value_t = default_jobs())]
        jobs: usize,

        /// Bodies larger than this many bytes are stored as base64
        #[arg(long, env = "TRACE2HAR_BODY_THRESHOLD")]
        body_threshold: Option<usize>,

        /// Configuration file (default: <config dir>/trace2har/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the container details and records of a trace file
    Inspect {
        /// Path to the trace file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Generate shell completion scripts
    #[command(long_about = "Generate shell completion scripts for trace2har.

SUPPORTED SHELLS:
    bash, zsh, fish, powershell, elvish

INSTALLATION:
    Bash:
        trace2har completion --shell bash > ~/.local/share/bash-completion/completions/trace2har
        (or source it from ~/.bashrc)

    Zsh:
        trace2har completion --shell zsh > ~/.zfunc/_trace2har
        (add ~/.zfunc to fpath in ~/.zshrc)

    Fish:
        trace2har completion --shell fish > ~/.config/fish/completions/trace2har.fish

    PowerShell:
        trace2har completion --shell powershell >> $PROFILE")]
    Completion {
        /// Shell to generate completions for
        #[arg(long, value_enum)]
        shell: Shell,
    },
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    match run(cli) {
        Ok(outcome) => exit_code(outcome),
        Err(e) => {
            eprintln!("{} {:#}", console::style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    match cli.command {
        Commands::Convert {
            files,
            output,
            output_dir,
            jobs,
            body_threshold,
            config,
        } => commands::convert::execute(
            ConvertArgs {
                files,
                output,
                output_dir,
                jobs,
                body_threshold,
                config,
            },
            cli.format,
        ),
        Commands::Inspect { file } => commands::inspect::execute(&file, cli.format),
        Commands::Completion { shell } => {
            commands::completion::execute(shell, &mut Cli::command())?;
            Ok(Outcome::Clean)
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("trace2har=debug,trace2har_cli=debug,trace2har_core=debug")
    } else {
        EnvFilter::new("trace2har=warn,trace2har_cli=warn,trace2har_core=warn")
    };

    // Reports go to stdout, so logs stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the Veriscan CLI, which checks deployed contracts against their sources.
///
/// This module parses command-line arguments, installs logging and dispatches to the
/// subcommands. Runs additionally log to `logs.txt` inside their digest directory.
use clap::Parser;
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use veriscan_cli::commands::{Cmd, Command};
use veriscan_verification::orchestrator::REPORT_TARGET;

/// Command-line interface for Veriscan.
///
/// Veriscan diffs the verified sources of deployed contracts against a GitHub repository and
/// compares their on-chain bytecode with bytecode compiled from those sources.
#[derive(Parser)]
#[command(name = "veriscan", version)]
#[command(about = "Veriscan: verify deployed contracts against their sources")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Installs the stdout layer and, for runs, the plain-text file layer.
///
/// With `colored_reports` the run prints colored tables and diffs itself, so their plain
/// events are kept off stdout and only reach the log file.
fn init_tracing(log_file: Option<&Path>, colored_reports: bool) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_filter(filter_fn(move |meta| {
                    !(colored_reports && meta.target() == REPORT_TARGET)
                })),
        )
        .with(file_layer)
        .init();
    Ok(())
}

/// Runs the Veriscan CLI with the provided arguments.
#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();
    let (log_file, colored_reports) = match &mut cli.command {
        Cmd::Run(args) => (Some(args.digest_dir().join("logs.txt")), args.color()),
        _ => (None, false),
    };
    if let Err(e) = init_tracing(log_file.as_deref(), colored_reports) {
        eprintln!("error: failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

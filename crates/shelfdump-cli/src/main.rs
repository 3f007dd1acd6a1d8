//! shelfdump - MySQL backup runner.
//!
//! Exports every selected database into `<backup_dir>/<day>/<db>.tgz`
//! and rotates old backup directories.

mod args;
mod output;

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::Args;
use output::{render_summary, ConsoleProgress};
use shelfdump_core::{ConfigFile, LogProgress, MySqlConnector, Orchestrator, TarArchiver};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "backup run aborted");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, or append to `--log` without colour.
fn init_tracing(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if args.debug {
        EnvFilter::new(args.log_directive())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_directive()))
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &args.log {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Run one backup; `Ok(false)` when some database failed.
async fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let file = match args.config_path() {
        Some(path) => {
            tracing::debug!(path = %path.display(), "reading configuration");
            ConfigFile::load(&path)?
        }
        None => ConfigFile::default(),
    };
    let config = args.apply(file.into_config()?);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        connection = %config.connection,
        backup_dir = %config.backup_dir.display(),
        secure_root = %config.secure_root.display(),
        grouping = ?config.grouping,
        "configuration loaded"
    );

    let connector = MySqlConnector::new(config.connection.clone());
    let archiver = TarArchiver::new(&config.nice);
    let orchestrator = Orchestrator::new(&config, &connector, &archiver);
    let mut orchestrator = if args.log.is_some() {
        orchestrator.with_progress(LogProgress)
    } else {
        orchestrator.with_progress(ConsoleProgress::stdout())
    };

    let summary = orchestrator.run().await?;
    println!("{}", render_summary(&summary, args.format));

    for report in summary.failures() {
        tracing::warn!(database = %report.database, "database was not backed up");
    }
    Ok(summary.is_success())
}

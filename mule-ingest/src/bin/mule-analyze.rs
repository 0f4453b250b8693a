//! Mule ring analysis CLI

use anyhow::Context;
use clap::Parser;
use mule_engine::{Analyzer, CancelToken, Config, ErrorKind, ErrorReport};
use mule_ingest::{CsvIngestor, IngestError};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

/// Detect money-muling rings in a transaction CSV
#[derive(Parser, Debug)]
#[command(name = "mule-analyze")]
#[command(about = "Detect money-muling rings in a transaction CSV")]
#[command(version)]
struct Cli {
    /// Transaction CSV (transaction_id, sender_id, receiver_id, amount, timestamp)
    input: PathBuf,

    /// TOML configuration file (defaults to MULE_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the detection deadline in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Pretty-print the result JSON
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn load_config(cli: &Cli) -> mule_engine::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(deadline_ms) = cli.deadline_ms {
        config.engine.deadline_ms = deadline_ms;
        config.validate()?;
    }
    Ok(config)
}

/// Failure surfaced on stdout as `{"error": {kind, message}}`
fn error_report(err: &anyhow::Error) -> ErrorReport {
    if let Some(e) = err.downcast_ref::<mule_engine::Error>() {
        return e.report();
    }
    if let Some(e) = err.downcast_ref::<IngestError>() {
        return e.report();
    }
    ErrorReport::new(ErrorKind::InternalFault, format!("{:#}", err))
}

/// Await `task`, cancelling it if `interrupt` fires first
///
/// A failed signal registration is logged and the task runs to completion.
async fn until_interrupted<T>(
    mut task: JoinHandle<T>,
    interrupt: impl Future<Output = std::io::Result<()>>,
    cancel: &CancelToken,
) -> Result<T, JoinError> {
    tokio::select! {
        joined = &mut task => joined,
        signal = interrupt => {
            match signal {
                Ok(()) => {
                    tracing::warn!("Interrupted, cancelling analysis");
                    cancel.cancel();
                }
                Err(e) => tracing::warn!("Cannot listen for interrupts: {}", e),
            }
            task.await
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let config = load_config(&cli)?;
    let analyzer = Arc::new(Analyzer::new(config)?);

    let rows = CsvIngestor::new().read_path(&cli.input)?;

    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let worker = Arc::clone(&analyzer);
    let task = tokio::task::spawn_blocking(move || worker.analyze_with_cancel(&rows, &worker_cancel));

    let result = until_interrupted(task, tokio::signal::ctrl_c(), &cancel)
        .await
        .context("analysis task failed")??;

    let json = if cli.pretty {
        result.to_json_pretty()?
    } else {
        result.to_json()?
    };
    Ok(json)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    tracing::info!("Starting mule-analyze on {}", cli.input.display());

    match run(cli).await {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Analysis failed: {:#}", err);
            let payload = serde_json::json!({ "error": error_report(&err) });
            println!("{}", payload);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn observe_cancel(cancel: &CancelToken) -> JoinHandle<bool> {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel.is_cancelled()
        })
    }

    #[tokio::test]
    async fn test_interrupt_cancels_analysis() {
        let cancel = CancelToken::new();
        let task = observe_cancel(&cancel);

        let cancelled = until_interrupted(task, async { Ok(()) }, &cancel).await.unwrap();

        assert!(cancelled);
    }

    #[tokio::test]
    async fn test_signal_failure_does_not_cancel() {
        let cancel = CancelToken::new();
        let task = observe_cancel(&cancel);
        let failed = async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler")) };

        let cancelled = until_interrupted(task, failed, &cancel).await.unwrap();

        assert!(!cancelled);
        assert!(!cancel.is_cancelled());
    }
}

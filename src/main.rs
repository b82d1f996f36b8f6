//! Application entry point for the `codemetal-sensorwatch` ingestion service.
//!
//! This binary orchestrates the full startup sequence for the sensor file
//! pipeline, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Opening the SQLite store and creating the schema if it does not exist
//! - Starting the directory watcher and the pipeline workers
//! - Stopping cleanly on Ctrl+C
//!
//! # Environment Variables
//! - `WATCH_DIRECTORY`, `TARGET_FILENAME`, `QUARANTINE_DIRECTORY`,
//!   `DATABASE_URL` (**required**)
//! - see [`sensorwatch::config::load_from_env`] for the optional tuning knobs
//! - `SENSORWATCH_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `SENSORWATCH_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, sync::Arc};

use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::{Context, Result};

use sensorwatch::{config, pipeline::run_workers, DirectoryWatcher, Pipeline, Repository};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to open database: {}", cfg.db_url);

    let repository = Repository::connect(&cfg.db_url, cfg.db_pool_max)
        .await
        .with_context(|| format!("Failed to open database '{}'", cfg.db_url))?;

    let pipeline = Arc::new(Pipeline::new(&cfg, repository.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(cfg.event_queue_capacity);

    let watcher = DirectoryWatcher::new(&cfg.watch_directory, cfg.poll_interval).spawn(event_tx, shutdown_rx)?;
    let workers = tokio::spawn(run_workers(pipeline, event_rx, cfg.pipeline_workers));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the interrupt signal")?;
    tracing::info!("Interrupt received, stopping watcher");

    // The watcher may already be gone; nothing else to notify then
    let _ = shutdown_tx.send(true);
    watcher.await?;
    workers.await?;

    repository.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

// ---

/// Install the process-wide log subscriber.
///
/// Every pipeline stage logs through `tracing`, so this must run before the
/// store is opened. Output is compact, one line per event, tagged with target,
/// file and line. `RUST_LOG` wins when set; otherwise `SENSORWATCH_LOG_LEVEL`
/// picks the level and `sqlx` query logging is held at `warn` so per-row
/// inserts do not flood the log. `SENSORWATCH_SPAN_EVENTS` (`full` or
/// `enter_exit`) widens span reporting beyond close events. ANSI colour follows
/// the terminal unless `FORCE_COLOR` says otherwise.
fn init_tracing() {
    // ---
    let span_events = match env::var("SENSORWATCH_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to SENSORWATCH_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SENSORWATCH_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

//! Orchestrates one file through detection → validation → quarantine or
//! transformation → persistence → aggregation.
//!
//! Failures are routed through the [`FailurePolicy`]; no failure stops the
//! workers. At most one run per file path is in flight at any time.

use std::{
    collections::HashSet,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    error::{ErrorKind, ParseError, PipelineError, QuarantineError, TransformError},
    models::{BatchInfo, QuarantineEntry},
    policy::{Disposition, FailurePolicy, RetrySettings},
    quarantine::Quarantine,
    reader::read_table,
    repository::{AggregateScope, Repository},
    transformer::transform,
    validator::validate,
    watcher::FileCreated,
};

// ---

/// Result of handling one file-created event.
#[derive(Debug)]
pub enum Outcome {
    /// Not the target file.
    Ignored,
    /// Another run for the same path is still in flight.
    Busy,
    Ingested {
        batch: BatchInfo,
        rows: u64,
        aggregates: u64,
    },
    Quarantined {
        entry: QuarantineEntry,
    },
    /// The file was left where it is.
    Abandoned {
        kind: ErrorKind,
        error: String,
    },
}

/// Paths with a pipeline run in progress.
#[derive(Debug, Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<PathBuf>>>);

/// Exclusive right to process one path; released on drop.
#[derive(Debug)]
struct Claim {
    in_flight: InFlight,
    path: PathBuf,
}

impl InFlight {
    fn claim(&self, path: &Path) -> Option<Claim> {
        // ---
        let mut paths = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !paths.insert(path.to_path_buf()) {
            return None;
        }
        Some(Claim {
            in_flight: self.clone(),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut paths = self.in_flight.0.lock().unwrap_or_else(PoisonError::into_inner);
        paths.remove(&self.path);
    }
}

pub struct Pipeline {
    target_filename: String,
    quarantine: Quarantine,
    repository: Repository,
    policy: FailurePolicy,
    in_flight: InFlight,
}

impl Pipeline {
    pub fn new(config: &Config, repository: Repository) -> Self {
        // ---
        let retry = RetrySettings {
            attempts: config.storage_retry_attempts.max(1),
            base_backoff: config.storage_retry_backoff,
        };

        Pipeline {
            target_filename: config.target_filename.clone(),
            quarantine: Quarantine::new(&config.quarantine_directory),
            repository,
            policy: FailurePolicy::new(retry),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Exact basename match against the configured target.
    pub fn accepts(&self, path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()) == Some(self.target_filename.as_str())
    }

    /// Entry point for watcher events.
    pub async fn handle(&self, event: FileCreated) -> Outcome {
        // ---
        if !self.accepts(&event.path) {
            debug!("Ignoring {}", event.path.display());
            return Outcome::Ignored;
        }
        info!("Detected file: {}", self.target_filename);

        let Some(_claim) = self.in_flight.claim(&event.path) else {
            warn!("{} is already being processed, event dropped", event.path.display());
            return Outcome::Busy;
        };

        self.process(&event.path).await
    }

    /// Run every stage for `path` and route any failure.
    pub async fn process(&self, path: &Path) -> Outcome {
        // ---
        let batch = BatchInfo::for_file(path);

        match self.run(path, &batch).await {
            Ok((rows, aggregates)) => {
                info!("Pipeline finished for {}: {} rows, {} aggregates", batch.filename, rows, aggregates);
                Outcome::Ingested {
                    batch,
                    rows,
                    aggregates,
                }
            }
            Err(err) => self.route(path, err).await,
        }
    }

    async fn run(&self, path: &Path, batch: &BatchInfo) -> Result<(u64, u64), PipelineError> {
        // ---
        let valid = self
            .attempt("validation", || {
                let path = path.to_path_buf();
                let source_path = path.clone();
                blocking(
                    move || -> Result<_, PipelineError> { Ok(validate(read_table(&path)?)?) },
                    move |source| ParseError::Io { path: source_path, source }.into(),
                )
            })
            .await?;

        let table = self
            .attempt("transformation", || {
                let valid = valid.clone();
                blocking(
                    move || -> Result<_, PipelineError> { Ok(transform(valid)?) },
                    |source| TransformError::Io(source).into(),
                )
            })
            .await?;

        let repository = &self.repository;
        let table = &table;

        let rows = self
            .attempt("save", || async move {
                repository
                    .save_raw(batch, table)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        let aggregates = self
            .attempt("aggregation", || async move {
                repository
                    .aggregate(batch, AggregateScope::Batch)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        Ok((rows, aggregates))
    }

    /// Run `op`, repeating it with backoff while the policy routes its
    /// failure to retry and attempts remain.
    async fn attempt<T, F, Fut>(&self, stage: &str, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        // ---
        let attempts = self.policy.retry.attempts;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err)
                    if self.policy.disposition(err.kind()) == Disposition::Retry
                        && attempt < attempts =>
                {
                    let delay = self.policy.retry.backoff(attempt);
                    warn!(
                        "Error in {} (attempt {}/{}): {}; retrying in {:?}",
                        stage, attempt, attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn route(&self, path: &Path, err: PipelineError) -> Outcome {
        // ---
        let kind = err.kind();
        let abandoned = |err: &PipelineError| Outcome::Abandoned {
            kind,
            error: err.to_string(),
        };

        match self.policy.disposition(kind) {
            Disposition::Quarantine => {
                error!("Error in {} for {}: {}", kind, path.display(), err);
                let quarantine = self.quarantine.clone();
                let file_path = path.to_path_buf();
                let reason = err.quarantine_reason();
                let moved = blocking(
                    move || quarantine.quarantine(&file_path, &reason),
                    |source| QuarantineError::Io {
                        path: path.to_path_buf(),
                        source,
                    },
                )
                .await;

                match moved {
                    Ok(entry) => {
                        if let Err(e) = self.repository.record_quarantine(&entry).await {
                            warn!("Could not record quarantine of {}: {}", path.display(), e);
                        }
                        Outcome::Quarantined { entry }
                    }
                    Err(e) => {
                        error!("{}; {} left in place", e, path.display());
                        abandoned(&err)
                    }
                }
            }
            Disposition::AbandonInPlace | Disposition::Retry => {
                error!("Error in {} for {}: {}; file left in place", kind, path.display(), err);
                abandoned(&err)
            }
        }
    }
}

/// Run blocking file work off the async workers.
async fn blocking<T, E, F, W>(work: F, on_cancel: W) -> Result<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
    W: FnOnce(io::Error) -> E,
{
    // ---
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(on_cancel(io::Error::new(io::ErrorKind::Interrupted, e.to_string()))),
    }
}

/// Feed queued events to `workers` concurrent pipeline runs until the queue
/// closes and drains.
pub async fn run_workers(pipeline: Arc<Pipeline>, events: mpsc::Receiver<FileCreated>, workers: usize) {
    // ---
    let events = Arc::new(tokio::sync::Mutex::new(events));
    let mut handles = Vec::with_capacity(workers);

    for worker in 0..workers.max(1) {
        let pipeline = Arc::clone(&pipeline);
        let events = Arc::clone(&events);

        handles.push(tokio::spawn(async move {
            loop {
                let next = events.lock().await.recv().await;
                let Some(event) = next else {
                    break;
                };
                let outcome = pipeline.handle(event).await;
                debug!(worker, ?outcome, "Pipeline run finished");
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Pipeline worker failed: {}", e);
        }
    }
    info!("All pipeline workers stopped");
}

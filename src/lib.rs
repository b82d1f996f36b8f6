//! Library side of the `codemetal-sensorwatch` ingestion service.
//!
//! A watched directory delivers file-created events; the target file is
//! validated, quarantined or transformed, persisted to SQLite and summarized
//! per (sensor_id, date). `main.rs` only wires these modules together.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod quarantine;
pub mod reader;
pub mod repository;
pub mod schema;
pub mod transformer;
pub mod validator;
pub mod watcher;

pub use config::Config;
pub use error::{ErrorKind, PipelineError, ValidationFailure};
pub use models::{AggregateRecord, BatchInfo, QuarantineEntry, SensorRecord, TransformedRecord};
pub use pipeline::{Outcome, Pipeline};
pub use repository::{AggregateScope, Repository};
pub use watcher::{DirectoryWatcher, FileCreated};

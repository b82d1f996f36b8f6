//! Error taxonomy for the ingestion pipeline.
//!
//! Each stage owns its error type; [`PipelineError`] wraps them so the
//! pipeline can route a failure by its [`ErrorKind`] alone.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

// ---

/// The input file could not be read as a sensor table.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("line {line}: column '{column}' has non-numeric value '{value}'")]
    InvalidNumber {
        line: u64,
        column: &'static str,
        value: String,
    },
}

/// Schema rule that rejected a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationFailure {
    // ---
    NullValues,
    TemperatureOutOfRange,
    NegativeHumidity,
    InvalidSensorIdType,
}

impl ValidationFailure {
    /// Operator-facing reason recorded with a quarantined file.
    pub fn reason(&self) -> &'static str {
        // ---
        match self {
            ValidationFailure::NullValues => "Null values in required columns.",
            ValidationFailure::TemperatureOutOfRange => "Temperature out of range.",
            ValidationFailure::NegativeHumidity => "Negative humidity values.",
            ValidationFailure::InvalidSensorIdType => "sensor_id is not an integer.",
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A table violated one of the schema rules.
#[derive(Debug, Clone, Error)]
#[error("{failure} ({detail})")]
pub struct ValidationError {
    pub failure: ValidationFailure,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("line {line}: cannot parse timestamp '{value}'")]
    TimestampParse { line: u64, value: String },

    #[error("rewrite failed: {0}")]
    Io(#[from] io::Error),

    #[error("rewrite failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Connectivity or statement failure in the backing store.
#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StorageError(#[from] pub sqlx::Error);

#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("quarantine destination {0} already exists")]
    DestinationExists(PathBuf),

    #[error("cannot move {path} into quarantine: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Routing key for the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // ---
    Parse,
    Validation,
    Transform,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::Transform => "transform",
            ErrorKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Any failure raised while a file moves through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        // ---
        match self {
            PipelineError::Parse(_) => ErrorKind::Parse,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Transform(_) => ErrorKind::Transform,
            PipelineError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Reason recorded when this error sends a file to quarantine.
    pub fn quarantine_reason(&self) -> String {
        // ---
        match self {
            PipelineError::Validation(e) => e.failure.reason().to_string(),
            other => other.to_string(),
        }
    }
}

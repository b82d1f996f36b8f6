//! Simple data models for the sensor pipeline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ---

/// One CSV row as parsed, before any schema rule has run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    // ---
    /// 1-based line in the source file (header is line 1).
    pub line: u64,
    pub sensor_id: Option<String>,
    pub location: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timestamp: Option<String>,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// All rows of one arrived file.
#[derive(Debug, Clone)]
pub struct RawTable {
    // ---
    pub path: PathBuf,
    pub records: Vec<RawRecord>,
}

/// A row that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    // ---
    pub line: u64,
    pub sensor_id: i64,
    pub location: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timestamp: String,
    pub pressure: f64,
    pub temperature: f64,
    pub humidity: f64,
}

/// Output of the validator, handed to the transformer.
#[derive(Debug, Clone)]
pub struct ValidRecords {
    // ---
    pub path: PathBuf,
    pub records: Vec<SensorRecord>,
}

/// Validated row with its derived date/time and rounded coordinates.
///
/// Field order is the column order of the rewritten file.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TransformedRecord {
    // ---
    pub sensor_id: i64,
    pub location: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timestamp: String,
    pub pressure: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct TransformedTable {
    // ---
    pub path: PathBuf,
    pub records: Vec<TransformedRecord>,
}

/// Identity of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInfo {
    // ---
    pub id: Uuid,
    /// Basename of the source file, used as the aggregate label.
    pub filename: String,
}

impl BatchInfo {
    pub fn for_file(path: &Path) -> Self {
        // ---
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        BatchInfo {
            id: Uuid::new_v4(),
            filename,
        }
    }
}

/// Per-(sensor, date) temperature summary as stored in `aggregated_metrics`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AggregateRecord {
    // ---
    pub sensor_id: i64,
    pub date: String,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub avg_temperature: f64,
    /// Sample standard deviation; `None` for single-reading groups.
    pub stddev_temperature: Option<f64>,
    pub reading_count: i64,
    pub filename: String,
    pub batch_id: String,
}

/// Min/max/mean/sample-stddev over one group of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureStats {
    // ---
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: Option<f64>,
    pub count: usize,
}

impl TemperatureStats {
    /// Returns `None` for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        // ---
        if samples.is_empty() {
            return None;
        }

        let count = samples.len();
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &value in samples {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        let mean = sum / count as f64;

        // Two-pass variance with the n-1 denominator
        let stddev = if count > 1 {
            let squares: f64 = samples.iter().map(|v| (v - mean).powi(2)).sum();
            Some((squares / (count - 1) as f64).sqrt())
        } else {
            None
        };

        Some(TemperatureStats {
            min,
            max,
            mean,
            stddev,
            count,
        })
    }
}

/// Record of a file moved into the quarantine area.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarantineEntry {
    // ---
    pub original_path: PathBuf,
    pub quarantine_path: PathBuf,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

//! Configuration loader for the `codemetal-sensorwatch` ingestion service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Every component receives the resulting [`Config`]
//! at construction; nothing else reads the environment.
//!
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};

/// Parse an optional unsigned integer variable with a default value.
macro_rules! parse_var {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string variable.
macro_rules! require_var {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Directory observed for new files (non-recursive).
    pub watch_directory: PathBuf,

    /// Exact basename of the file that triggers the pipeline.
    pub target_filename: String,

    /// Holding area for rejected files.
    pub quarantine_directory: PathBuf,

    /// SQLite connection string, e.g. `sqlite:sensors.db`.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Delay between two scans of the watched directory.
    pub poll_interval: Duration,

    /// Number of concurrent pipeline workers.
    pub pipeline_workers: usize,

    /// Capacity of the detected-file event queue.
    pub event_queue_capacity: usize,

    /// Attempts made for a stage routed to retry before giving up.
    pub storage_retry_attempts: u32,

    /// Base delay of the exponential retry backoff.
    pub storage_retry_backoff: Duration,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `WATCH_DIRECTORY` – directory to observe
/// - `TARGET_FILENAME` – basename that triggers ingestion
/// - `QUARANTINE_DIRECTORY` – where rejected files are moved
/// - `DATABASE_URL` – SQLite connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `POLL_INTERVAL_MS` – directory scan period (default: 1000)
/// - `PIPELINE_WORKERS` – concurrent pipeline runs (default: 1)
/// - `EVENT_QUEUE_CAPACITY` – pending event bound (default: 64)
/// - `STORAGE_RETRY_ATTEMPTS` – attempts for retried stages (default: 3)
/// - `STORAGE_RETRY_BACKOFF_MS` – base backoff delay (default: 500)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    load_from(|name| env::var(name).ok())
}

/// Build a [`Config`] from an arbitrary variable source.
pub fn load_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let watch_directory = PathBuf::from(require_var!(lookup, "WATCH_DIRECTORY"));
    let target_filename = require_var!(lookup, "TARGET_FILENAME").trim().to_string();
    let quarantine_directory = PathBuf::from(require_var!(lookup, "QUARANTINE_DIRECTORY"));
    let db_url = require_var!(lookup, "DATABASE_URL");

    let db_pool_max = parse_var!(lookup, "DB_POOL_MAX", u32, 5);
    let poll_interval_ms = parse_var!(lookup, "POLL_INTERVAL_MS", u64, 1000);
    let pipeline_workers = parse_var!(lookup, "PIPELINE_WORKERS", usize, 1);
    let event_queue_capacity = parse_var!(lookup, "EVENT_QUEUE_CAPACITY", usize, 64);
    let storage_retry_attempts = parse_var!(lookup, "STORAGE_RETRY_ATTEMPTS", u32, 3);
    let storage_retry_backoff_ms = parse_var!(lookup, "STORAGE_RETRY_BACKOFF_MS", u64, 500);

    let is_basename =
        Path::new(&target_filename).file_name().and_then(|n| n.to_str()) == Some(target_filename.as_str());
    if !is_basename {
        bail!("TARGET_FILENAME must be a bare file name, got '{}'", target_filename);
    }
    if db_pool_max == 0 {
        bail!("DB_POOL_MAX must be at least 1");
    }
    if poll_interval_ms == 0 {
        bail!("POLL_INTERVAL_MS must be at least 1");
    }
    if pipeline_workers == 0 {
        bail!("PIPELINE_WORKERS must be at least 1");
    }
    if event_queue_capacity == 0 {
        bail!("EVENT_QUEUE_CAPACITY must be at least 1");
    }

    Ok(Config {
        watch_directory,
        target_filename,
        quarantine_directory,
        db_url,
        db_pool_max,
        poll_interval: Duration::from_millis(poll_interval_ms),
        pipeline_workers,
        event_queue_capacity,
        storage_retry_attempts,
        storage_retry_backoff: Duration::from_millis(storage_retry_backoff_ms),
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  WATCH_DIRECTORY      : {}", self.watch_directory.display());
        tracing::info!("  TARGET_FILENAME      : {}", self.target_filename);
        tracing::info!("  QUARANTINE_DIRECTORY : {}", self.quarantine_directory.display());
        tracing::info!("  DATABASE_URL         : {}", self.db_url);
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  POLL_INTERVAL_MS     : {}", self.poll_interval.as_millis());
        tracing::info!("  PIPELINE_WORKERS     : {}", self.pipeline_workers);
        tracing::info!("  EVENT_QUEUE_CAPACITY : {}", self.event_queue_capacity);
        tracing::info!("  STORAGE_RETRY        : {} attempts, {} ms base backoff",
            self.storage_retry_attempts,
            self.storage_retry_backoff.as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        // ---
        let mut map: HashMap<String, String> = [
            ("WATCH_DIRECTORY", "/data/incoming"),
            ("TARGET_FILENAME", "data_2017_07.csv"),
            ("QUARANTINE_DIRECTORY", "/data/quarantine"),
            ("DATABASE_URL", "sqlite:sensors.db"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    fn load(map: &HashMap<String, String>) -> Result<Config> {
        load_from(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        // ---
        let cfg = load(&vars(&[])).unwrap();

        assert_eq!(cfg.watch_directory, PathBuf::from("/data/incoming"));
        assert_eq!(cfg.target_filename, "data_2017_07.csv");
        assert_eq!(cfg.db_pool_max, 5);
        assert_eq!(cfg.poll_interval, Duration::from_millis(1000));
        assert_eq!(cfg.pipeline_workers, 1);
        assert_eq!(cfg.event_queue_capacity, 64);
        assert_eq!(cfg.storage_retry_attempts, 3);
        assert_eq!(cfg.storage_retry_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_overrides_parsed() {
        // ---
        let cfg = load(&vars(&[("PIPELINE_WORKERS", "4"), ("POLL_INTERVAL_MS", " 250 ")])).unwrap();

        assert_eq!(cfg.pipeline_workers, 4);
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_required_variable() {
        // ---
        let mut map = vars(&[]);
        map.remove("QUARANTINE_DIRECTORY");

        let err = load(&map).unwrap_err();
        assert!(err.to_string().contains("QUARANTINE_DIRECTORY"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        // ---
        let err = load(&vars(&[("DB_POOL_MAX", "many")])).unwrap_err();
        assert!(err.to_string().contains("Invalid DB_POOL_MAX"));
    }

    #[test]
    fn test_target_must_be_basename() {
        // ---
        assert!(load(&vars(&[("TARGET_FILENAME", "nested/data.csv")])).is_err());
        assert!(load(&vars(&[("TARGET_FILENAME", "..")])).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        // ---
        assert!(load(&vars(&[("PIPELINE_WORKERS", "0")])).is_err());
    }
}

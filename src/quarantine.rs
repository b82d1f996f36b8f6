//! Holding area for rejected files.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tracing::warn;

use crate::{error::QuarantineError, models::QuarantineEntry};

// ---

#[derive(Debug, Clone)]
pub struct Quarantine {
    directory: PathBuf,
}

impl Quarantine {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Quarantine {
            directory: directory.into(),
        }
    }

    /// Move `file_path` to `<quarantine>/<basename>` with a single rename.
    ///
    /// The directory is created on demand. An existing destination is never
    /// overwritten; the move fails and the file stays where it was.
    pub fn quarantine(&self, file_path: &Path, reason: &str) -> Result<QuarantineEntry, QuarantineError> {
        // ---
        let io_err = |source: io::Error| QuarantineError::Io {
            path: file_path.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.directory).map_err(io_err)?;

        let base_name = file_path.file_name().ok_or_else(|| {
            io_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;
        let quarantine_path = self.directory.join(base_name);

        if quarantine_path.try_exists().map_err(io_err)? {
            return Err(QuarantineError::DestinationExists(quarantine_path));
        }

        fs::rename(file_path, &quarantine_path).map_err(io_err)?;

        warn!("File moved to quarantine due to: {}", reason);

        Ok(QuarantineEntry {
            original_path: file_path.to_path_buf(),
            quarantine_path,
            reason: reason.to_string(),
            quarantined_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_moves_file_and_creates_directory() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.csv");
        fs::write(&source, "sensor_id\n1\n").unwrap();
        let quarantine = Quarantine::new(dir.path().join("quarantine"));

        let entry = quarantine.quarantine(&source, "Temperature out of range.").unwrap();

        assert!(!source.exists());
        assert_eq!(entry.quarantine_path, dir.path().join("quarantine").join("data.csv"));
        assert_eq!(fs::read_to_string(&entry.quarantine_path).unwrap(), "sensor_id\n1\n");
        assert_eq!(entry.reason, "Temperature out of range.");
        assert_eq!(entry.original_path, source);
    }

    #[test]
    fn test_existing_directory_is_fine() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("quarantine");
        fs::create_dir(&qdir).unwrap();
        let source = dir.path().join("a.csv");
        fs::write(&source, "x").unwrap();

        assert!(Quarantine::new(&qdir).quarantine(&source, "reason").is_ok());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("quarantine");
        fs::create_dir(&qdir).unwrap();
        fs::write(qdir.join("data.csv"), "earlier").unwrap();
        let source = dir.path().join("data.csv");
        fs::write(&source, "later").unwrap();

        let err = Quarantine::new(&qdir).quarantine(&source, "reason").unwrap_err();

        assert!(matches!(err, QuarantineError::DestinationExists(_)));
        assert_eq!(fs::read_to_string(&source).unwrap(), "later");
        assert_eq!(fs::read_to_string(qdir.join("data.csv")).unwrap(), "earlier");
    }

    #[test]
    fn test_missing_source_fails_loudly() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let quarantine = Quarantine::new(dir.path().join("q"));

        let err = quarantine
            .quarantine(&dir.path().join("gone.csv"), "reason")
            .unwrap_err();
        assert!(matches!(err, QuarantineError::Io { .. }));
    }
}

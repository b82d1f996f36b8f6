//! Derives the `date`/`time` columns and rounds coordinates, then rewrites
//! the source file in place.
//!
//! The rewrite is staged in a hidden sibling temp file and renamed over the
//! original, so a failed transformation leaves the pre-transformation content
//! intact.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::{
    error::TransformError,
    models::{SensorRecord, TransformedRecord, TransformedTable, ValidRecords},
};

// ---

const COORDINATE_DECIMALS: i32 = 3;

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Transform every row and overwrite the file at `valid.path`.
pub fn transform(valid: ValidRecords) -> Result<TransformedTable, TransformError> {
    // ---
    info!("Starting data transformation for: {}", valid.path.display());

    let records = valid
        .records
        .iter()
        .map(SensorRecord::to_transformed)
        .collect::<Result<Vec<_>, _>>()?;

    rewrite(&valid.path, &records)?;

    info!(
        "Data transformation completed and saved to: {}",
        valid.path.display()
    );

    Ok(TransformedTable {
        path: valid.path,
        records,
    })
}

impl SensorRecord {
    // ---
    pub fn to_transformed(&self) -> Result<TransformedRecord, TransformError> {
        // ---
        let stamp = parse_timestamp(&self.timestamp).ok_or_else(|| TransformError::TimestampParse {
            line: self.line,
            value: self.timestamp.clone(),
        })?;

        Ok(TransformedRecord {
            sensor_id: self.sensor_id,
            location: self.location,
            lat: self.lat.map(round_coordinate),
            lon: self.lon.map(round_coordinate),
            timestamp: self.timestamp.clone(),
            pressure: self.pressure,
            temperature: self.temperature,
            humidity: self.humidity,
            date: stamp.date(),
            time: stamp.time(),
        })
    }
}

/// Parse the supported timestamp layouts into wall-clock date-time.
///
/// Offsets are honoured by keeping the local time of the given offset.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    // ---
    let value = value.trim();

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Round to three decimals, ties to even.
pub fn round_coordinate(value: f64) -> f64 {
    // ---
    let scale = 10f64.powi(COORDINATE_DECIMALS);
    (value * scale).round_ties_even() / scale
}

/// Hidden sibling path used to stage the rewrite.
fn staging_path(path: &Path) -> PathBuf {
    // ---
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

fn rewrite(path: &Path, records: &[TransformedRecord]) -> Result<(), TransformError> {
    // ---
    let temp_path = staging_path(path);
    debug!("Staging transformed rows in {}", temp_path.display());

    let written = write_records(&temp_path, records);
    let renamed = written.and_then(|_| fs::rename(&temp_path, path).map_err(TransformError::from));

    if renamed.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    renamed
}

fn write_records(temp_path: &Path, records: &[TransformedRecord]) -> Result<(), TransformError> {
    // ---
    let mut writer = csv::Writer::from_writer(File::create(temp_path)?);

    if records.is_empty() {
        writer.write_record(crate::reader::COLUMNS.iter().chain(["date", "time"].iter()))?;
    }
    for record in records {
        writer.serialize(record)?;
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::path::PathBuf;

    fn record(timestamp: &str, lat: f64, lon: f64) -> SensorRecord {
        // ---
        SensorRecord {
            line: 2,
            sensor_id: 2266,
            location: Some(1140),
            lat: Some(lat),
            lon: Some(lon),
            timestamp: timestamp.to_string(),
            pressure: 95270.27,
            temperature: 23.46,
            humidity: 62.48,
        }
    }

    #[test]
    fn test_timestamp_split() {
        // ---
        let t = record("2017-07-01 12:30:00", 1.0, 1.0).to_transformed().unwrap();

        assert_eq!(t.date.to_string(), "2017-07-01");
        assert_eq!(t.time.to_string(), "12:30:00");
        assert_eq!(t.timestamp, "2017-07-01 12:30:00");
    }

    #[test]
    fn test_timestamp_layouts() {
        // ---
        let cases = [
            ("2017-07-01T23:59:59", "2017-07-01", "23:59:59"),
            ("2017-07-01 08:15", "2017-07-01", "08:15:00"),
            ("2017/07/02 00:00:07", "2017-07-02", "00:00:07"),
            ("2017-07-01 12:30:00.250", "2017-07-01", "12:30:00.250"),
            ("2017-07-01T23:30:00+02:00", "2017-07-01", "23:30:00"),
            ("2017-07-03", "2017-07-03", "00:00:00"),
        ];
        for (input, date, time) in cases {
            let parsed = parse_timestamp(input).unwrap_or_else(|| panic!("failed on {}", input));
            assert_eq!(parsed.date().to_string(), date, "date of {}", input);
            assert_eq!(parsed.time().to_string(), time, "time of {}", input);
        }
    }

    #[test]
    fn test_bad_timestamp_fails_whole_row() {
        // ---
        let err = record("yesterday noon", 1.0, 1.0).to_transformed().unwrap_err();

        assert!(matches!(err, TransformError::TimestampParse { line: 2, .. }));
    }

    #[test]
    fn test_rounding_half_to_even() {
        // ---
        // Values whose scaled form is an exact binary tie
        assert_eq!(round_coordinate(1.0625), 1.062);
        assert_eq!(round_coordinate(0.1875), 0.188);
        assert_eq!(round_coordinate(-1.0625), -1.062);
        assert_eq!(round_coordinate(42.73843), 42.738);
        assert_eq!(round_coordinate(23.27219), 23.272);
    }

    #[test]
    fn test_rounding_idempotent() {
        // ---
        for value in [42.738, 23.272, -0.001, 0.0, 179.999, 1.062] {
            assert_eq!(round_coordinate(value), value);
            assert_eq!(round_coordinate(round_coordinate(value)), round_coordinate(value));
        }
    }

    #[test]
    fn test_null_coordinates_stay_null() {
        // ---
        let mut r = record("2017-07-01 12:30:00", 1.0, 1.0);
        r.lat = None;
        r.lon = None;
        let t = r.to_transformed().unwrap();

        assert_eq!(t.lat, None);
        assert_eq!(t.lon, None);
    }

    #[test]
    fn test_transform_rewrites_file() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "original contents\n").unwrap();

        let table = transform(ValidRecords {
            path: path.clone(),
            records: vec![record("2017-07-01 12:30:00", 42.73843, 23.27219)],
        })
        .unwrap();

        assert_eq!(table.records.len(), 1);
        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("sensor_id,location,lat,lon,timestamp,pressure,temperature,humidity,date,time")
        );
        assert_eq!(
            lines.next(),
            Some("2266,1140,42.738,23.272,2017-07-01 12:30:00,95270.27,23.46,62.48,2017-07-01,12:30:00")
        );
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_failed_transform_keeps_original() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "original contents\n").unwrap();

        let result = transform(ValidRecords {
            path: path.clone(),
            records: vec![
                record("2017-07-01 12:30:00", 1.0, 1.0),
                record("not a time", 1.0, 1.0),
            ],
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "original contents\n");
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        // ---
        let staged = staging_path(&PathBuf::from("/srv/in/data.csv"));
        assert_eq!(staged, PathBuf::from("/srv/in/.data.csv.tmp"));
    }

    #[test]
    fn test_empty_batch_writes_header() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "sensor_id\n").unwrap();

        transform(ValidRecords {
            path: path.clone(),
            records: vec![],
        })
        .unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap().trim_end(),
            "sensor_id,location,lat,lon,timestamp,pressure,temperature,humidity,date,time"
        );
    }
}

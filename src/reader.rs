//! CSV reader producing a [`RawTable`] of nullable, typed rows.
//!
//! Structural problems (unreadable file, missing header column, ragged row,
//! non-numeric value in a numeric column) are [`ParseError`]s. Nulls are kept
//! as `None` for the validator to judge.

use std::{fs::File, path::Path};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::{
    error::ParseError,
    models::{RawRecord, RawTable},
};

// ---

/// Input columns, in output order.
pub const COLUMNS: [&str; 8] = [
    "sensor_id",
    "location",
    "lat",
    "lon",
    "timestamp",
    "pressure",
    "temperature",
    "humidity",
];

/// Cell texts read as null, in addition to the empty cell.
const NULL_MARKERS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Position of each required column within the header row.
struct ColumnIndex([usize; 8]);

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, ParseError> {
        // ---
        let mut positions = [0usize; 8];
        for (slot, name) in positions.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
                .ok_or(ParseError::MissingColumn(name))?;
        }
        Ok(ColumnIndex(positions))
    }
}

/// Read and parse the CSV file at `path`.
pub fn read_table(path: &Path) -> Result<RawTable, ParseError> {
    // ---
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(file);

    let index = ColumnIndex::from_headers(reader.headers()?)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        records.push(parse_row(&row, &index, line)?);
    }

    debug!("Parsed {} rows from {}", records.len(), path.display());

    Ok(RawTable {
        path: path.to_path_buf(),
        records,
    })
}

fn parse_row(row: &StringRecord, index: &ColumnIndex, line: u64) -> Result<RawRecord, ParseError> {
    // ---
    let [sensor_id, location, lat, lon, timestamp, pressure, temperature, humidity] = index.0;

    Ok(RawRecord {
        line,
        sensor_id: cell(row, sensor_id).map(str::to_string),
        location: parse_cell(row, location, "location", line)?,
        lat: parse_reading(row, lat, "lat", line)?,
        lon: parse_reading(row, lon, "lon", line)?,
        timestamp: cell(row, timestamp).map(str::to_string),
        pressure: parse_reading(row, pressure, "pressure", line)?,
        temperature: parse_reading(row, temperature, "temperature", line)?,
        humidity: parse_reading(row, humidity, "humidity", line)?,
    })
}

/// Non-null cell text, or `None` for empty cells and null markers.
fn cell(row: &StringRecord, idx: usize) -> Option<&str> {
    row.get(idx).filter(|v| !v.is_empty() && !NULL_MARKERS.contains(v))
}

fn parse_cell<T: std::str::FromStr>(
    row: &StringRecord,
    idx: usize,
    column: &'static str,
    line: u64,
) -> Result<Option<T>, ParseError> {
    // ---
    cell(row, idx)
        .map(|value| {
            value.parse::<T>().map_err(|_| ParseError::InvalidNumber {
                line,
                column,
                value: value.to_string(),
            })
        })
        .transpose()
}

/// Float cell; any NaN spelling `f64::from_str` accepts (`NAN`, `-nan`, ...) is null.
fn parse_reading(
    row: &StringRecord,
    idx: usize,
    column: &'static str,
    line: u64,
) -> Result<Option<f64>, ParseError> {
    Ok(parse_cell::<f64>(row, idx, column, line)?.filter(|v| !v.is_nan()))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        // ---
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_typed_rows() {
        // ---
        let file = write_csv(
            "sensor_id,location,lat,lon,timestamp,pressure,temperature,humidity\n\
             2266,1140,42.738,23.272,2017-07-01 00:00:07,95270.27,23.46,62.48\n",
        );
        let table = read_table(file.path()).unwrap();

        assert_eq!(table.records.len(), 1);
        let row = &table.records[0];
        assert_eq!(row.line, 2);
        assert_eq!(row.sensor_id.as_deref(), Some("2266"));
        assert_eq!(row.location, Some(1140));
        assert_eq!(row.lat, Some(42.738));
        assert_eq!(row.timestamp.as_deref(), Some("2017-07-01 00:00:07"));
        assert_eq!(row.temperature, Some(23.46));
        assert_eq!(row.humidity, Some(62.48));
    }

    #[test]
    fn test_column_order_is_free_and_extras_ignored() {
        // ---
        let file = write_csv(
            "humidity,temperature,note,pressure,timestamp,lon,lat,location,sensor_id\n\
             10,20,hello,30,2017-07-01 01:00:00,1.5,2.5,7,9\n",
        );
        let table = read_table(file.path()).unwrap();
        let row = &table.records[0];

        assert_eq!(row.sensor_id.as_deref(), Some("9"));
        assert_eq!(row.humidity, Some(10.0));
        assert_eq!(row.lat, Some(2.5));
    }

    #[test]
    fn test_nulls_and_markers() {
        // ---
        let file = write_csv(
            "sensor_id,location,lat,lon,timestamp,pressure,temperature,humidity\n\
             ,,NaN,,2017-07-01 00:00:07,NA, ,null\n",
        );
        let row = &read_table(file.path()).unwrap().records[0];

        assert_eq!(row.sensor_id, None);
        assert_eq!(row.location, None);
        assert_eq!(row.lat, None);
        assert_eq!(row.pressure, None);
        assert_eq!(row.temperature, None);
        assert_eq!(row.humidity, None);
    }

    #[test]
    fn test_nan_spellings_and_spreadsheet_markers_are_null() {
        // ---
        let file = write_csv(
            "sensor_id,location,lat,lon,timestamp,pressure,temperature,humidity\n\
             1,1,NAN,-NaN,2017-07-01,-nan,1,1\n\
             1,1,1,1,2017-07-01,1,<NA>,n/a\n\
             1,#N/A,1,1,2017-07-01,1,1,#N/A\n",
        );
        let records = read_table(file.path()).unwrap().records;

        assert_eq!(records[0].lat, None);
        assert_eq!(records[0].lon, None);
        assert_eq!(records[0].pressure, None);
        assert_eq!(records[1].temperature, None);
        assert_eq!(records[1].humidity, None);
        assert_eq!(records[2].location, None);
        assert_eq!(records[2].humidity, None);
    }

    #[test]
    fn test_missing_column_is_parse_error() {
        // ---
        let file = write_csv("sensor_id,location,lat,lon,timestamp,pressure,temperature\n1,1,1,1,x,1,1\n");

        assert!(matches!(
            read_table(file.path()),
            Err(ParseError::MissingColumn("humidity"))
        ));
    }

    #[test]
    fn test_non_numeric_value_is_parse_error() {
        // ---
        let file = write_csv(
            "sensor_id,location,lat,lon,timestamp,pressure,temperature,humidity\n\
             1,1,1,1,2017-07-01,1,warm,1\n",
        );

        match read_table(file.path()) {
            Err(ParseError::InvalidNumber { line, column, value }) => {
                assert_eq!(line, 2);
                assert_eq!(column, "temperature");
                assert_eq!(value, "warm");
            }
            other => panic!("expected InvalidNumber, got {:?}", other),
        }
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        // ---
        let file = write_csv(
            "sensor_id,location,lat,lon,timestamp,pressure,temperature,humidity\n\
             1,1,1,1,2017-07-01,1,1\n",
        );

        assert!(matches!(read_table(file.path()), Err(ParseError::Csv(_))));
    }

    #[test]
    fn test_unreadable_file() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.csv");

        assert!(matches!(read_table(&missing), Err(ParseError::Io { .. })));
    }
}

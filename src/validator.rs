//! Schema rules applied to a freshly parsed table.
//!
//! Checks run in a fixed order over the whole table and the first failing
//! rule wins:
//! 1. no nulls in `sensor_id`, `timestamp`, `pressure`, `temperature`, `humidity`
//! 2. every temperature within [`TEMPERATURE_MIN`, `TEMPERATURE_MAX`] (inclusive)
//! 3. no negative humidity
//! 4. every `sensor_id` is an integer

use tracing::info;

use crate::{
    error::{ValidationError, ValidationFailure},
    models::{RawRecord, RawTable, SensorRecord, ValidRecords},
};

// ---

pub const TEMPERATURE_MIN: f64 = -1000.0;
pub const TEMPERATURE_MAX: f64 = 1000.0;

/// Validate `table`, returning the typed rows on success.
///
/// The source file is never touched here; routing a failure is the caller's job.
pub fn validate(table: RawTable) -> Result<ValidRecords, ValidationError> {
    // ---
    info!("Starting data validation for: {}", table.path.display());

    if let Some(row) = table.records.iter().find(|r| has_required_null(r)) {
        return Err(fail(ValidationFailure::NullValues, row, "required column is empty"));
    }

    let out_of_range = table.records.iter().find(|r| {
        r.temperature
            .is_some_and(|t| !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&t))
    });
    if let Some(row) = out_of_range {
        let detail = format!("temperature {}", row.temperature.unwrap_or_default());
        return Err(fail(ValidationFailure::TemperatureOutOfRange, row, &detail));
    }

    if let Some(row) = table.records.iter().find(|r| r.humidity.is_some_and(|h| h < 0.0)) {
        let detail = format!("humidity {}", row.humidity.unwrap_or_default());
        return Err(fail(ValidationFailure::NegativeHumidity, row, &detail));
    }

    let mut records = Vec::with_capacity(table.records.len());
    for row in &table.records {
        records.push(to_sensor_record(row)?);
    }

    info!("Validation passed: {} rows", records.len());

    Ok(ValidRecords {
        path: table.path,
        records,
    })
}

fn has_required_null(row: &RawRecord) -> bool {
    // ---
    let missing = |v: Option<f64>| !v.is_some_and(|v| !v.is_nan());

    row.sensor_id.is_none()
        || row.timestamp.is_none()
        || missing(row.pressure)
        || missing(row.temperature)
        || missing(row.humidity)
}

/// Builds the typed row; only the sensor_id type can still fail at this point.
fn to_sensor_record(row: &RawRecord) -> Result<SensorRecord, ValidationError> {
    // ---
    let raw_id = row.sensor_id.as_deref().unwrap_or_default();
    let sensor_id = raw_id.parse::<i64>().map_err(|_| {
        fail(
            ValidationFailure::InvalidSensorIdType,
            row,
            &format!("sensor_id '{}'", raw_id),
        )
    })?;

    Ok(SensorRecord {
        line: row.line,
        sensor_id,
        location: row.location,
        lat: row.lat,
        lon: row.lon,
        timestamp: row.timestamp.clone().unwrap_or_default(),
        pressure: row.pressure.unwrap_or_default(),
        temperature: row.temperature.unwrap_or_default(),
        humidity: row.humidity.unwrap_or_default(),
    })
}

fn fail(failure: ValidationFailure, row: &RawRecord, detail: &str) -> ValidationError {
    // ---
    tracing::warn!("Validation failed: {}", failure);
    ValidationError {
        failure,
        detail: format!("line {}: {}", row.line, detail),
    }
}

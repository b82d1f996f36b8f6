//! Database schema management for `codemetal-sensorwatch`.
//!
//! Ensures required tables and indexes exist before any file is ingested.
//! Applied once when the repository connects.

use sqlx::SqlitePool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `sensor_data` table for transformed readings, the
/// `aggregated_metrics` table for per-(sensor, date) summaries and the
/// `quarantine_log` audit table. Safe to call on every startup; no-op if
/// objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    // Raw ingested rows; no natural key, repeated ingestion duplicates rows
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_data (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor_id    INTEGER NOT NULL,
            location     INTEGER,
            lat          REAL,
            lon          REAL,
            timestamp    TEXT    NOT NULL,
            pressure     REAL    NOT NULL,
            temperature  REAL    NOT NULL,
            humidity     REAL    NOT NULL,
            date         TEXT    NOT NULL,
            time         TEXT    NOT NULL,
            batch_id     TEXT    NOT NULL,
            source_file  TEXT    NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // One summary row per (sensor_id, date)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS aggregated_metrics (
            sensor_id           INTEGER NOT NULL,
            date                TEXT    NOT NULL,
            min_temperature     REAL    NOT NULL,
            max_temperature     REAL    NOT NULL,
            avg_temperature     REAL    NOT NULL,
            stddev_temperature  REAL,
            reading_count       INTEGER NOT NULL,
            filename            TEXT    NOT NULL,
            batch_id            TEXT    NOT NULL,
            updated_at          TEXT    NOT NULL,
            PRIMARY KEY (sensor_id, date)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quarantine_log (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            original_path    TEXT NOT NULL,
            quarantine_path  TEXT NOT NULL,
            reason           TEXT NOT NULL,
            quarantined_at   TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_sensor_date
            ON sensor_data (sensor_id, date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_batch_id
            ON sensor_data (batch_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

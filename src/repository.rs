//! Durable storage for ingested readings, their aggregates and the
//! quarantine audit trail.
//!
//! Backed by SQLite through an `sqlx` pool. A batch of raw rows is written in
//! one transaction, so a failed batch leaves no partial rows behind.
//! Aggregates are keyed by (sensor_id, date) and upserted, so recomputing a
//! group replaces its previous summary.

use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use tracing::{debug, info};

use crate::{
    error::StorageError,
    models::{
        AggregateRecord, BatchInfo, QuarantineEntry, TemperatureStats, TransformedRecord, TransformedTable,
    },
    schema,
};

// ---

/// Which (sensor_id, date) groups an aggregation run recomputes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateScope {
    /// Only groups that received rows from the given batch.
    Batch,
    /// Every group in `sensor_data`.
    FullHistory,
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Open (creating if missing) the database at `db_url` and apply the schema.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        // ---
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        schema::create_schema(&pool).await?;
        info!("Storage ready at {}", db_url);

        Ok(Repository { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert every row of `table` tagged with `batch`, all-or-nothing.
    pub async fn save_raw(&self, batch: &BatchInfo, table: &TransformedTable) -> Result<u64, StorageError> {
        // ---
        let mut tx = self.pool.begin().await?;
        let batch_id = batch.id.to_string();

        for record in &table.records {
            sqlx::query(
                r#"
                INSERT INTO sensor_data (
                    sensor_id, location, lat, lon, timestamp,
                    pressure, temperature, humidity, date, time,
                    batch_id, source_file
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.sensor_id)
            .bind(record.location)
            .bind(record.lat)
            .bind(record.lon)
            .bind(&record.timestamp)
            .bind(record.pressure)
            .bind(record.temperature)
            .bind(record.humidity)
            .bind(record.date)
            .bind(record.time)
            .bind(&batch_id)
            .bind(&batch.filename)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let rows = table.records.len() as u64;
        info!("Saved {} raw rows from {} (batch {})", rows, batch.filename, batch.id);
        Ok(rows)
    }

    /// Recompute and upsert temperature statistics for the groups in `scope`.
    ///
    /// Statistics always cover every stored row of a group, not only the rows
    /// of the current batch. Returns the number of groups written.
    pub async fn aggregate(&self, batch: &BatchInfo, scope: AggregateScope) -> Result<u64, StorageError> {
        // ---
        let batch_id = batch.id.to_string();

        let rows: Vec<(i64, String, f64)> = match scope {
            AggregateScope::Batch => {
                sqlx::query_as(
                    r#"
                    SELECT d.sensor_id, d.date, d.temperature
                    FROM sensor_data d
                    WHERE EXISTS (
                        SELECT 1 FROM sensor_data b
                        WHERE b.batch_id = ?
                          AND b.sensor_id = d.sensor_id
                          AND b.date = d.date
                    )
                    "#,
                )
                .bind(&batch_id)
                .fetch_all(&self.pool)
                .await?
            }
            AggregateScope::FullHistory => {
                sqlx::query_as("SELECT sensor_id, date, temperature FROM sensor_data")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        debug!("Aggregating {} stored readings ({:?} scope)", rows.len(), scope);

        let mut groups: BTreeMap<(i64, String), Vec<f64>> = BTreeMap::new();
        for (sensor_id, date, temperature) in rows {
            groups.entry((sensor_id, date)).or_default().push(temperature);
        }

        let updated_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for ((sensor_id, date), temperatures) in &groups {
            let Some(stats) = TemperatureStats::from_samples(temperatures) else {
                continue;
            };

            sqlx::query(
                r#"
                INSERT INTO aggregated_metrics (
                    sensor_id, date, min_temperature, max_temperature,
                    avg_temperature, stddev_temperature, reading_count,
                    filename, batch_id, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (sensor_id, date) DO UPDATE SET
                    min_temperature    = excluded.min_temperature,
                    max_temperature    = excluded.max_temperature,
                    avg_temperature    = excluded.avg_temperature,
                    stddev_temperature = excluded.stddev_temperature,
                    reading_count      = excluded.reading_count,
                    filename           = excluded.filename,
                    batch_id           = excluded.batch_id,
                    updated_at         = excluded.updated_at
                "#,
            )
            .bind(sensor_id)
            .bind(date)
            .bind(stats.min)
            .bind(stats.max)
            .bind(stats.mean)
            .bind(stats.stddev)
            .bind(stats.count as i64)
            .bind(&batch.filename)
            .bind(&batch_id)
            .bind(updated_at)
            .execute(&mut *tx)
            .await?;

            written += 1;
        }

        tx.commit().await?;

        info!("Aggregated metrics written for {} (sensor_id, date) groups", written);
        Ok(written)
    }

    /// Persist the audit record of a quarantined file.
    pub async fn record_quarantine(&self, entry: &QuarantineEntry) -> Result<(), StorageError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO quarantine_log (original_path, quarantine_path, reason, quarantined_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(entry.original_path.display().to_string())
        .bind(entry.quarantine_path.display().to_string())
        .bind(&entry.reason)
        .bind(entry.quarantined_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_raw_rows(&self) -> Result<i64, StorageError> {
        // ---
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sensor_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn fetch_raw_records(&self) -> Result<Vec<TransformedRecord>, StorageError> {
        // ---
        let records = sqlx::query_as::<_, TransformedRecord>(
            r#"
            SELECT sensor_id, location, lat, lon, timestamp,
                   pressure, temperature, humidity, date, time
            FROM sensor_data
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn fetch_aggregates(&self) -> Result<Vec<AggregateRecord>, StorageError> {
        // ---
        let records = sqlx::query_as::<_, AggregateRecord>(
            r#"
            SELECT sensor_id, date, min_temperature, max_temperature,
                   avg_temperature, stddev_temperature, reading_count,
                   filename, batch_id
            FROM aggregated_metrics
            ORDER BY sensor_id, date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn fetch_quarantine_log(&self) -> Result<Vec<QuarantineEntry>, StorageError> {
        // ---
        let rows = sqlx::query(
            "SELECT original_path, quarantine_path, reason, quarantined_at FROM quarantine_log ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<QuarantineEntry, StorageError> {
                Ok(QuarantineEntry {
                    original_path: PathBuf::from(row.try_get::<String, _>("original_path")?),
                    quarantine_path: PathBuf::from(row.try_get::<String, _>("quarantine_path")?),
                    reason: row.try_get("reason")?,
                    quarantined_at: row.try_get::<DateTime<Utc>, _>("quarantined_at")?,
                })
            })
            .collect()
    }
}

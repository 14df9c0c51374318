//! SQLite backend
//!
//! Two tables, created on open if missing:
//!
//! ```sql
//! sensor   (serial PK, type, name, state, geolocation, address, location, description)
//! readings (id PK, serial, utc, value, unit)   -- indexed on (serial, utc)
//! ```
//!
//! `utc` is TEXT in the fixed-width stored layout, so `BETWEEN` and
//! `ORDER BY` on it follow time order. Ties are broken by insertion order.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use sensorgate_core::time::parse_utc;
use sensorgate_core::{GatewayResult, Measurement, SensorRecord, SensorStore, TimeRange};

use crate::StoreError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sensor (
        serial      TEXT PRIMARY KEY NOT NULL,
        type        TEXT NOT NULL,
        name        TEXT NOT NULL,
        state       TEXT NOT NULL,
        geolocation TEXT,
        address     TEXT,
        location    TEXT,
        description TEXT
    )",
    "CREATE TABLE IF NOT EXISTS readings (
        id     INTEGER PRIMARY KEY AUTOINCREMENT,
        serial TEXT NOT NULL,
        utc    TEXT NOT NULL,
        value  REAL NOT NULL,
        unit   TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS readings_serial_utc ON readings (serial, utc)",
];

#[derive(sqlx::FromRow)]
struct ReadingRow {
    utc: String,
    value: f64,
    unit: String,
}

impl TryFrom<ReadingRow> for Measurement {
    type Error = StoreError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        let utc = parse_utc(&row.utc).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Measurement { utc, value: row.value, unit: row.unit })
    }
}

#[derive(sqlx::FromRow)]
struct SensorRow {
    serial: String,
    #[sqlx(rename = "type")]
    sensor_type: String,
    name: String,
    state: String,
    geolocation: Option<String>,
    address: Option<String>,
    location: Option<String>,
    description: Option<String>,
}

impl TryFrom<SensorRow> for SensorRecord {
    type Error = StoreError;

    fn try_from(row: SensorRow) -> Result<Self, Self::Error> {
        let corrupt = |e: sensorgate_core::GatewayError| StoreError::Corrupt(e.to_string());
        Ok(SensorRecord {
            serial: row.serial,
            sensor_type: row.sensor_type.parse().map_err(corrupt)?,
            name: row.name,
            state: row.state.parse().map_err(corrupt)?,
            geolocation: row.geolocation,
            address: row.address,
            location: row.location,
            description: row.description,
        })
    }
}

/// Pooled SQLite store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database file at `path`
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> GatewayResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StoreError::from)?;

        debug!("opened sqlite database {}", path.as_ref().display());
        Self::with_pool(pool).await
    }

    /// Private database that lives as long as the store
    pub async fn in_memory() -> GatewayResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(StoreError::from)?;
        // every connection would see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::from)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> GatewayResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(StoreError::from)?;
        }
        Ok(Self { pool })
    }

    async fn fetch_readings(&self, serial: &str, range: &TimeRange) -> Result<Vec<Measurement>, StoreError> {
        let rows: Vec<ReadingRow> = sqlx::query_as(
            "SELECT utc, value, unit FROM readings \
             WHERE serial = ? AND utc BETWEEN ? AND ? \
             ORDER BY utc ASC, id ASC",
        )
        .bind(serial)
        .bind(range.start_utc())
        .bind(range.end_utc())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Measurement::try_from).collect()
    }

    async fn fetch_sensor(&self, serial: &str) -> Result<Option<SensorRecord>, StoreError> {
        let row: Option<SensorRow> = sqlx::query_as(
            "SELECT serial, type, name, state, geolocation, address, location, description \
             FROM sensor WHERE serial = ?",
        )
        .bind(serial)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SensorRecord::try_from).transpose()
    }
}

#[async_trait]
impl SensorStore for SqliteStore {
    async fn add_reading(&self, serial: &str, measurement: &Measurement) -> GatewayResult<()> {
        sqlx::query("INSERT INTO readings (serial, utc, value, unit) VALUES (?, ?, ?, ?)")
            .bind(serial)
            .bind(measurement.utc_string())
            .bind(measurement.value)
            .bind(&measurement.unit)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_readings(&self, serial: &str, range: &TimeRange) -> GatewayResult<Vec<Measurement>> {
        Ok(self.fetch_readings(serial, range).await?)
    }

    async fn delete_readings(&self, serial: &str) -> GatewayResult<()> {
        let done = sqlx::query("DELETE FROM readings WHERE serial = ?")
            .bind(serial)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        debug!("deleted {} readings of [{}]", done.rows_affected(), serial);
        Ok(())
    }

    async fn add_sensor(&self, record: &SensorRecord) -> GatewayResult<()> {
        sqlx::query(
            "INSERT INTO sensor (serial, type, name, state, geolocation, address, location, description) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.serial)
        .bind(record.sensor_type.as_str())
        .bind(&record.name)
        .bind(record.state.as_str())
        .bind(&record.geolocation)
        .bind(&record.address)
        .bind(&record.location)
        .bind(&record.description)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_sensor(&self, serial: &str) -> GatewayResult<Option<SensorRecord>> {
        Ok(self.fetch_sensor(serial).await?)
    }

    async fn delete_sensor(&self, serial: &str) -> GatewayResult<()> {
        sqlx::query("DELETE FROM sensor WHERE serial = ?")
            .bind(serial)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

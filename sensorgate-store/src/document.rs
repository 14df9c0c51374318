//! Document backend: JSON collections on disk
//!
//! - `sensors.json` is one JSON array of [`SensorRecord`] documents keyed by
//!   `serial`. Every change rewrites it through a temporary file and a rename,
//!   so readers never see half a file.
//! - `readings.jsonl` is append-only, one `{serial, utc, value, unit}`
//!   document per line. Adding a reading writes that one line and nothing
//!   else; only [`SensorStore::delete_readings`] rewrites the file.
//!
//! A line cut short by a crash is dropped when the store is opened, before
//! anything is appended after it. All access goes through one async mutex.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use sensorgate_core::{GatewayError, GatewayResult, Measurement, SensorRecord, SensorStore, TimeRange};

use crate::StoreError;

const SENSORS: &str = "sensors.json";
const READINGS: &str = "readings.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReadingDocument {
    serial: String,
    #[serde(flatten)]
    measurement: Measurement,
}

/// JSON-file store
#[derive(Debug)]
pub struct DocumentStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl DocumentStore {
    /// Use `dir` for the collections, creating it if needed
    pub async fn open(dir: impl AsRef<Path>) -> GatewayResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(StoreError::from)?;
        let store = Self { dir, lock: Mutex::new(()) };
        store.drop_torn_reading().await?;
        debug!("document store at {}", store.dir.display());
        Ok(store)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Cut an unterminated last line off the readings file
    async fn drop_torn_reading(&self) -> Result<(), StoreError> {
        let path = self.path(READINGS);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            return Ok(());
        }

        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        warn!(
            "dropping {} bytes of an unfinished reading at the end of {}",
            bytes.len() - keep,
            path.display()
        );
        let file = OpenOptions::new().write(true).open(&path).await?;
        file.set_len(keep as u64).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, StoreError> {
        match fs::read(self.path(file)).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace `file` through a staging file and a rename
    async fn replace(&self, file: &str, contents: &[u8]) -> Result<(), StoreError> {
        let staging = self.dir.join(format!(".{}.tmp", file));
        fs::write(&staging, contents).await?;
        fs::rename(&staging, self.path(file)).await?;
        Ok(())
    }

    async fn save_sensors(&self, sensors: &[SensorRecord]) -> Result<(), StoreError> {
        self.replace(SENSORS, &serde_json::to_vec_pretty(sensors)?).await
    }

    async fn append_reading(&self, doc: &ReadingDocument) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(doc)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(self.path(READINGS)).await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Stream the readings file, keeping the documents `keep` accepts
    async fn scan_readings<F>(&self, mut keep: F) -> Result<Vec<ReadingDocument>, StoreError>
    where
        F: FnMut(&ReadingDocument) -> bool,
    {
        let path = self.path(READINGS);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();
        let mut kept = Vec::new();
        let mut number = 0usize;
        while let Some(line) = lines.next_line().await? {
            number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let doc: ReadingDocument = serde_json::from_str(&line)
                .map_err(|e| StoreError::Corrupt(format!("{} line {}: {}", path.display(), number, e)))?;
            if keep(&doc) {
                kept.push(doc);
            }
        }
        Ok(kept)
    }
}

#[async_trait]
impl SensorStore for DocumentStore {
    async fn add_reading(&self, serial: &str, measurement: &Measurement) -> GatewayResult<()> {
        let _guard = self.lock.lock().await;
        let doc = ReadingDocument { serial: serial.to_string(), measurement: measurement.clone() };
        self.append_reading(&doc).await?;
        Ok(())
    }

    async fn get_readings(&self, serial: &str, range: &TimeRange) -> GatewayResult<Vec<Measurement>> {
        let _guard = self.lock.lock().await;
        let docs = self
            .scan_readings(|doc| doc.serial == serial && range.contains(&doc.measurement.utc))
            .await?;

        let mut found: Vec<Measurement> = docs.into_iter().map(|doc| doc.measurement).collect();
        // stable: equal timestamps keep insertion order
        found.sort_by(|a, b| a.utc.cmp(&b.utc));
        Ok(found)
    }

    async fn delete_readings(&self, serial: &str) -> GatewayResult<()> {
        let _guard = self.lock.lock().await;
        let kept = self.scan_readings(|doc| doc.serial != serial).await?;

        let mut contents = Vec::new();
        for doc in &kept {
            serde_json::to_writer(&mut contents, doc).map_err(StoreError::from)?;
            contents.push(b'\n');
        }
        self.replace(READINGS, &contents).await?;
        Ok(())
    }

    async fn add_sensor(&self, record: &SensorRecord) -> GatewayResult<()> {
        let _guard = self.lock.lock().await;
        let mut sensors: Vec<SensorRecord> = self.load(SENSORS).await?;
        if sensors.iter().any(|s| s.serial == record.serial) {
            return Err(GatewayError::Storage(format!("sensor [{}] already stored", record.serial)));
        }
        sensors.push(record.clone());
        self.save_sensors(&sensors).await?;
        Ok(())
    }

    async fn get_sensor(&self, serial: &str) -> GatewayResult<Option<SensorRecord>> {
        let _guard = self.lock.lock().await;
        let sensors: Vec<SensorRecord> = self.load(SENSORS).await?;
        Ok(sensors.into_iter().find(|s| s.serial == serial))
    }

    async fn delete_sensor(&self, serial: &str) -> GatewayResult<()> {
        let _guard = self.lock.lock().await;
        let mut sensors: Vec<SensorRecord> = self.load(SENSORS).await?;
        sensors.retain(|s| s.serial != serial);
        self.save_sensors(&sensors).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "document"
    }
}

//! In-process store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use sensorgate_core::{GatewayError, GatewayResult, Measurement, SensorRecord, SensorStore, TimeRange};

/// Keeps sensors and readings in memory; lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    sensors: RwLock<HashMap<String, SensorRecord>>,
    readings: RwLock<HashMap<String, Vec<Measurement>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> GatewayError {
    GatewayError::Storage("memory store lock poisoned".into())
}

#[async_trait]
impl SensorStore for MemoryStore {
    async fn add_reading(&self, serial: &str, measurement: &Measurement) -> GatewayResult<()> {
        let mut readings = self.readings.write().map_err(poisoned)?;
        let series = readings.entry(serial.to_string()).or_default();

        // keep each series sorted; equal timestamps stay in arrival order
        let at = series.partition_point(|m| m.utc <= measurement.utc);
        series.insert(at, measurement.clone());
        Ok(())
    }

    async fn get_readings(&self, serial: &str, range: &TimeRange) -> GatewayResult<Vec<Measurement>> {
        let readings = self.readings.read().map_err(poisoned)?;
        Ok(readings
            .get(serial)
            .map(|series| series.iter().filter(|m| range.contains(&m.utc)).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_readings(&self, serial: &str) -> GatewayResult<()> {
        self.readings.write().map_err(poisoned)?.remove(serial);
        Ok(())
    }

    async fn add_sensor(&self, record: &SensorRecord) -> GatewayResult<()> {
        let mut sensors = self.sensors.write().map_err(poisoned)?;
        if sensors.contains_key(&record.serial) {
            return Err(GatewayError::Storage(format!("sensor [{}] already stored", record.serial)));
        }
        sensors.insert(record.serial.clone(), record.clone());
        Ok(())
    }

    async fn get_sensor(&self, serial: &str) -> GatewayResult<Option<SensorRecord>> {
        Ok(self.sensors.read().map_err(poisoned)?.get(serial).cloned())
    }

    async fn delete_sensor(&self, serial: &str) -> GatewayResult<()> {
        self.sensors.write().map_err(poisoned)?.remove(serial);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

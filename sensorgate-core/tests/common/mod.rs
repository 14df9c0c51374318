//! Shared fixtures for the core integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use sensorgate_core::{GatewayResult, Measurement, SensorRecord, SensorState, SensorStore, SensorType, TimeRange};

/// Minimal store that keeps everything in two maps
#[derive(Default)]
pub struct FakeStore {
    sensors: Mutex<HashMap<String, SensorRecord>>,
    readings: Mutex<Vec<(String, Measurement)>>,
}

impl FakeStore {
    pub fn reading_count(&self) -> usize {
        self.readings.lock().unwrap().len()
    }
}

#[async_trait]
impl SensorStore for FakeStore {
    async fn add_reading(&self, serial: &str, measurement: &Measurement) -> GatewayResult<()> {
        self.readings.lock().unwrap().push((serial.to_string(), measurement.clone()));
        Ok(())
    }

    async fn get_readings(&self, serial: &str, range: &TimeRange) -> GatewayResult<Vec<Measurement>> {
        // deliberately unordered: newest first
        let mut found: Vec<Measurement> = self
            .readings
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, m)| s == serial && range.contains(&m.utc))
            .map(|(_, m)| m.clone())
            .collect();
        found.reverse();
        Ok(found)
    }

    async fn delete_readings(&self, serial: &str) -> GatewayResult<()> {
        self.readings.lock().unwrap().retain(|(s, _)| s != serial);
        Ok(())
    }

    async fn add_sensor(&self, record: &SensorRecord) -> GatewayResult<()> {
        self.sensors.lock().unwrap().insert(record.serial.clone(), record.clone());
        Ok(())
    }

    async fn get_sensor(&self, serial: &str) -> GatewayResult<Option<SensorRecord>> {
        Ok(self.sensors.lock().unwrap().get(serial).cloned())
    }

    async fn delete_sensor(&self, serial: &str) -> GatewayResult<()> {
        self.sensors.lock().unwrap().remove(serial);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "fake"
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn patio_sensor(serial: &str) -> SensorRecord {
    let mut record = SensorRecord::new(serial, "patio", SensorType::Temperature, SensorState::Up);
    record.location = Some("PATIO".into());
    record
}

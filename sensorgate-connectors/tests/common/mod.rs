//! Shared fixtures for the connector integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use tower::ServiceExt;

use sensorgate_core::{
    FixedClock, FixedSensor, Measurement, SensorQueryService, SensorRecord, SensorState, SensorType,
};
use sensorgate_store::MemoryStore;

pub const SERIAL: &str = "28-000005e2fdc3";

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn clock() -> FixedClock {
    FixedClock::new(utc(2024, 3, 15, 12, 0))
}

/// Memory-backed service reading 21.5 degC from a fixed sensor
pub fn service(clock: &FixedClock) -> SensorQueryService {
    SensorQueryService::new(Arc::new(MemoryStore::new()))
        .with_clock(Arc::new(clock.clone()))
        .with_sensor(Arc::new(FixedSensor::new(21.5, "degC")))
}

pub fn service_without_sensor(clock: &FixedClock) -> SensorQueryService {
    SensorQueryService::new(Arc::new(MemoryStore::new())).with_clock(Arc::new(clock.clone()))
}

pub fn engine_sensor(serial: &str) -> SensorRecord {
    let mut record = SensorRecord::new(serial, "engine room", SensorType::Temperature, SensorState::Up);
    record.geolocation = Some("30.2672,-97.7431".into());
    record.address = Some("100 Main St".into());
    record.location = Some("ENGINE".into());
    record
}

/// Register [`SERIAL`] and store readings at 12:00 on each of the three
/// days before the clock, plus one an hour before it
pub async fn seed(service: &SensorQueryService) {
    service.register_sensor(&engine_sensor(SERIAL)).await.unwrap();
    for (value, at) in [
        (20.0, utc(2024, 3, 12, 12, 0)),
        (21.0, utc(2024, 3, 13, 12, 0)),
        (22.0, utc(2024, 3, 14, 12, 0)),
        (23.0, utc(2024, 3, 15, 11, 0)),
    ] {
        let reading = Measurement::new(value, "degC", at).unwrap();
        service.record_reading(SERIAL, &reading).await.unwrap();
    }
}

/// Send a GET through the router and decode the JSON answer
pub async fn get(app: &Router, uri: &str, accept: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }

    let response = app.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

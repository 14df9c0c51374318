//! Integration tests for the sensor query service
//!
//! Tests the service against a fake store and a fixed clock:
//! - Sensor registration rules
//! - Reading normalization and registration checks
//! - Duration-based history queries and their ordering

mod common;

use std::sync::Arc;

use chrono::Duration;

use sensorgate_core::{
    Clock, ErrorKind, FixedClock, FixedSensor, Measurement, SensorQueryService, SensorRecord,
    SensorState, SensorType,
};

use common::{patio_sensor, utc, FakeStore};

fn service_at(clock: &FixedClock) -> (Arc<FakeStore>, SensorQueryService) {
    let store = Arc::new(FakeStore::default());
    let service = SensorQueryService::new(store.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_sensor(Arc::new(FixedSensor::default()));
    (store, service)
}

#[tokio::test]
async fn test_register_and_lookup_sensor() {
    let clock = FixedClock::new(utc(2024, 3, 15, 0, 0));
    let (_, service) = service_at(&clock);

    service.register_sensor(&patio_sensor("28-01")).await.unwrap();
    let record = service.sensor("28-01").await.unwrap();
    assert_eq!(record.location.as_deref(), Some("PATIO"));

    let err = service.register_sensor(&patio_sensor("28-01")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("already registered"));

    let blank = SensorRecord::new("28-02", " ", SensorType::Temperature, SensorState::Up);
    assert!(service.register_sensor(&blank).await.is_err());

    assert_eq!(service.sensor("28-99").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_reading_requires_registered_sensor() {
    let clock = FixedClock::new(utc(2024, 3, 15, 0, 0));
    let (store, service) = service_at(&clock);

    let reading = Measurement::new(21.0, "degC", clock.now()).unwrap();
    let err = service.record_reading("28-01", &reading).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("not registered"));
    assert_eq!(store.reading_count(), 0);
}

#[tokio::test]
async fn test_readings_are_stored_in_reading_unit() {
    let clock = FixedClock::new(utc(2024, 3, 15, 0, 0));
    let (_, service) = service_at(&clock);
    service.register_sensor(&patio_sensor("28-01")).await.unwrap();

    let reading = Measurement::new(212.0, "degF", clock.now()).unwrap();
    let stored = service.record_reading("28-01", &reading).await.unwrap();

    assert_eq!(stored.unit, "degC");
    assert!((stored.value - 100.0).abs() < 1e-9);

    let wrong = Measurement::new(1.0, "meter", clock.now()).unwrap();
    assert!(service.record_reading("28-01", &wrong).await.is_err());
}

#[tokio::test]
async fn test_poll_once_stamps_with_service_clock() {
    let clock = FixedClock::new(utc(2024, 3, 15, 6, 30));
    let (store, service) = service_at(&clock);
    service.register_sensor(&patio_sensor("28-01")).await.unwrap();

    let stored = service.poll_once("28-01").await.unwrap();
    assert_eq!(stored.value, 100.0);
    assert_eq!(stored.utc, utc(2024, 3, 15, 6, 30));
    assert_eq!(store.reading_count(), 1);
}

#[tokio::test]
async fn test_history_query_is_closed_and_ascending() {
    let clock = FixedClock::new(utc(2024, 3, 1, 0, 0));
    let (_, service) = service_at(&clock);
    service.register_sensor(&patio_sensor("28-01")).await.unwrap();

    // one reading per day for ten days
    for day in 0..10 {
        let m = Measurement::new(20.0 + day as f64, "degC", clock.now()).unwrap();
        service.record_reading("28-01", &m).await.unwrap();
        clock.advance(Duration::days(1));
    }
    clock.advance(Duration::days(-1));

    // now is the last reading; last3Days starts exactly on a reading
    let history = service.readings("28-01", "LAST3DAYS").await.unwrap();
    let values: Vec<f64> = history.iter().map(|m| m.value).collect();
    assert_eq!(values, vec![26.0, 27.0, 28.0, 29.0]);
    assert!(history.windows(2).all(|w| w[0].utc <= w[1].utc));
}

#[tokio::test]
async fn test_history_query_validation() {
    let clock = FixedClock::new(utc(2024, 3, 15, 0, 0));
    let (_, service) = service_at(&clock);
    service.register_sensor(&patio_sensor("28-01")).await.unwrap();

    assert_eq!(service.readings("28-01", "").await.unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(service.readings("28-01", "banana").await.unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(service.readings("28-99", "lastDay").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(service.readings("28-01", "lastDay").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_sensor_and_readings() {
    let clock = FixedClock::new(utc(2024, 3, 15, 0, 0));
    let (store, service) = service_at(&clock);
    service.register_sensor(&patio_sensor("28-01")).await.unwrap();
    service.poll_once("28-01").await.unwrap();

    service.remove_readings("28-01").await.unwrap();
    assert_eq!(store.reading_count(), 0);

    service.remove_sensor("28-01").await.unwrap();
    assert_eq!(service.sensor("28-01").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_current_reading_without_driver() {
    let service = SensorQueryService::new(Arc::new(FakeStore::default()));
    let err = service.current_reading("28-01").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

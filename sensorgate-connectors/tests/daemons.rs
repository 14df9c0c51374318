//! Poller and MQTT message handling against real services
//!
//! The remote poller tests run the HTTP API on a loopback port and point the
//! client at it.

mod common;

use std::future::pending;
use std::time::Duration;

use chrono::Duration as Span;

use common::{clock, engine_sensor, service, service_without_sensor, utc, SERIAL};
use sensorgate_connectors::envelope::ReadingEnvelope;
use sensorgate_connectors::mqtt::{run_publisher, run_subscriber, store_message};
use sensorgate_connectors::server::{bind, router, serve};
use sensorgate_connectors::{ClientConfig, ConnectorError, Poller, ReadingSource, SensorClient};
use sensorgate_core::config::MqttConfig;
use sensorgate_core::{ApiGroup, ErrorKind, Measurement, TimeRange};

const INTERVAL: Duration = Duration::from_secs(60);

fn whole_day() -> TimeRange {
    TimeRange { start: utc(2024, 3, 15, 0, 0), end: utc(2024, 3, 16, 0, 0) }
}

/// Serve a gateway with a fixed sensor; returns the current-reading base URL
async fn spawn_remote() -> String {
    let listener = bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(service(&clock()), &ApiGroup::ALL);
    tokio::spawn(serve(listener, app, pending()));
    format!("http://{}/temperature/sensors", addr)
}

fn remote(url: &str) -> ReadingSource {
    let config = ClientConfig::new(url).basic_auth("collector", "secret").max_retries(0);
    ReadingSource::Remote(SensorClient::new(config).unwrap())
}

/// Broker settings pointing at a port nothing listens on
async fn unreachable_broker() -> MqttConfig {
    let port = bind("127.0.0.1:0").await.unwrap().local_addr().unwrap().port();
    MqttConfig { host: "127.0.0.1".into(), port, ..MqttConfig::default() }
}

#[tokio::test]
async fn test_local_poll_stores_reading() {
    let clock = clock();
    let service = service(&clock);
    service.register_sensor(&engine_sensor(SERIAL)).await.unwrap();

    let mut poller = Poller::new(service.clone(), SERIAL, ReadingSource::Local, INTERVAL);
    let stored = poller.poll_once().await.unwrap();
    assert_eq!(stored.value, 21.5);
    assert_eq!(stored.utc, utc(2024, 3, 15, 12, 0));

    clock.advance(Span::minutes(1));
    poller.poll_once().await.unwrap();

    let readings = service.readings_in(SERIAL, &whole_day()).await.unwrap();
    assert_eq!(readings.len(), 2);
    assert!(!poller.latch().is_failing());
}

#[tokio::test]
async fn test_local_poll_failures_latch_until_recovery() {
    let service = service(&clock());
    let mut poller = Poller::new(service.clone(), SERIAL, ReadingSource::Local, INTERVAL);

    // not registered yet
    for _ in 0..3 {
        assert!(poller.poll_once().await.is_err());
    }
    assert!(poller.latch().is_failing());
    assert_eq!(poller.latch().consecutive_failures(), 3);

    service.register_sensor(&engine_sensor(SERIAL)).await.unwrap();
    poller.poll_once().await.unwrap();
    assert!(!poller.latch().is_failing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_poll_stores_fetched_reading() {
    let url = spawn_remote().await;

    // the collector has no sensor driver of its own
    let collector = service_without_sensor(&clock());
    collector.register_sensor(&engine_sensor(SERIAL)).await.unwrap();

    let mut poller = Poller::new(collector.clone(), SERIAL, remote(&url), INTERVAL);
    let stored = poller.poll_once().await.unwrap();
    assert_eq!(stored.value, 21.5);
    assert_eq!(stored.unit, "degC");

    let readings = collector.readings_in(SERIAL, &whole_day()).await.unwrap();
    assert_eq!(readings, vec![stored]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_poll_unreachable_source() {
    // bind and release a port so nothing listens on it
    let addr = bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let url = format!("http://{}/temperature/sensors", addr);

    let collector = service_without_sensor(&clock());
    collector.register_sensor(&engine_sensor(SERIAL)).await.unwrap();

    let mut poller = Poller::new(collector.clone(), SERIAL, remote(&url), INTERVAL);
    let err = poller.poll_once().await.unwrap_err();
    assert!(matches!(err, ConnectorError::Http(_)), "{:?}", err);
    assert!(poller.latch().is_failing());
    assert!(collector.readings_in(SERIAL, &whole_day()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mqtt_message_is_stored_in_reading_unit() {
    let service = service_without_sensor(&clock());
    service.register_sensor(&engine_sensor(SERIAL)).await.unwrap();

    let reading = Measurement::new(212.0, "degF", utc(2024, 3, 15, 9, 30)).unwrap();
    let payload = serde_json::to_vec(&ReadingEnvelope::success(SERIAL, reading)).unwrap();

    let stored = store_message(&service, &payload).await.unwrap();
    assert_eq!(stored.unit, "degC");
    assert!((stored.value - 100.0).abs() < 1e-9);

    let readings = service.readings_in(SERIAL, &whole_day()).await.unwrap();
    assert_eq!(readings, vec![stored]);
}

#[tokio::test]
async fn test_mqtt_message_for_unregistered_sensor_is_rejected() {
    let service = service_without_sensor(&clock());

    let reading = Measurement::new(20.0, "degC", utc(2024, 3, 15, 9, 30)).unwrap();
    let payload = serde_json::to_vec(&ReadingEnvelope::success("28-stranger", reading)).unwrap();

    match store_message(&service, &payload).await {
        Err(ConnectorError::Gateway(e)) => assert_eq!(e.kind(), ErrorKind::InvalidArgument),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        store_message(&service, b"garbage").await,
        Err(ConnectorError::Payload(_))
    ));
}

#[tokio::test]
async fn test_mqtt_subscriber_stops_promptly_while_broker_is_down() {
    let config = unreachable_broker().await;
    let stop = tokio::time::sleep(Duration::from_millis(200));

    // well inside the reconnect delay
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        run_subscriber(service_without_sensor(&clock()), &config, stop),
    )
    .await;
    assert!(matches!(outcome, Ok(Ok(()))), "{:?}", outcome);
}

#[tokio::test]
async fn test_mqtt_publisher_skips_readings_while_broker_is_down() {
    let config = unreachable_broker().await;
    let stop = tokio::time::sleep(Duration::from_millis(300));

    // far more ticks than the client buffers; none of them may block the loop
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        run_publisher(service(&clock()), SERIAL, &config, Duration::from_millis(5), stop),
    )
    .await;
    assert!(matches!(outcome, Ok(Ok(()))), "{:?}", outcome);
}

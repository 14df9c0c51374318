//! MQTT publisher and subscriber
//!
//! Both sides speak the current-reading envelope on one topic:
//!
//! ```text
//! sensor host                      broker                     collector
//! run_publisher --(QoS 0)--> sensorgate/temperature --> run_subscriber --> store
//! ```
//!
//! The publisher reads the local sensor every poll interval. Messages are
//! published at most once and never retained; a reading missed while the
//! broker is down is simply gone. The subscriber validates each payload and
//! stores it for the serial named in the envelope, which must be registered.
//!
//! rumqttc reconnects on the next `poll()` after a connection error, so both
//! loops just wait [`RECONNECT_DELAY`] and keep polling. The subscriber
//! subscribes again on every `ConnAck`. The publisher skips readings while
//! the broker is down; rumqttc only drains its request channel while
//! connected, so publishing anyway would eventually block the loop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use sensorgate_core::config::MqttConfig;
use sensorgate_core::{Measurement, SensorQueryService};

use crate::envelope::ReadingEnvelope;
use crate::latch::FailureLatch;
use crate::{AsyncConnector, ConnectionStats, ConnectorError};

/// Pause after a connection error before polling the event loop again
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Smallest keep-alive the client accepts
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Requests buffered between the client handle and the event loop
const REQUEST_CAPACITY: usize = 10;

/// MQTT-specific errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Client options for one role; `role` keeps publisher and subscriber ids apart
pub fn mqtt_options(config: &MqttConfig, role: &str) -> MqttOptions {
    let mut options = MqttOptions::new(format!("{}-{}", config.client_id, role), &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs).max(MIN_KEEP_ALIVE));
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }
    options
}

/// Publishing side of an MQTT connection
///
/// The event loop runs in its own task for as long as the publisher lives.
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    reconnections: Arc<AtomicU32>,
    stats: ConnectionStats,
    driver: JoinHandle<()>,
}

impl MqttPublisher {
    /// Start the connection; returns before the broker has answered
    pub fn connect(config: &MqttConfig) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config, "pub"), REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let reconnections = Arc::new(AtomicU32::new(0));

        let driver = tokio::spawn(drive(eventloop, connected.clone(), reconnections.clone()));
        info!("MQTT publisher connecting to {}:{}", config.host, config.port);

        Self {
            client,
            connected,
            reconnections,
            stats: ConnectionStats::default(),
            driver,
        }
    }

    /// Publish the current-reading envelope for `serial`
    pub async fn publish_reading(
        &mut self,
        topic: &str,
        serial: &str,
        reading: &Measurement,
    ) -> Result<(), MqttError> {
        let payload = serde_json::to_vec(&ReadingEnvelope::success(serial, reading.clone()))?;
        self.send(topic, &payload).await
    }

    /// Ask the broker to close the session and stop the event loop task
    pub async fn disconnect(self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect: {}", e);
        }
        self.driver.abort();
    }
}

async fn drive(mut eventloop: EventLoop, connected: Arc<AtomicBool>, reconnections: Arc<AtomicU32>) {
    let mut latch = FailureLatch::default();
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if latch.succeed() {
                    reconnections.fetch_add(1, Ordering::Relaxed);
                    info!("MQTT publisher reconnected");
                } else {
                    info!("MQTT publisher connected");
                }
                connected.store(true, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::Relaxed);
                report_connection_error(&mut latch, "publisher", &e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn report_connection_error(latch: &mut FailureLatch, role: &str, err: &rumqttc::ConnectionError) {
    if latch.fail() {
        error!("MQTT {} connection failed: {}", role, err);
    } else {
        debug!("MQTT {} still disconnected: {}", role, err);
    }
}

#[async_trait::async_trait]
impl AsyncConnector for MqttPublisher {
    type Error = MqttError;

    async fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error> {
        match self.client.publish(topic, QoS::AtMostOnce, false, data.to_vec()).await {
            Ok(()) => {
                self.stats.record_success(data.len());
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure(&e);
                Err(e.into())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            reconnections: self.reconnections.load(Ordering::Relaxed),
            ..self.stats.clone()
        }
    }
}

/// Read the local sensor every `interval` and publish until `shutdown` resolves
pub async fn run_publisher<F>(
    service: SensorQueryService,
    serial: &str,
    config: &MqttConfig,
    interval: Duration,
    shutdown: F,
) -> Result<(), ConnectorError>
where
    F: Future<Output = ()>,
{
    let mut publisher = MqttPublisher::connect(config);
    let mut latch = FailureLatch::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                if !publisher.is_connected() {
                    debug!("broker not connected, skipping reading of sensor [{}]", serial);
                    continue;
                }
                let outcome = match service.current_reading(serial) {
                    Ok(reading) => publisher
                        .publish_reading(&config.topic, serial, &reading)
                        .await
                        .map_err(ConnectorError::from),
                    Err(e) => Err(e.into()),
                };
                match outcome {
                    Ok(()) => {
                        if latch.succeed() {
                            info!("publishing sensor [{}] resumed", serial);
                        }
                    }
                    Err(e) if latch.fail() => error!("publishing sensor [{}] failed: {}", serial, e),
                    Err(e) => debug!("publishing sensor [{}] still failing: {}", serial, e),
                }
            }
        }
    }

    let stats = publisher.stats();
    info!(
        "MQTT publisher stopping: {} sent, {} failed",
        stats.messages_sent, stats.messages_failed
    );
    publisher.disconnect().await;
    Ok(())
}

/// Parse one received payload into the serial and reading it carries
pub fn handle_message(payload: &[u8]) -> Result<(String, Measurement), ConnectorError> {
    Ok(ReadingEnvelope::from_slice(payload)?.into_parts())
}

/// Parse and store one received payload
pub async fn store_message(service: &SensorQueryService, payload: &[u8]) -> Result<Measurement, ConnectorError> {
    let (serial, reading) = handle_message(payload)?;
    Ok(service.record_reading(&serial, &reading).await?)
}

/// Store every reading received on the configured topic until `shutdown` resolves
pub async fn run_subscriber<F>(
    service: SensorQueryService,
    config: &MqttConfig,
    shutdown: F,
) -> Result<(), ConnectorError>
where
    F: Future<Output = ()>,
{
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(config, "sub"), REQUEST_CAPACITY);
    let mut latch = FailureLatch::default();
    tokio::pin!(shutdown);
    info!("MQTT subscriber connecting to {}:{}", config.host, config.port);

    loop {
        let failed = tokio::select! {
            _ = &mut shutdown => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    latch.succeed();
                    match client.subscribe(config.topic.as_str(), QoS::AtMostOnce).await {
                        Ok(()) => info!("subscribed to [{}]", config.topic),
                        Err(e) if latch.fail() => error!("subscribing to [{}] failed: {}", config.topic, e),
                        Err(e) => debug!("subscribing to [{}] still failing: {}", config.topic, e),
                    }
                    false
                }
                Ok(Event::Incoming(Packet::Publish(message))) => {
                    match store_message(&service, &message.payload).await {
                        Ok(stored) => debug!(
                            "stored reading from [{}]: {} {} at {}",
                            message.topic, stored.value, stored.unit, stored.utc_string()
                        ),
                        Err(e) => warn!("dropping message on [{}]: {}", message.topic, e),
                    }
                    false
                }
                Ok(_) => false,
                Err(e) => {
                    report_connection_error(&mut latch, "subscriber", &e);
                    true
                }
            }
        };

        if failed {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    info!("MQTT subscriber stopping");
    if let Err(e) = client.disconnect().await {
        debug!("MQTT disconnect: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = MqttConfig {
            host: "broker.local".into(),
            port: 1884,
            client_id: "gw".into(),
            keep_alive_secs: 1,
            ..MqttConfig::default()
        };

        let options = mqtt_options(&config, "sub");
        assert_eq!(options.client_id(), "gw-sub");
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.keep_alive(), MIN_KEEP_ALIVE);
    }

    #[tokio::test]
    async fn test_publisher_starts_disconnected() {
        // nothing listens on a released port
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let config = MqttConfig { host: "127.0.0.1".into(), port, ..MqttConfig::default() };

        let publisher = MqttPublisher::connect(&config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!publisher.is_connected());
        assert_eq!(publisher.stats(), ConnectionStats::default());
        publisher.disconnect().await;
    }

    #[test]
    fn test_handle_message() {
        let payload = br#"{"status":"success","sensor":{"serial":"28-01"},
            "data":{"utc":"2024-03-15T10:00:00.000000+00:00","value":21.5,"unit":"degC"}}"#;
        let (serial, reading) = handle_message(payload).unwrap();
        assert_eq!(serial, "28-01");
        assert_eq!(reading.value, 21.5);
        assert_eq!(reading.unit, "degC");

        assert!(handle_message(b"{}").is_err());
        assert!(handle_message(b"21.5").is_err());
    }
}

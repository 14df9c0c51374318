//! Front ends for the SensorGate telemetry gateway
//!
//! ## Overview
//!
//! Everything here is a thin adapter around
//! [`SensorQueryService`](sensorgate_core::SensorQueryService). The service
//! validates and stores; connectors move readings and requests in and out.
//!
//! ### HTTP (`http` feature)
//!
//! - [`server`]: axum read API. Unit conversions, product information,
//!   current sensor reading, sensor record and reading history.
//! - [`client`]: blocking ureq client the poller uses to fetch the current
//!   reading from another gateway.
//!
//! ### MQTT (`mqtt` feature)
//!
//! - [`mqtt::MqttPublisher`] reads the local sensor every poll interval and
//!   publishes the current-reading envelope.
//! - [`mqtt::run_subscriber`] stores every reading received on the topic.
//!
//! ### Polling
//!
//! `poller::Poller` reads locally or remotely on an interval and stores the
//! result. Failures are reported loudly once, then quietly until the source
//! recovers.
//!
//! ## Wire format
//!
//! All three transports share the JSON envelopes in [`envelope`]:
//!
//! ```json
//! {"status": "success",
//!  "sensor": {"serial": "28-000005e2fdc3"},
//!  "data": {"utc": "2024-03-15T10:00:00.000000+00:00", "value": 21.5, "unit": "degC"}}
//! ```
//!
//! ## Retry
//!
//! The HTTP client retries transport failures, 429 and 5xx answers with
//! exponential backoff:
//! ```text
//! retry_delay = 100ms * 2^attempt
//! ```

#![deny(unsafe_code)]

pub mod envelope;
pub mod latch;
pub mod logging;

#[cfg(feature = "http")]
pub mod client;

#[cfg(feature = "http")]
pub mod server;

#[cfg(feature = "http")]
pub mod poller;

#[cfg(feature = "mqtt")]
pub mod mqtt;

// Re-export common types
pub use envelope::{ErrorEnvelope, HistoryEnvelope, ReadingEnvelope};
pub use latch::FailureLatch;

#[cfg(feature = "http")]
pub use client::{ClientConfig, HttpError, SensorClient};

#[cfg(feature = "http")]
pub use poller::{Poller, ReadingSource};

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttError, MqttPublisher};

use sensorgate_core::GatewayError;
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[cfg(feature = "http")]
    #[error(transparent)]
    Http(#[from] HttpError),

    #[cfg(feature = "mqtt")]
    #[error(transparent)]
    Mqtt(#[from] MqttError),
}

/// Outbound message transport
#[async_trait::async_trait]
pub trait AsyncConnector: Send {
    type Error;

    /// Send one payload
    async fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Get connection statistics
    fn stats(&self) -> ConnectionStats;
}

/// Connection statistics common to all connectors
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConnectionStats {
    /// Total messages sent successfully
    pub messages_sent: u64,
    /// Total messages failed to send
    pub messages_failed: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Number of reconnections
    pub reconnections: u32,
    /// Last error message
    pub last_error: Option<String>,
}

impl ConnectionStats {
    pub(crate) fn record_success(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_failure(&mut self, error: impl ToString) {
        self.messages_failed += 1;
        self.last_error = Some(error.to_string());
    }
}

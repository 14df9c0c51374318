//! HTTP client for remote gateways
//!
//! The poller uses this to pull the current reading of a sensor from another
//! SensorGate instance:
//!
//! ```text
//! GET {base_url}/{serial}    Accept: application/json
//! Authorization: Basic base64(user:password)
//! ```
//!
//! ureq is blocking, so every attempt runs on the blocking pool. Failed
//! attempts are retried when the failure is plausibly transient:
//! - transport errors (refused, reset, timed out)
//! - 429 and 5xx answers
//!
//! Other 4xx answers fail immediately.
//!
//! ## Example Usage
//!
//! ```no_run
//! use sensorgate_connectors::client::{ClientConfig, SensorClient};
//!
//! # async fn example() -> Result<(), sensorgate_connectors::ConnectorError> {
//! let config = ClientConfig::new("http://gateway.local:8080/temperature/sensors")
//!     .basic_auth("collector", "secret")
//!     .timeout_secs(10);
//!
//! let client = SensorClient::new(config)?;
//! let (serial, reading) = client.fetch_current("28-000005e2fdc3").await?;
//! println!("{} read {} {}", serial, reading.value, reading.unit);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use log::{debug, warn};
use thiserror::Error;

use sensorgate_core::config::SensorConfig;
use sensorgate_core::Measurement;

use crate::envelope::ReadingEnvelope;
use crate::{ConnectionStats, ConnectorError};

/// HTTP-specific errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(String),

    /// Server returned error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL the serial is appended to
    pub base_url: String,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub auth: AuthMethod,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub user_agent: String,
}

/// Authentication methods
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMethod {
    None,
    Basic { username: String, password: String },
}

impl ClientConfig {
    /// Create new configuration with base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            auth: AuthMethod::None,
            max_retries: 3,
            user_agent: format!("SensorGate/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Build from the `[sensor]` section; `None` when no remote source is set
    pub fn from_sensor_config(sensor: &SensorConfig) -> Option<Self> {
        let url = sensor.source_url.as_ref()?;
        let mut config = Self::new(url.clone()).timeout_secs(sensor.request_timeout_secs);
        if let Some(username) = &sensor.username {
            config = config.basic_auth(username.clone(), sensor.password.clone().unwrap_or_default());
        }
        Some(config)
    }

    /// Set basic authentication
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Basic {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Set request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Outcome of one blocking attempt
enum Attempt {
    Body(String),
    Retry(HttpError),
    Fail(HttpError),
}

/// Current-reading client using the ureq agent
pub struct SensorClient {
    config: ClientConfig,
    agent: ureq::Agent,
    stats: Arc<Mutex<ConnectionStats>>,
}

impl SensorClient {
    /// Create new client
    pub fn new(config: ClientConfig) -> Result<Self, HttpError> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(HttpError::Config("Base URL must start with http:// or https://".into()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();

        Ok(Self {
            config,
            agent,
            stats: Arc::new(Mutex::new(ConnectionStats::default())),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// URL of the current-reading resource for `serial`
    pub fn reading_url(&self, serial: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), serial)
    }

    /// Fetch and check the current-reading envelope for `serial`
    ///
    /// Returns the serial the remote gateway answered for, which is the one
    /// the reading is stored under.
    pub async fn fetch_current(&self, serial: &str) -> Result<(String, Measurement), ConnectorError> {
        let url = self.reading_url(serial);
        debug!("requesting current reading from [{}]", url);
        let body = self.get_with_retry(&url).await?;
        Ok(ReadingEnvelope::from_slice(body.as_bytes())?.into_parts())
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// `Authorization` header value, if any
    pub fn authorization(&self) -> Option<String> {
        match &self.config.auth {
            AuthMethod::None => None,
            AuthMethod::Basic { username, password } => {
                let credentials =
                    base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
                Some(format!("Basic {}", credentials))
            }
        }
    }

    fn build_request(&self, mut request: ureq::Request) -> ureq::Request {
        if let Some(value) = self.authorization() {
            request = request.set("Authorization", &value);
        }
        request.set("Accept", "application/json")
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, HttpError> {
        let request = self.build_request(self.agent.get(url));
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (1u64 << attempt.min(10)));
                tokio::time::sleep(delay).await;
            }

            let request = request.clone();
            let outcome = tokio::task::spawn_blocking(move || call_once(request))
                .await
                .map_err(|e| HttpError::Request(e.to_string()))?;

            match outcome {
                Attempt::Body(text) => {
                    self.update_stats(|s| s.record_success(text.len()));
                    return Ok(text);
                }
                Attempt::Retry(err) => {
                    debug!("attempt {} against [{}] failed: {}", attempt + 1, url, err);
                    last_error = Some(err);
                }
                Attempt::Fail(err) => {
                    self.update_stats(|s| s.record_failure(&err));
                    return Err(err);
                }
            }
        }

        // All retries exhausted
        let err = last_error.unwrap_or_else(|| HttpError::Request("Unknown error".into()));
        warn!("giving up on [{}] after {} attempts", url, self.config.max_retries + 1);
        self.update_stats(|s| s.record_failure(&err));
        Err(err)
    }

    fn update_stats(&self, f: impl FnOnce(&mut ConnectionStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

fn call_once(request: ureq::Request) -> Attempt {
    match request.call() {
        Ok(resp) => match resp.into_string() {
            Ok(text) => Attempt::Body(text),
            Err(e) => Attempt::Retry(HttpError::Request(e.to_string())),
        },
        Err(ureq::Error::Status(code, resp)) => {
            let err = HttpError::ServerError {
                status: code,
                message: resp.into_string().unwrap_or_default(),
            };
            // Server error or rate limit
            if code >= 500 || code == 429 {
                Attempt::Retry(err)
            } else {
                Attempt::Fail(err)
            }
        }
        Err(ureq::Error::Transport(e)) => Attempt::Retry(HttpError::Request(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("https://gateway.example.com/temperature/sensors")
            .basic_auth("collector", "secret")
            .timeout_secs(60)
            .max_retries(1);

        assert_eq!(config.base_url, "https://gateway.example.com/temperature/sensors");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 1);

        match config.auth {
            AuthMethod::Basic { username, password } => {
                assert_eq!(username, "collector");
                assert_eq!(password, "secret");
            }
            _ => panic!("Wrong auth method"),
        }
    }

    #[test]
    fn test_url_validation() {
        let result = SensorClient::new(ClientConfig::new("not-a-url"));
        assert!(result.is_err());

        let result = SensorClient::new(ClientConfig::new("https://valid.url"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_reading_url_and_authorization() {
        let client =
            SensorClient::new(ClientConfig::new("http://gw:8080/temperature/sensors/").basic_auth("user", "pass"))
                .unwrap();
        assert_eq!(client.reading_url("28-01"), "http://gw:8080/temperature/sensors/28-01");
        assert_eq!(client.authorization().as_deref(), Some("Basic dXNlcjpwYXNz"));

        let anonymous = SensorClient::new(ClientConfig::new("http://gw:8080")).unwrap();
        assert_eq!(anonymous.authorization(), None);
    }

    #[test]
    fn test_from_sensor_config() {
        let mut sensor = SensorConfig::default();
        assert!(ClientConfig::from_sensor_config(&sensor).is_none());

        sensor.source_url = Some("http://gw:8080/temperature/sensors".into());
        sensor.username = Some("user".into());
        sensor.request_timeout_secs = 5;
        let config = ClientConfig::from_sensor_config(&sensor).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.auth,
            AuthMethod::Basic { username: "user".into(), password: String::new() }
        );
    }
}

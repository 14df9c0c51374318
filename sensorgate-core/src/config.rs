//! Gateway configuration
//!
//! One TOML file configures every process. All sections and keys are
//! optional; a missing file section takes the defaults below.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [storage]
//! backend = "sqlite"            # sqlite | document | memory
//! sqlite_path = "sensorgate.db"
//!
//! [sensor]
//! serial = "28-000005e2fdc3"
//! driver = "w1"                 # w1 | fixed
//! unit = "degC"
//! poll_interval_secs = 60
//!
//! [mqtt]
//! host = "localhost"
//! topic = "sensorgate/temperature"
//!
//! [http]
//! bind = "0.0.0.0:8080"
//! apis = ["TEMPERATURE", "WEIGHT", "LENGTH"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, GatewayResult};
use crate::sensor::{DEFAULT_TEMPERATURE_UNIT, W1_DEVICES_DIR};
use crate::units::{Dimension, UnitConverter};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// `[logging]`
    pub logging: LoggingConfig,
    /// `[storage]`
    pub storage: StorageConfig,
    /// `[sensor]`
    pub sensor: SensorConfig,
    /// `[mqtt]`
    pub mqtt: MqttConfig,
    /// `[http]`
    pub http: HttpConfig,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

/// Which persistence backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database file
    Sqlite,
    /// JSON files in a directory
    Document,
    /// Process memory; nothing survives a restart
    Memory,
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to open
    pub backend: StorageBackend,
    /// Database file for the `sqlite` backend
    pub sqlite_path: PathBuf,
    /// Collection directory for the `document` backend
    pub document_dir: PathBuf,
    /// Pool size for the `sqlite` backend
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: PathBuf::from("sensorgate.db"),
            document_dir: PathBuf::from("sensorgate-data"),
            max_connections: 4,
        }
    }
}

/// Which sensor driver reads local probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorDriver {
    /// DS18B20 through 1-Wire sysfs
    W1,
    /// Constant value, for testing
    Fixed,
}

/// Local sensor and polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Serial of the sensor the daemons collect from
    pub serial: String,
    /// Driver for local reads
    pub driver: SensorDriver,
    /// 1-Wire sysfs device directory
    pub w1_devices_dir: PathBuf,
    /// Unit readings are reported and stored in
    pub unit: String,
    /// Value reported by the `fixed` driver
    pub fixed_value: f64,
    /// Seconds between polls and publishes
    pub poll_interval_secs: u64,
    /// Remote gateway to poll instead of reading locally
    pub source_url: Option<String>,
    /// Basic auth user for `source_url`
    pub username: Option<String>,
    /// Basic auth password for `source_url`
    pub password: Option<String>,
    /// Per-request timeout against `source_url`
    pub request_timeout_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            serial: String::new(),
            driver: SensorDriver::W1,
            w1_devices_dir: PathBuf::from(W1_DEVICES_DIR),
            unit: DEFAULT_TEMPERATURE_UNIT.to_string(),
            fixed_value: 100.0,
            poll_interval_secs: 60,
            source_url: None,
            username: None,
            password: None,
            request_timeout_secs: 10,
        }
    }
}

/// Broker connection settings shared by publisher and subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Prefix of the client id; the role is appended
    pub client_id: String,
    /// Optional broker credentials
    pub username: Option<String>,
    /// Password for `username`; empty when unset
    pub password: Option<String>,
    /// Topic readings are published on and subscribed to
    pub topic: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "sensorgate".to_string(),
            username: None,
            password: None,
            topic: "sensorgate/temperature".to_string(),
            keep_alive_secs: 60,
        }
    }
}

/// Groups of HTTP routes that can be switched on individually
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiGroup {
    /// `/temperature/{unit}` conversion
    Temperature,
    /// `/weight/{unit}` conversion
    Weight,
    /// `/length/{unit}` conversion
    Length,
    /// `/information/product`
    ProductInfo,
    /// `/temperature/sensors/{serial}`
    SensorTemperature,
    /// `/information/sensors/{serial}`
    SensorInfo,
    /// `/analytics/temperature/sensors/{serial}`
    SensorTemperatureAnalytics,
}

impl ApiGroup {
    /// Every group, in route table order
    pub const ALL: [ApiGroup; 7] = [
        ApiGroup::Temperature,
        ApiGroup::Weight,
        ApiGroup::Length,
        ApiGroup::ProductInfo,
        ApiGroup::SensorTemperature,
        ApiGroup::SensorInfo,
        ApiGroup::SensorTemperatureAnalytics,
    ];
}

/// HTTP read API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address
    pub bind: String,
    /// Route groups to mount
    pub apis: Vec<ApiGroup>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            apis: ApiGroup::ALL.to_vec(),
        }
    }
}

impl HttpConfig {
    /// Whether `api` is mounted
    pub fn is_enabled(&self, api: ApiGroup) -> bool {
        self.apis.contains(&api)
    }
}

impl GatewayConfig {
    /// Read, parse and validate a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Configuration(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> GatewayResult<Self> {
        let config: GatewayConfig =
            toml::from_str(content).map_err(|e| GatewayError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> GatewayResult<()> {
        let fail = |msg: String| -> GatewayResult<()> { Err(GatewayError::Configuration(msg)) };

        if self.sensor.poll_interval_secs == 0 {
            return fail("sensor.poll_interval_secs must be greater than zero".into());
        }
        if self.sensor.request_timeout_secs == 0 {
            return fail("sensor.request_timeout_secs must be greater than zero".into());
        }
        if !UnitConverter::new().is_unit_of(Dimension::Temperature, &self.sensor.unit) {
            return fail(format!("sensor.unit [{}] is not a temperature unit", self.sensor.unit));
        }
        if self.mqtt.topic.trim().is_empty() {
            return fail("mqtt.topic must not be blank".into());
        }
        if self.storage.max_connections == 0 {
            return fail("storage.max_connections must be greater than zero".into());
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.sqlite_path.as_os_str().is_empty() {
            return fail("storage.sqlite_path must be set for the sqlite backend".into());
        }
        if self.storage.backend == StorageBackend::Document && self.storage.document_dir.as_os_str().is_empty() {
            return fail("storage.document_dir must be set for the document backend".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = GatewayConfig::from_toml_str("").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.http.apis.len(), 7);
        assert_eq!(config.sensor.unit, "degC");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = GatewayConfig::from_toml_str(
            r#"
            [storage]
            backend = "memory"

            [sensor]
            serial = "28-01"
            driver = "fixed"

            [http]
            apis = ["TEMPERATURE", "SENSOR_TEMPERATURE_ANALYTICS"]
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.sensor.driver, SensorDriver::Fixed);
        assert_eq!(config.sensor.poll_interval_secs, 60);
        assert!(config.http.is_enabled(ApiGroup::SensorTemperatureAnalytics));
        assert!(!config.http.is_enabled(ApiGroup::Weight));
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        for text in [
            "[storage]\nbackend = \"oracle\"",
            "[sensor]\ndriver = \"i2c\"",
            "[http]\napis = [\"VOLUME\"]",
        ] {
            let err = GatewayConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, GatewayError::Configuration(_)), "{text}");
        }
    }

    #[test]
    fn cross_field_checks() {
        assert!(GatewayConfig::from_toml_str("[sensor]\npoll_interval_secs = 0").is_err());
        assert!(GatewayConfig::from_toml_str("[sensor]\nunit = \"meter\"").is_err());
        assert!(GatewayConfig::from_toml_str("[mqtt]\ntopic = \" \"").is_err());
        assert!(GatewayConfig::from_toml_str("[sensor]\nunit = \"DEGF\"").is_ok());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensorgate.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = GatewayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.logging.level, "debug");

        let missing = GatewayConfig::load_from_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(GatewayError::Configuration(_))));
    }
}

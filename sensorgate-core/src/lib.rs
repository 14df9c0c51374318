//! Core of the SensorGate telemetry gateway
//!
//! Two pure engines sit at the bottom:
//! - [`UnitConverter`]: validated conversion between length, mass and
//!   temperature units, with the reporting precision policy
//! - [`DurationResolver`]: duration keywords to closed time ranges against an
//!   injectable clock
//!
//! [`SensorQueryService`] composes them with a [`SensorStore`] and a
//! [`TemperatureSensor`]; the HTTP, MQTT and polling front ends only talk to
//! the service.
//!
//! ```no_run
//! use sensorgate_core::{Dimension, DurationResolver, UnitConverter};
//!
//! let converter = UnitConverter::new();
//! let result = converter.convert(Dimension::Temperature, "degC", "18", "degF").unwrap();
//! assert_eq!(result.to_value, 64.4);
//!
//! let range = DurationResolver::new().resolve("last24Hours").unwrap();
//! assert!(range.start < range.end);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod duration;
pub mod errors;
pub mod measurement;
pub mod sensor;
pub mod service;
pub mod time;
pub mod traits;
pub mod units;

// Public API
pub use config::{ApiGroup, GatewayConfig, SensorDriver, StorageBackend, StorageConfig};
pub use duration::{DurationKeyword, DurationResolver, TimeRange};
pub use errors::{ErrorKind, GatewayError, GatewayResult};
pub use measurement::{Measurement, RawReading, SensorRecord, SensorState, SensorType};
pub use sensor::{FixedSensor, W1ThermSensor};
pub use service::SensorQueryService;
pub use time::{Clock, FixedClock, SystemClock};
pub use traits::{SensorStore, TemperatureSensor};
pub use units::{ConversionRequest, ConversionResult, Dimension, NumericLiteral, UnitConverter};

/// Crate version, reported as the product version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name reported by the product information endpoint
pub const PRODUCT_NAME: &str = "sensorgate";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}

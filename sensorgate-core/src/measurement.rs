//! Readings and the sensors that produce them

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{GatewayError, GatewayResult};
use crate::time::{format_utc, parse_utc};

/// A timestamped reading in a named unit
///
/// Serialized as `{"utc": "...", "value": 21.5, "unit": "degC"}` with the
/// timestamp in the fixed stored layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// When the reading was taken
    #[serde(serialize_with = "serialize_utc", deserialize_with = "deserialize_utc")]
    pub utc: DateTime<Utc>,
    /// Finite magnitude
    pub value: f64,
    /// Unit name, e.g. `degC`
    pub unit: String,
}

impl Measurement {
    /// Build a validated measurement, timestamp truncated to microseconds
    pub fn new(value: f64, unit: impl Into<String>, utc: DateTime<Utc>) -> GatewayResult<Self> {
        let measurement = Self { utc: utc.trunc_subsecs(6), value, unit: unit.into() };
        measurement.validate()?;
        Ok(measurement)
    }

    /// Finite value and non-blank unit
    pub fn validate(&self) -> GatewayResult<()> {
        if !self.value.is_finite() {
            return Err(GatewayError::invalid("value", self.value.to_string(), "A finite value must be provided."));
        }
        if self.unit.trim().is_empty() {
            return Err(GatewayError::invalid("unit", self.unit.clone(), "A unit must be provided."));
        }
        Ok(())
    }

    /// Timestamp in the stored layout
    pub fn utc_string(&self) -> String {
        format_utc(&self.utc)
    }
}

fn serialize_utc<S: Serializer>(utc: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_utc(utc))
}

fn deserialize_utc<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_utc(&raw).map_err(serde::de::Error::custom)
}

/// What a sensor driver hands back before a timestamp is attached
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    /// Value as read
    pub value: f64,
    /// Unit the driver reports in
    pub unit: String,
}

impl RawReading {
    /// Untimed reading
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self { value, unit: unit.into() }
    }

    /// Attach a timestamp
    pub fn at(self, utc: DateTime<Utc>) -> GatewayResult<Measurement> {
        Measurement::new(self.value, self.unit, utc)
    }
}

/// Operational state of a registered sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorState {
    /// Reporting normally
    Up,
    /// Switched off or failing
    Down,
    /// Not reachable from the gateway
    Disconnected,
    /// Never reported
    Unknown,
}

/// Kind of quantity a sensor measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorType {
    /// Thermometer
    Temperature,
    /// Relative humidity sensor
    Humidity,
}

macro_rules! upper_case_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Upper-case wire name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = GatewayError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(GatewayError::invalid(
                        $field,
                        s,
                        concat!("One of [", $($text, " ",)+ "] must be provided."),
                    )),
                }
            }
        }
    };
}

upper_case_enum!(SensorState, "state", {
    Up => "UP",
    Down => "DOWN",
    Disconnected => "DISCONNECTED",
    Unknown => "UNKNOWN",
});

upper_case_enum!(SensorType, "type", {
    Temperature => "TEMPERATURE",
    Humidity => "HUMIDITY",
});

/// A sensor registered with the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    /// Unique key
    pub serial: String,
    /// What the sensor measures; `type` on the wire
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    /// Display name
    pub name: String,
    /// Last known state
    pub state: SensorState,
    /// `lat,lon` as free text
    #[serde(default)]
    pub geolocation: Option<String>,
    /// Street address
    #[serde(default)]
    pub address: Option<String>,
    /// Where on the site, e.g. `ENGINE`
    #[serde(default)]
    pub location: Option<String>,
    /// Free text
    #[serde(default)]
    pub description: Option<String>,
}

impl SensorRecord {
    /// Record with only the required fields set
    pub fn new(
        serial: impl Into<String>,
        name: impl Into<String>,
        sensor_type: SensorType,
        state: SensorState,
    ) -> Self {
        Self {
            serial: serial.into(),
            sensor_type,
            name: name.into(),
            state,
            geolocation: None,
            address: None,
            location: None,
            description: None,
        }
    }

    /// Serial and name must be non-blank
    pub fn validate(&self) -> GatewayResult<()> {
        if self.serial.trim().is_empty() {
            return Err(GatewayError::invalid("serial", self.serial.clone(), "serial is required."));
        }
        if self.name.trim().is_empty() {
            return Err(GatewayError::invalid("name", self.name.clone(), "name is required."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn measurement_wire_shape() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let m = Measurement::new(21.5, "degC", utc).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(
            json,
            r#"{"utc":"2024-03-15T00:00:00.000000+00:00","value":21.5,"unit":"degC"}"#
        );
        let back: Measurement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn measurement_rejects_bad_values() {
        let utc = Utc::now();
        assert!(Measurement::new(f64::NAN, "degC", utc).is_err());
        assert!(Measurement::new(1.0, "  ", utc).is_err());
    }

    #[test]
    fn state_and_type_parse_any_case() {
        assert_eq!("up".parse::<SensorState>().unwrap(), SensorState::Up);
        assert_eq!(" Disconnected ".parse::<SensorState>().unwrap(), SensorState::Disconnected);
        assert_eq!("temperature".parse::<SensorType>().unwrap(), SensorType::Temperature);
        assert!("PRESSURE".parse::<SensorType>().is_err());
    }

    #[test]
    fn record_uses_type_key() {
        let record = SensorRecord::new("28-0000", "patio", SensorType::Temperature, SensorState::Up);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "TEMPERATURE");
        assert_eq!(json["state"], "UP");
        assert!(json["location"].is_null());
    }
}

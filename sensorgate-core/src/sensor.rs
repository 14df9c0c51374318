//! Temperature sensor drivers
//!
//! ## DS18B20 over 1-Wire
//!
//! The Linux `w1_therm` driver exposes each probe as
//! `<devices_dir>/<serial>/w1_slave`, two lines of hex dump:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23187
//! ```
//!
//! The first line ends in `YES` once the CRC checks out. The second carries the
//! temperature in milli-degrees Celsius. `85000` is the power-on reset value
//! and means the conversion has not run yet.
//!
//! Serials may be given with or without the `28-` family prefix.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::errors::{GatewayError, GatewayResult};
use crate::measurement::RawReading;
use crate::traits::TemperatureSensor;
use crate::units::{rounding, Dimension, UnitConverter};

/// Default sysfs location of 1-Wire devices
pub const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

/// 1-Wire family code of the DS18B20
pub const DS18B20_FAMILY: &str = "28";

/// Value reported by a probe that has not converted yet
const POWER_ON_RESET_MILLI_C: i64 = 85_000;

/// Unit every driver reports in unless configured otherwise
pub const DEFAULT_TEMPERATURE_UNIT: &str = "degC";

/// DS18B20 read through the kernel's sysfs interface
#[derive(Debug, Clone)]
pub struct W1ThermSensor {
    devices_dir: PathBuf,
    unit: String,
    converter: UnitConverter,
}

impl W1ThermSensor {
    /// Driver reading under `devices_dir`, reporting in `unit`
    pub fn new(devices_dir: impl Into<PathBuf>, unit: impl Into<String>) -> GatewayResult<Self> {
        let converter = UnitConverter::new();
        let unit = Dimension::Temperature.normalize_unit(&unit.into());
        if !converter.is_unit_of(Dimension::Temperature, &unit) {
            return Err(GatewayError::invalid("unit", unit, "The sensor does not support this unit."));
        }
        Ok(Self { devices_dir: devices_dir.into(), unit, converter })
    }

    fn slave_file(&self, serial: &str) -> GatewayResult<PathBuf> {
        let direct = self.devices_dir.join(serial).join("w1_slave");
        if direct.is_file() {
            return Ok(direct);
        }

        let prefixed = self
            .devices_dir
            .join(format!("{}-{}", DS18B20_FAMILY, serial))
            .join("w1_slave");
        if prefixed.is_file() {
            return Ok(prefixed);
        }

        Err(GatewayError::NotFound(format!(
            "Sensor with serial [{}] not found under {}.",
            serial,
            self.devices_dir.display()
        )))
    }

    fn read_milli_celsius(&self, serial: &str, path: &Path) -> GatewayResult<i64> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            IoErrorKind::NotFound => GatewayError::NotFound(format!("Sensor with serial [{}] not found.", serial)),
            _ => GatewayError::Unavailable(format!("Sensor with serial [{}] could not be read: {}", serial, e)),
        })?;

        parse_w1_slave(&contents).map_err(|reason| {
            warn!("Sensor with serial [{}] not ready yet: {}", serial, reason);
            GatewayError::Unavailable(format!("Sensor with serial [{}] not ready yet. {}", serial, reason))
        })
    }
}

impl TemperatureSensor for W1ThermSensor {
    fn read(&self, serial: &str) -> GatewayResult<RawReading> {
        debug!("Reading temperature from DS18B20 sensor with serial [{}]", serial);

        let path = self.slave_file(serial)?;
        let milli = self.read_milli_celsius(serial, &path)?;
        let celsius = milli as f64 / 1000.0;

        let value = self
            .converter
            .convert_value(Dimension::Temperature, celsius, DEFAULT_TEMPERATURE_UNIT, &self.unit)?;
        Ok(RawReading::new(round_reading(value), self.unit.clone()))
    }
}

/// Parse the two-line `w1_slave` dump into milli-degrees Celsius
pub fn parse_w1_slave(contents: &str) -> Result<i64, String> {
    let mut lines = contents.lines();

    let crc_line = lines.next().ok_or("empty device file")?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err("CRC check failed".into());
    }

    let data_line = lines.next().ok_or("missing temperature line")?;
    let raw = data_line
        .rsplit_once("t=")
        .map(|(_, t)| t.trim())
        .ok_or("missing t= field")?;
    let milli: i64 = raw.parse().map_err(|_| format!("bad temperature field [{}]", raw))?;

    if milli == POWER_ON_RESET_MILLI_C {
        return Err("power-on reset value".into());
    }
    Ok(milli)
}

/// Sensor that always reports one value; used in testing mode
#[derive(Debug, Clone)]
pub struct FixedSensor {
    value: f64,
    unit: String,
}

impl FixedSensor {
    /// Sensor reporting `value` in `unit` for any serial
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self { value, unit: unit.into() }
    }
}

impl Default for FixedSensor {
    fn default() -> Self {
        Self::new(100.0, DEFAULT_TEMPERATURE_UNIT)
    }
}

impl TemperatureSensor for FixedSensor {
    fn read(&self, serial: &str) -> GatewayResult<RawReading> {
        if serial.trim().is_empty() {
            return Err(GatewayError::invalid("serial", serial, "serial is required."));
        }
        debug!("Using a testing temperature for sensor [{}]", serial);
        Ok(RawReading::new(round_reading(self.value), self.unit.clone()))
    }
}

// readings keep at most two decimals, no zero exception
fn round_reading(value: f64) -> f64 {
    if rounding::decimal_places(value) > rounding::MAX_DECIMAL_PLACES {
        rounding::round_to(value, rounding::MAX_DECIMAL_PLACES)
    } else {
        value
    }
}

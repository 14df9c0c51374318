//! Query service: the one place inputs are validated
//!
//! Every consumer (HTTP handlers, the MQTT daemons, the poller, the CLI) goes
//! through [`SensorQueryService`]. It owns:
//! - the [`UnitConverter`] for client conversions and reading normalization
//! - a [`DurationResolver`] sharing the service clock
//! - the [`SensorStore`] and, on hosts with probes attached, a [`TemperatureSensor`]
//!
//! Readings are stored in one unit (the service's reading unit) no matter
//! which unit they arrived in.

use std::sync::Arc;

use log::{debug, info};

use crate::duration::{DurationResolver, TimeRange};
use crate::errors::{GatewayError, GatewayResult};
use crate::measurement::{Measurement, SensorRecord};
use crate::sensor::DEFAULT_TEMPERATURE_UNIT;
use crate::time::{Clock, SystemClock};
use crate::traits::{SensorStore, TemperatureSensor};
use crate::units::{ConversionResult, Dimension, UnitConverter};

/// Orchestrates conversions, sensor reads and history queries
#[derive(Clone)]
pub struct SensorQueryService {
    store: Arc<dyn SensorStore>,
    sensor: Option<Arc<dyn TemperatureSensor>>,
    clock: Arc<dyn Clock>,
    resolver: DurationResolver<Arc<dyn Clock>>,
    converter: UnitConverter,
    reading_unit: String,
}

impl SensorQueryService {
    /// Service over `store`, no local sensor, system clock, readings in degC
    pub fn new(store: Arc<dyn SensorStore>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store,
            sensor: None,
            resolver: DurationResolver::with_clock(clock.clone()),
            clock,
            converter: UnitConverter::new(),
            reading_unit: DEFAULT_TEMPERATURE_UNIT.to_string(),
        }
    }

    /// Attach a local sensor driver
    pub fn with_sensor(mut self, sensor: Arc<dyn TemperatureSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Replace the clock used for timestamps and range resolution
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.resolver = DurationResolver::with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Store readings in `unit`, which must be a temperature unit
    pub fn with_reading_unit(mut self, unit: &str) -> GatewayResult<Self> {
        if !self.converter.is_unit_of(Dimension::Temperature, unit) {
            return Err(GatewayError::invalid(
                "unit",
                unit,
                format!("A [{}] unit must be provided.", Dimension::Temperature),
            ));
        }
        self.reading_unit = Dimension::Temperature.normalize_unit(unit);
        Ok(self)
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn SensorStore> {
        &self.store
    }

    /// Duration resolver on the service clock
    pub fn resolver(&self) -> &DurationResolver<Arc<dyn Clock>> {
        &self.resolver
    }

    /// Canonical unit readings are stored in
    pub fn reading_unit(&self) -> &str {
        &self.reading_unit
    }

    /// Client unit conversion
    pub fn convert(
        &self,
        dimension: Dimension,
        from_unit: &str,
        from_value: &str,
        to_unit: &str,
    ) -> GatewayResult<ConversionResult> {
        self.converter.convert(dimension, from_unit, from_value, to_unit)
    }

    /// Read the local sensor now
    pub fn current_reading(&self, serial: &str) -> GatewayResult<Measurement> {
        require("serial", serial)?;
        let sensor = self
            .sensor
            .as_ref()
            .ok_or_else(|| GatewayError::Unavailable("No sensor driver is configured on this host.".into()))?;

        let raw = sensor.read(serial)?;
        debug!("sensor [{}] read {} {}", serial, raw.value, raw.unit);
        raw.at(self.clock.now())
    }

    /// Store a reading for a registered sensor
    ///
    /// Temperature readings in another unit are converted to the reading
    /// unit first. Returns what was stored.
    pub async fn record_reading(&self, serial: &str, measurement: &Measurement) -> GatewayResult<Measurement> {
        require("serial", serial)?;
        measurement.validate()?;

        if self.store.get_sensor(serial).await?.is_none() {
            return Err(GatewayError::invalid(
                "serial",
                serial,
                format!("sensor with serial [{}] is not registered in the system.", serial),
            ));
        }

        let stored = self.normalize(measurement)?;
        self.store.add_reading(serial, &stored).await?;
        debug!("stored reading for [{}]: {} {} at {}", serial, stored.value, stored.unit, stored.utc_string());
        Ok(stored)
    }

    /// Read the local sensor and store the result
    pub async fn poll_once(&self, serial: &str) -> GatewayResult<Measurement> {
        let measurement = self.current_reading(serial)?;
        self.record_reading(serial, &measurement).await
    }

    /// Stored readings for a registered sensor over a duration keyword
    pub async fn readings(&self, serial: &str, duration: &str) -> GatewayResult<Vec<Measurement>> {
        require("serial", serial)?;
        require("duration", duration)?;

        let range = self.resolver.resolve(duration)?;
        self.sensor(serial).await?;
        self.readings_in(serial, &range).await
    }

    /// Stored readings over an explicit closed range, oldest first
    pub async fn readings_in(&self, serial: &str, range: &TimeRange) -> GatewayResult<Vec<Measurement>> {
        debug!("retrieving readings for [{}] in {}", serial, range);
        let mut readings = self.store.get_readings(serial, range).await?;
        readings.sort_by(|a, b| a.utc.cmp(&b.utc));
        Ok(readings)
    }

    /// Register a new sensor
    pub async fn register_sensor(&self, record: &SensorRecord) -> GatewayResult<()> {
        record.validate()?;

        if self.store.get_sensor(&record.serial).await?.is_some() {
            return Err(GatewayError::invalid(
                "serial",
                record.serial.clone(),
                format!("sensor with serial [{}] is already registered.", record.serial),
            ));
        }

        self.store.add_sensor(record).await?;
        info!("registered sensor [{}] ({}, {})", record.serial, record.sensor_type, record.name);
        Ok(())
    }

    /// Look up a registered sensor
    pub async fn sensor(&self, serial: &str) -> GatewayResult<SensorRecord> {
        require("serial", serial)?;
        self.store
            .get_sensor(serial)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("No sensor registered for serial [{}]", serial)))
    }

    /// Unregister a sensor; its readings stay
    pub async fn remove_sensor(&self, serial: &str) -> GatewayResult<()> {
        require("serial", serial)?;
        self.store.delete_sensor(serial).await?;
        info!("removed sensor [{}]", serial);
        Ok(())
    }

    /// Delete every stored reading of `serial`
    pub async fn remove_readings(&self, serial: &str) -> GatewayResult<()> {
        require("serial", serial)?;
        self.store.delete_readings(serial).await?;
        info!("removed readings of sensor [{}]", serial);
        Ok(())
    }

    fn normalize(&self, measurement: &Measurement) -> GatewayResult<Measurement> {
        if measurement.unit == self.reading_unit {
            return Ok(measurement.clone());
        }

        let value = self.converter.convert_value(
            Dimension::Temperature,
            measurement.value,
            &measurement.unit,
            &self.reading_unit,
        )?;
        Measurement::new(value, self.reading_unit.clone(), measurement.utc)
    }
}

fn require(field: &'static str, value: &str) -> GatewayResult<()> {
    if value.trim().is_empty() {
        return Err(GatewayError::invalid(field, value, format!("{} is required.", field)));
    }
    Ok(())
}

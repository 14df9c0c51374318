//! Seams between the query service and the outside world
//!
//! The service only knows these two traits. Storage backends live in
//! `sensorgate-store`; sensor drivers live in [`crate::sensor`].

use async_trait::async_trait;

use crate::duration::TimeRange;
use crate::errors::GatewayResult;
use crate::measurement::{Measurement, RawReading, SensorRecord};

/// Reads the current value of a temperature sensor
pub trait TemperatureSensor: Send + Sync {
    /// Read the sensor identified by `serial`
    ///
    /// Fails with `NotFound` when no such device is attached, `Unavailable`
    /// when the device answered but the reading is not usable yet, and
    /// `InvalidArgument` when the driver cannot report in its configured unit.
    fn read(&self, serial: &str) -> GatewayResult<RawReading>;
}

/// Persistence for sensors and their readings
///
/// Implementations do no input validation beyond what their storage needs;
/// the service validates once before calling in.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Append a reading for `serial`
    async fn add_reading(&self, serial: &str, measurement: &Measurement) -> GatewayResult<()>;

    /// Readings with `range.start <= utc <= range.end`, oldest first
    async fn get_readings(&self, serial: &str, range: &TimeRange) -> GatewayResult<Vec<Measurement>>;

    /// Drop every reading for `serial`
    async fn delete_readings(&self, serial: &str) -> GatewayResult<()>;

    /// Insert a sensor record
    async fn add_sensor(&self, record: &SensorRecord) -> GatewayResult<()>;

    /// Look up a sensor record
    async fn get_sensor(&self, serial: &str) -> GatewayResult<Option<SensorRecord>>;

    /// Remove a sensor record; readings are left alone
    async fn delete_sensor(&self, serial: &str) -> GatewayResult<()>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

//! Polling daemon
//!
//! Every interval the poller collects one reading and stores it through the
//! service. The reading comes either from the local sensor driver or from the
//! current-reading resource of a remote gateway.
//!
//! A source that stays down would otherwise flood the log, so failures go
//! through a [`FailureLatch`]: the first failure after a success is logged
//! at error level, repeats at debug, and the next success once at info.

use std::future::Future;
use std::time::Duration;

use log::{debug, error, info};
use tokio::time::MissedTickBehavior;

use sensorgate_core::config::SensorConfig;
use sensorgate_core::{Measurement, SensorQueryService};

use crate::client::{ClientConfig, SensorClient};
use crate::latch::FailureLatch;
use crate::ConnectorError;

/// Where readings come from
pub enum ReadingSource {
    /// The service's own sensor driver
    Local,
    /// Another gateway's HTTP API
    Remote(SensorClient),
}

pub struct Poller {
    service: SensorQueryService,
    serial: String,
    source: ReadingSource,
    interval: Duration,
    latch: FailureLatch,
}

impl Poller {
    pub fn new(
        service: SensorQueryService,
        serial: impl Into<String>,
        source: ReadingSource,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            serial: serial.into(),
            source,
            interval,
            latch: FailureLatch::default(),
        }
    }

    /// Remote when `source_url` is set, local otherwise
    pub fn from_config(service: SensorQueryService, sensor: &SensorConfig) -> Result<Self, ConnectorError> {
        let source = match ClientConfig::from_sensor_config(sensor) {
            Some(config) => ReadingSource::Remote(SensorClient::new(config)?),
            None => ReadingSource::Local,
        };
        Ok(Self::new(
            service,
            sensor.serial.clone(),
            source,
            Duration::from_secs(sensor.poll_interval_secs),
        ))
    }

    pub fn latch(&self) -> &FailureLatch {
        &self.latch
    }

    /// Collect and store one reading, reporting the outcome through the latch
    pub async fn poll_once(&mut self) -> Result<Measurement, ConnectorError> {
        let outcome = self.collect().await;

        match &outcome {
            Ok(stored) => {
                if self.latch.succeed() {
                    info!("sensor [{}] readings resumed", self.serial);
                }
                debug!("polled [{}]: {} {}", self.serial, stored.value, stored.unit);
            }
            Err(err) => {
                if self.latch.fail() {
                    error!("polling sensor [{}] failed: {}", self.serial, err);
                } else {
                    debug!(
                        "polling sensor [{}] still failing ({} in a row): {}",
                        self.serial,
                        self.latch.consecutive_failures(),
                        err
                    );
                }
            }
        }
        outcome
    }

    async fn collect(&self) -> Result<Measurement, ConnectorError> {
        match &self.source {
            ReadingSource::Local => Ok(self.service.poll_once(&self.serial).await?),
            ReadingSource::Remote(client) => {
                let (serial, reading) = client.fetch_current(&self.serial).await?;
                Ok(self.service.record_reading(&serial, &reading).await?)
            }
        }
    }

    /// Poll every interval until `shutdown` resolves
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("polling sensor [{}] every {:?}", self.serial, self.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("poller for [{}] stopping", self.serial);
                    break;
                }
                _ = ticker.tick() => {
                    // reported through the latch
                    let _ = self.poll_once().await;
                }
            }
        }
    }
}

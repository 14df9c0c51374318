//! JSON envelopes shared by the HTTP API, MQTT and the poller

use serde::{Deserialize, Serialize};

use sensorgate_core::{ConversionResult, Measurement, SensorRecord, PRODUCT_NAME, VERSION};

use crate::ConnectorError;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

pub const PRODUCT_AUTHOR: &str = "SensorGate Contributors";

/// `{"serial": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRef {
    pub serial: String,
}

/// Current reading of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingEnvelope {
    pub status: String,
    pub sensor: SensorRef,
    pub data: Measurement,
}

impl ReadingEnvelope {
    pub fn success(serial: impl Into<String>, data: Measurement) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            sensor: SensorRef { serial: serial.into() },
            data,
        }
    }

    /// Parse a received envelope and check it carries a usable reading
    pub fn from_slice(payload: &[u8]) -> Result<Self, ConnectorError> {
        let envelope: ReadingEnvelope =
            serde_json::from_slice(payload).map_err(|e| ConnectorError::Payload(e.to_string()))?;

        if envelope.status != STATUS_SUCCESS {
            return Err(ConnectorError::Payload(format!("status [{}] is not success", envelope.status)));
        }
        if envelope.sensor.serial.trim().is_empty() {
            return Err(ConnectorError::Payload("sensor serial is blank".into()));
        }
        envelope.data.validate()?;
        Ok(envelope)
    }

    pub fn into_parts(self) -> (String, Measurement) {
        (self.sensor.serial, self.data)
    }
}

/// Stored readings of one sensor, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEnvelope {
    pub status: String,
    pub sensor: SensorRef,
    pub data: Vec<Measurement>,
}

impl HistoryEnvelope {
    pub fn success(serial: impl Into<String>, data: Vec<Measurement>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            sensor: SensorRef { serial: serial.into() },
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEnvelope {
    pub status: String,
    pub sensor: SensorRecord,
}

impl SensorEnvelope {
    pub fn success(sensor: SensorRecord) -> Self {
        Self { status: STATUS_SUCCESS.to_string(), sensor }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEnvelope {
    pub status: String,
    pub data: ConversionResult,
}

impl ConversionEnvelope {
    pub fn success(data: ConversionResult) -> Self {
        Self { status: STATUS_SUCCESS.to_string(), data }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    pub version: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEnvelope {
    pub status: String,
    pub product: ProductInfo,
}

impl ProductEnvelope {
    pub fn current() -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            product: ProductInfo {
                name: PRODUCT_NAME.to_string(),
                version: VERSION.to_string(),
                author: PRODUCT_AUTHOR.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// `{"status": "error", "error": {"code": 404, "message": ...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: String,
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            error: ErrorBody { code, message: message.into() },
        }
    }
}

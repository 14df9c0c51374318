//! Error Types for Gateway Operations
//!
//! ## Error Categories
//!
//! Every failure the gateway can report falls into one of four classes, exposed
//! through [`GatewayError::kind`]. The HTTP layer maps each class to a status
//! code; the daemons use it to decide what is worth logging loudly.
//!
//! ### Caller Mistakes (`ErrorKind::InvalidArgument`)
//! - `InvalidArgument`: malformed, missing or semantically wrong input
//!   (non-numeric value, blank unit, equal units, unknown duration keyword)
//! - `UnknownUnit`: the unit registry has no such unit name
//!
//! ### Missing Entities (`ErrorKind::NotFound`)
//! - `NotFound`: sensor not registered, or no device with that serial
//!
//! ### Transient Hardware Issues (`ErrorKind::Unavailable`)
//! - `Unavailable`: sensor present but not ready (bad CRC, bus busy)
//!
//! ### System Issues (`ErrorKind::Internal`)
//! - `Storage`: the persistence backend failed
//! - `Configuration`: the configuration file is missing or inconsistent
//!
//! ## Propagation
//!
//! Conversions and range resolutions are deterministic. Retrying them without
//! changing the input never helps, so callers surface the error as-is:
//!
//! ```rust
//! use sensorgate_core::{Dimension, ErrorKind, UnitConverter};
//!
//! let converter = UnitConverter::new();
//! match converter.convert(Dimension::Length, "meter", "5", "meter") {
//!     Ok(_) => unreachable!(),
//!     Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidArgument),
//! }
//! ```

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Coarse classification used to pick a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller error, never retried
    InvalidArgument,
    /// Referenced entity does not exist
    NotFound,
    /// Transient inability to read a sensor
    Unavailable,
    /// Storage or configuration failure
    Internal,
}

/// Gateway errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Input rejected before any work was done
    #[error("Parameter {field}=[{value}] not valid. {reason}")]
    InvalidArgument {
        /// Name of the offending field
        field: &'static str,
        /// The value as received
        value: String,
        /// What was expected instead
        reason: String,
    },

    /// Unit name the registry does not define
    #[error("'{unit}' is not defined in the unit registry")]
    UnknownUnit {
        /// The unit name after normalization
        unit: String,
    },

    /// Entity lookup came back empty
    #[error("{0}")]
    NotFound(String),

    /// Sensor could not be read right now
    #[error("{0}")]
    Unavailable(String),

    /// Persistence backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Missing or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Shorthand for building an `InvalidArgument`
    pub fn invalid(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::UnknownUnit { .. } => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Storage(_) | Self::Configuration(_) => ErrorKind::Internal,
        }
    }
}

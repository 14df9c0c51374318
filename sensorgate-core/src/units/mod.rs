//! Unit conversion with dimensional validation
//!
//! ## Validation Order
//!
//! A request is rejected at the first failing check, in this order:
//!
//! 1. `from_value` must be a finite integer or real literal
//! 2. neither unit may be blank
//! 3. the units, exactly as received, may not be equal
//! 4. units are normalized for their dimension (see [`Dimension::normalize_unit`])
//! 5. `to_unit`, then `from_unit`, must resolve to the requested dimension
//!
//! Only then is the value converted and the result passed through the
//! [`rounding`] policy.
//!
//! ## Example
//!
//! ```rust
//! use sensorgate_core::{Dimension, NumericLiteral, UnitConverter};
//!
//! let converter = UnitConverter::new();
//! let result = converter.convert(Dimension::Mass, "kg", "184", "lb").unwrap();
//!
//! assert_eq!(result.from_value, NumericLiteral::Integer(184));
//! assert_eq!(result.to_value, 405.65);
//! ```

pub mod registry;
pub mod rounding;

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, GatewayResult};
pub use registry::{Dimensionality, ResolvedUnit, UnitDefinition, UnitRegistry, REGISTRY};

/// Physical dimension a conversion is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Base unit meter
    Length,
    /// Base unit gram; `weight` on the HTTP side
    Mass,
    /// Base unit kelvin
    Temperature,
}

impl Dimension {
    /// All dimensions served by the converter
    pub const ALL: [Dimension; 3] = [Dimension::Length, Dimension::Mass, Dimension::Temperature];

    /// Lower-case name, as used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Length => "length",
            Dimension::Mass => "mass",
            Dimension::Temperature => "temperature",
        }
    }

    /// Exponent vector a unit must have to belong to this dimension
    pub fn dimensionality(&self) -> Dimensionality {
        match self {
            Dimension::Length => Dimensionality::LENGTH,
            Dimension::Mass => Dimensionality::MASS,
            Dimension::Temperature => Dimensionality::TEMPERATURE,
        }
    }

    /// Canonicalize the case of a unit name before lookup
    ///
    /// Every dimension lower-cases and trims. Temperature then restores the
    /// registry spelling of the three abbreviated scales.
    pub fn normalize_unit(&self, unit: &str) -> String {
        let lowered = unit.trim().to_lowercase();
        match self {
            Dimension::Temperature => match lowered.as_str() {
                "degc" => "degC".to_string(),
                "degf" => "degF".to_string(),
                "degk" => "degK".to_string(),
                _ => lowered,
            },
            Dimension::Length | Dimension::Mass => lowered,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "length" => Ok(Dimension::Length),
            "mass" | "weight" => Ok(Dimension::Mass),
            "temperature" => Ok(Dimension::Temperature),
            _ => Err(GatewayError::invalid(
                "dimension",
                s,
                "One of length, mass or temperature must be provided.",
            )),
        }
    }
}

/// A number as the client wrote it: integer literals stay integers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericLiteral {
    /// Written without `.` or an exponent
    Integer(i64),
    /// Everything else
    Float(f64),
}

impl NumericLiteral {
    /// Parse a decimal literal
    ///
    /// Literals containing `.`, `e` or `E` are reals. Integer literals too
    /// large for `i64` are kept as reals. Non-finite values are rejected.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let literal = raw.trim();
        let not_numeric = || GatewayError::invalid("from_value", raw, "A numeric value must be provided.");

        if literal.is_empty() {
            return Err(not_numeric());
        }

        let value: f64 = literal.parse().map_err(|_| not_numeric())?;
        if !value.is_finite() {
            return Err(not_numeric());
        }

        if literal.contains(['.', 'e', 'E']) {
            return Ok(NumericLiteral::Float(value));
        }

        Ok(literal
            .parse::<i64>()
            .map(NumericLiteral::Integer)
            .unwrap_or(NumericLiteral::Float(value)))
    }

    /// Value as a float
    pub fn as_f64(&self) -> f64 {
        match self {
            NumericLiteral::Integer(i) => *i as f64,
            NumericLiteral::Float(f) => *f,
        }
    }
}

impl fmt::Display for NumericLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericLiteral::Integer(i) => write!(f, "{}", i),
            NumericLiteral::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for NumericLiteral {
    fn from(value: i64) -> Self {
        NumericLiteral::Integer(value)
    }
}

impl From<f64> for NumericLiteral {
    fn from(value: f64) -> Self {
        NumericLiteral::Float(value)
    }
}

/// A conversion as requested by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Dimension both units must belong to
    pub dimension: Dimension,
    /// Source unit as received
    pub from_unit: String,
    /// Source value, still unparsed
    pub from_value: String,
    /// Target unit as received
    pub to_unit: String,
}

/// Outcome of a successful conversion; field order is the wire order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Source unit after normalization
    pub from_unit: String,
    /// Source value, integer or real as written
    pub from_value: NumericLiteral,
    /// Target unit after normalization
    pub to_unit: String,
    /// Converted value after rounding
    pub to_value: f64,
}

/// Converts quantities between units of one dimension
#[derive(Debug, Clone, Copy)]
pub struct UnitConverter {
    registry: &'static UnitRegistry,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitConverter {
    /// Converter backed by the process-wide registry
    pub fn new() -> Self {
        Self { registry: &REGISTRY }
    }

    /// Validate and perform a conversion
    pub fn convert(
        &self,
        dimension: Dimension,
        from_unit: &str,
        from_value: &str,
        to_unit: &str,
    ) -> GatewayResult<ConversionResult> {
        let literal = NumericLiteral::parse(from_value)?;

        if from_unit.trim().is_empty() {
            return Err(GatewayError::invalid("from_unit", from_unit, "A unit must be provided."));
        }
        if to_unit.trim().is_empty() {
            return Err(GatewayError::invalid("to_unit", to_unit, "A unit must be provided."));
        }
        if from_unit == to_unit {
            return Err(GatewayError::invalid(
                "to_unit",
                to_unit,
                format!("from_unit=[{}] and to_unit=[{}] units cannot be equal.", from_unit, to_unit),
            ));
        }

        let from_unit = dimension.normalize_unit(from_unit);
        let to_unit = dimension.normalize_unit(to_unit);

        let to = self.resolve("to_unit", &to_unit, dimension)?;
        let from = self.resolve("from_unit", &from_unit, dimension)?;

        debug!("converting [{} {}] to [{}]", literal, from.name, to.name);

        let raw = self.registry.convert(literal.as_f64(), &from, &to)?;
        if !raw.is_finite() {
            return Err(out_of_range(&literal, &from.name, &to.name));
        }
        let to_value = rounding::apply_policy(raw);

        debug!("input [{} {}] result [{} {}]", literal, from.name, raw, to.name);

        Ok(ConversionResult {
            from_unit,
            from_value: literal,
            to_unit,
            to_value,
        })
    }

    /// Convert a request value
    pub fn convert_request(&self, request: &ConversionRequest) -> GatewayResult<ConversionResult> {
        self.convert(
            request.dimension,
            &request.from_unit,
            &request.from_value,
            &request.to_unit,
        )
    }

    /// Convert a number already known to be valid, without rounding
    ///
    /// Used to bring sensor readings into a common unit before storage.
    pub fn convert_value(
        &self,
        dimension: Dimension,
        value: f64,
        from_unit: &str,
        to_unit: &str,
    ) -> GatewayResult<f64> {
        if !value.is_finite() {
            return Err(GatewayError::invalid("value", value.to_string(), "A finite value must be provided."));
        }

        let to = self.resolve("to_unit", &dimension.normalize_unit(to_unit), dimension)?;
        let from = self.resolve("from_unit", &dimension.normalize_unit(from_unit), dimension)?;
        if from.name == to.name {
            return Ok(value);
        }
        let converted = self.registry.convert(value, &from, &to)?;
        if !converted.is_finite() {
            return Err(out_of_range(&value, &from.name, &to.name));
        }
        Ok(converted)
    }

    /// Whether `unit` names a unit of `dimension`
    pub fn is_unit_of(&self, dimension: Dimension, unit: &str) -> bool {
        self.resolve("unit", &dimension.normalize_unit(unit), dimension).is_ok()
    }

    fn resolve(&self, field: &'static str, unit: &str, dimension: Dimension) -> GatewayResult<ResolvedUnit> {
        let resolved = self.registry.lookup(unit)?;
        if resolved.dimensionality != dimension.dimensionality() {
            return Err(GatewayError::invalid(
                field,
                unit,
                format!("A [{}] unit must be provided.", dimension),
            ));
        }
        Ok(resolved)
    }
}

fn out_of_range(value: &dyn fmt::Display, from: &str, to: &str) -> GatewayError {
    GatewayError::invalid(
        "from_value",
        value.to_string(),
        format!("[{} {}] cannot be expressed in [{}].", value, from, to),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_shapes() {
        assert_eq!(NumericLiteral::parse("184").unwrap(), NumericLiteral::Integer(184));
        assert_eq!(NumericLiteral::parse("-7").unwrap(), NumericLiteral::Integer(-7));
        assert_eq!(NumericLiteral::parse("18.0").unwrap(), NumericLiteral::Float(18.0));
        assert_eq!(NumericLiteral::parse("1e3").unwrap(), NumericLiteral::Float(1000.0));
        assert_eq!(NumericLiteral::parse("2E-2").unwrap(), NumericLiteral::Float(0.02));
        assert_eq!(
            NumericLiteral::parse("99999999999999999999").unwrap(),
            NumericLiteral::Float(1e20)
        );
    }

    #[test]
    fn literal_rejects_garbage() {
        for raw in ["", "  ", "abc", "1+2j", "inf", "NaN", "1,5"] {
            let err = NumericLiteral::parse(raw).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument, "{raw}");
        }
    }

    #[test]
    fn literal_serializes_untagged() {
        assert_eq!(serde_json::to_string(&NumericLiteral::Integer(184)).unwrap(), "184");
        assert_eq!(serde_json::to_string(&NumericLiteral::Float(18.5)).unwrap(), "18.5");
    }

    #[test]
    fn temperature_normalization() {
        let t = Dimension::Temperature;
        assert_eq!(t.normalize_unit(" DEGC "), "degC");
        assert_eq!(t.normalize_unit("degf"), "degF");
        assert_eq!(t.normalize_unit("DegK"), "degK");
        assert_eq!(t.normalize_unit("Kelvin"), "kelvin");
        assert_eq!(Dimension::Length.normalize_unit(" Meter"), "meter");
    }

    #[test]
    fn dimension_from_str() {
        assert_eq!("weight".parse::<Dimension>().unwrap(), Dimension::Mass);
        assert_eq!("Length".parse::<Dimension>().unwrap(), Dimension::Length);
        assert!("volume".parse::<Dimension>().is_err());
    }

    #[test]
    fn result_field_order() {
        let converter = UnitConverter::new();
        let result = converter.convert(Dimension::Temperature, "degC", "18", "degF").unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"from_unit":"degC","from_value":18,"to_unit":"degF","to_value":64.4}"#
        );
    }

    #[test]
    fn validation_order() {
        let converter = UnitConverter::new();

        // non-numeric wins over blank units
        let err = converter.convert(Dimension::Length, "", "x", "").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument { field: "from_value", .. }));

        // raw equality is checked before case folding
        assert!(converter.convert(Dimension::Length, "Meter", "1", "meter").is_ok());

        // to_unit is checked before from_unit
        let err = converter.convert(Dimension::Length, "gram", "1", "second").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument { field: "to_unit", .. }));
    }

    #[test]
    fn convert_value_keeps_precision() {
        let converter = UnitConverter::new();
        let f = converter.convert_value(Dimension::Temperature, 21.1234, "degC", "degF").unwrap();
        assert!((f - 70.02212).abs() < 1e-9);
        assert_eq!(converter.convert_value(Dimension::Temperature, 21.5, "degC", "degc").unwrap(), 21.5);
    }
}

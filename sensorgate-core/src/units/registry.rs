//! Unit registry with dimensional analysis
//!
//! Every unit is an affine map onto the base unit of its dimension:
//! `base = value * scale + offset`. Multiplicative units (meter, pound) have a
//! zero offset; temperature scales carry one, which is why Celsius to
//! Fahrenheit is not a plain multiplication.
//!
//! Names resolve in this order:
//! 1. exact name, symbol or alias (`meter`, `m`, `metre`)
//! 2. English plural of the above (`meters`, `pounds`)
//! 3. SI prefix on a prefixable unit, long with long and short with short
//!    (`kilometer`, `km`, `mg`)
//!
//! Lookups are case-sensitive. Callers normalize case before asking.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

use crate::errors::{GatewayError, GatewayResult};

lazy_static! {
    /// Process-wide immutable registry
    pub static ref REGISTRY: UnitRegistry = UnitRegistry::with_defaults();
}

/// Exponents over the base dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Dimensionality {
    /// `[length]` exponent
    pub length: i8,
    /// `[mass]` exponent
    pub mass: i8,
    /// `[temperature]` exponent
    pub temperature: i8,
    /// `[time]` exponent
    pub time: i8,
}

impl Dimensionality {
    /// `[length]`
    pub const LENGTH: Self = Self { length: 1, mass: 0, temperature: 0, time: 0 };
    /// `[mass]`
    pub const MASS: Self = Self { length: 0, mass: 1, temperature: 0, time: 0 };
    /// `[temperature]`
    pub const TEMPERATURE: Self = Self { length: 0, mass: 0, temperature: 1, time: 0 };
    /// `[time]`
    pub const TIME: Self = Self { length: 0, mass: 0, temperature: 0, time: 1 };
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            ("[length]", self.length),
            ("[mass]", self.mass),
            ("[temperature]", self.temperature),
            ("[time]", self.time),
        ];

        let mut first = true;
        for (name, exp) in parts.iter().filter(|(_, e)| *e != 0) {
            if !first {
                write!(f, " * ")?;
            }
            first = false;
            if *exp == 1 {
                write!(f, "{}", name)?;
            } else {
                write!(f, "{} ** {}", name, exp)?;
            }
        }

        if first {
            write!(f, "dimensionless")?;
        }
        Ok(())
    }
}

/// A unit as declared in the registry table
#[derive(Debug, Clone)]
pub struct UnitDefinition {
    /// Canonical name
    pub name: &'static str,
    /// Short symbol, used with short prefixes
    pub symbol: &'static str,
    /// Extra spellings that resolve to this unit
    pub aliases: &'static [&'static str],
    /// Base dimension exponents
    pub dimensionality: Dimensionality,
    /// Multiplier onto the dimension's base unit
    pub scale: f64,
    /// Offset added after scaling (affine units only)
    pub offset: f64,
    /// Whether SI prefixes may be attached
    pub prefixable: bool,
}

/// Outcome of a name lookup, prefix applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUnit {
    /// Canonical name, including any prefix (`kilometer`)
    pub name: String,
    /// Base dimension exponents
    pub dimensionality: Dimensionality,
    /// Multiplier onto the base unit, prefix included
    pub scale: f64,
    /// Offset added after scaling
    pub offset: f64,
}

impl ResolvedUnit {
    fn to_base(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }

    fn from_base(&self, base: f64) -> f64 {
        (base - self.offset) / self.scale
    }
}

struct Prefix {
    long: &'static str,
    short: &'static str,
    factor: f64,
}

// "da" must be tried before "d"
const PREFIXES: &[Prefix] = &[
    Prefix { long: "yotta", short: "Y", factor: 1e24 },
    Prefix { long: "zetta", short: "Z", factor: 1e21 },
    Prefix { long: "exa", short: "E", factor: 1e18 },
    Prefix { long: "peta", short: "P", factor: 1e15 },
    Prefix { long: "tera", short: "T", factor: 1e12 },
    Prefix { long: "giga", short: "G", factor: 1e9 },
    Prefix { long: "mega", short: "M", factor: 1e6 },
    Prefix { long: "kilo", short: "k", factor: 1e3 },
    Prefix { long: "hecto", short: "h", factor: 1e2 },
    Prefix { long: "deca", short: "da", factor: 1e1 },
    Prefix { long: "deci", short: "d", factor: 1e-1 },
    Prefix { long: "centi", short: "c", factor: 1e-2 },
    Prefix { long: "milli", short: "m", factor: 1e-3 },
    Prefix { long: "micro", short: "u", factor: 1e-6 },
    Prefix { long: "nano", short: "n", factor: 1e-9 },
    Prefix { long: "pico", short: "p", factor: 1e-12 },
    Prefix { long: "femto", short: "f", factor: 1e-15 },
    Prefix { long: "atto", short: "a", factor: 1e-18 },
    Prefix { long: "zepto", short: "z", factor: 1e-21 },
    Prefix { long: "yocto", short: "y", factor: 1e-24 },
];

macro_rules! unit {
    ($name:expr, $symbol:expr, [$($alias:expr),*], $dim:expr, $scale:expr, $offset:expr, $prefixable:expr) => {
        UnitDefinition {
            name: $name,
            symbol: $symbol,
            aliases: &[$($alias),*],
            dimensionality: $dim,
            scale: $scale,
            offset: $offset,
            prefixable: $prefixable,
        }
    };
}

fn default_units() -> Vec<UnitDefinition> {
    use Dimensionality as D;

    vec![
        // length, base meter
        unit!("meter", "m", ["metre"], D::LENGTH, 1.0, 0.0, true),
        unit!("inch", "in", ["inches", "international_inch"], D::LENGTH, 0.0254, 0.0, false),
        unit!("foot", "ft", ["feet", "international_foot"], D::LENGTH, 0.3048, 0.0, false),
        unit!("yard", "yd", ["international_yard"], D::LENGTH, 0.9144, 0.0, false),
        unit!("mile", "mi", ["international_mile"], D::LENGTH, 1609.344, 0.0, false),
        unit!("nautical_mile", "nmi", [], D::LENGTH, 1852.0, 0.0, false),
        unit!("fathom", "fathom", [], D::LENGTH, 1.8288, 0.0, false),
        unit!("angstrom", "angstrom", ["ångström"], D::LENGTH, 1e-10, 0.0, false),
        unit!("micron", "micron", [], D::LENGTH, 1e-6, 0.0, false),
        unit!("astronomical_unit", "au", [], D::LENGTH, 149_597_870_700.0, 0.0, false),
        unit!("light_year", "ly", ["lightyear"], D::LENGTH, 9_460_730_472_580_800.0, 0.0, false),
        // mass, base gram
        unit!("gram", "g", ["gramme"], D::MASS, 1.0, 0.0, true),
        unit!("metric_ton", "t", ["tonne"], D::MASS, 1e6, 0.0, false),
        unit!("pound", "lb", ["lbs", "avoirdupois_pound"], D::MASS, 453.592_37, 0.0, false),
        unit!("ounce", "oz", ["avoirdupois_ounce"], D::MASS, 28.349_523_125, 0.0, false),
        unit!("stone", "st", [], D::MASS, 6_350.293_18, 0.0, false),
        unit!("grain", "gr", [], D::MASS, 0.064_798_91, 0.0, false),
        unit!("short_ton", "ton", [], D::MASS, 907_184.74, 0.0, false),
        unit!("long_ton", "long_ton", [], D::MASS, 1_016_046.908_8, 0.0, false),
        unit!("carat", "ct", ["karat"], D::MASS, 0.2, 0.0, false),
        // temperature, base kelvin
        unit!("kelvin", "K", ["degK", "degree_Kelvin"], D::TEMPERATURE, 1.0, 0.0, true),
        unit!("degree_Celsius", "degC", ["celsius", "degreeC", "degree_celsius"], D::TEMPERATURE, 1.0, 273.15, false),
        unit!("degree_Fahrenheit", "degF", ["fahrenheit", "degreeF", "degree_fahrenheit"], D::TEMPERATURE, 5.0 / 9.0, 233.15 + 200.0 / 9.0, false),
        unit!("degree_Rankine", "degR", ["rankine", "degreeR", "degree_rankine"], D::TEMPERATURE, 5.0 / 9.0, 0.0, false),
        unit!("degree_Reaumur", "degRe", ["reaumur", "degree_reaumur"], D::TEMPERATURE, 1.25, 273.15, false),
        // time, base second; present so foreign dimensions are recognized
        unit!("second", "s", ["sec"], D::TIME, 1.0, 0.0, true),
        unit!("minute", "min", [], D::TIME, 60.0, 0.0, false),
        unit!("hour", "h", ["hr"], D::TIME, 3_600.0, 0.0, false),
        unit!("day", "d", [], D::TIME, 86_400.0, 0.0, false),
        unit!("week", "week", [], D::TIME, 604_800.0, 0.0, false),
    ]
}

/// Immutable unit table with a name index
#[derive(Debug)]
pub struct UnitRegistry {
    units: Vec<UnitDefinition>,
    by_name: HashMap<&'static str, usize>,
    by_symbol: HashMap<&'static str, usize>,
}

impl UnitRegistry {
    /// Build a registry from an explicit unit list
    pub fn new(units: Vec<UnitDefinition>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_symbol = HashMap::new();

        for (idx, unit) in units.iter().enumerate() {
            by_name.insert(unit.name, idx);
            for alias in unit.aliases {
                by_name.insert(*alias, idx);
            }
            by_symbol.insert(unit.symbol, idx);
        }

        Self { units, by_name, by_symbol }
    }

    /// Registry with length, mass, temperature and time units
    pub fn with_defaults() -> Self {
        Self::new(default_units())
    }

    /// Number of declared units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no units are declared
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Resolve a unit name to its canonical form and dimensionality
    pub fn lookup(&self, name: &str) -> GatewayResult<ResolvedUnit> {
        if let Some(unit) = self.find_exact(name) {
            return Ok(Self::resolved(unit, None));
        }

        // plurals apply to names only; "ms" is not the plural of "m"
        if let Some(singular) = name.strip_suffix('s') {
            if let Some(idx) = self.by_name.get(singular) {
                return Ok(Self::resolved(&self.units[*idx], None));
            }
        }

        if let Some(found) = self.find_prefixed(name) {
            return Ok(found);
        }

        if let Some(singular) = name.strip_suffix('s') {
            if let Some(found) = self.find_prefixed(singular) {
                return Ok(found);
            }
        }

        Err(GatewayError::UnknownUnit { unit: name.to_string() })
    }

    /// Canonical name of a unit
    pub fn get_name(&self, name: &str) -> GatewayResult<String> {
        self.lookup(name).map(|u| u.name)
    }

    /// Dimensionality of a unit
    pub fn get_dimensionality(&self, name: &str) -> GatewayResult<Dimensionality> {
        self.lookup(name).map(|u| u.dimensionality)
    }

    /// Express `value` given in `from` in the unit `to`
    pub fn convert(&self, value: f64, from: &ResolvedUnit, to: &ResolvedUnit) -> GatewayResult<f64> {
        if from.dimensionality != to.dimensionality {
            return Err(GatewayError::invalid(
                "to_unit",
                to.name.clone(),
                format!(
                    "Cannot convert from '{}' ({}) to '{}' ({}).",
                    from.name, from.dimensionality, to.name, to.dimensionality
                ),
            ));
        }

        Ok(to.from_base(from.to_base(value)))
    }

    fn find_exact(&self, name: &str) -> Option<&UnitDefinition> {
        self.by_name
            .get(name)
            .or_else(|| self.by_symbol.get(name))
            .map(|idx| &self.units[*idx])
    }

    fn find_prefixed(&self, name: &str) -> Option<ResolvedUnit> {
        for prefix in PREFIXES {
            if let Some(rest) = name.strip_prefix(prefix.long) {
                if let Some(idx) = self.by_name.get(rest) {
                    let unit = &self.units[*idx];
                    if unit.prefixable && rest == unit.name {
                        return Some(Self::resolved(unit, Some(prefix)));
                    }
                }
            }

            if let Some(rest) = name.strip_prefix(prefix.short) {
                if let Some(idx) = self.by_symbol.get(rest) {
                    let unit = &self.units[*idx];
                    if unit.prefixable {
                        return Some(Self::resolved(unit, Some(prefix)));
                    }
                }
            }
        }
        None
    }

    fn resolved(unit: &UnitDefinition, prefix: Option<&Prefix>) -> ResolvedUnit {
        match prefix {
            None => ResolvedUnit {
                name: unit.name.to_string(),
                dimensionality: unit.dimensionality,
                scale: unit.scale,
                offset: unit.offset,
            },
            Some(p) => ResolvedUnit {
                name: format!("{}{}", p.long, unit.name),
                dimensionality: unit.dimensionality,
                scale: unit.scale * p.factor,
                offset: unit.offset,
            },
        }
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

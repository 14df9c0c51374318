//! Display precision policy for converted values
//!
//! Results with more than two decimal places are rounded to two. A result
//! that rounds to exactly zero is reported unrounded instead, so a small but
//! nonzero quantity never reads as nothing.

/// Maximum decimal places reported to clients
pub const MAX_DECIMAL_PLACES: usize = 2;

/// Number of digits after the decimal point in the shortest decimal
/// representation of `value` that round-trips
pub fn decimal_places(value: f64) -> usize {
    let repr = value.to_string();
    match repr.split_once('.') {
        Some((_, fraction)) => fraction.len(),
        None => 0,
    }
}

/// Round `value` to `places` decimals the way the formatter does
pub fn round_to(value: f64, places: usize) -> f64 {
    format!("{:.*}", places, value).parse().unwrap_or(value)
}

/// Apply the reporting policy to a raw conversion result
pub fn apply_policy(raw: f64) -> f64 {
    let rounded = if decimal_places(raw) > MAX_DECIMAL_PLACES {
        round_to(raw, MAX_DECIMAL_PLACES)
    } else {
        raw
    };

    if rounded == 0.0 {
        raw
    } else {
        rounded
    }
}

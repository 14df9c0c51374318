//! Wall-clock abstraction
//!
//! Range resolution and reading timestamps ask a [`Clock`] for "now" so tests
//! can pin time:
//! - [`SystemClock`] reads the host clock
//! - [`FixedClock`] returns whatever it was last set to
//!
//! Timestamps are exchanged as strings in one fixed layout,
//! `2024-03-15T00:00:00.000000+00:00`. Every store compares them as text, so
//! the layout must not vary in width.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::errors::{GatewayError, GatewayResult};

/// Layout of every stored and transmitted timestamp
pub const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f+00:00";

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Host wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests
///
/// Clones share the same instant, so a test can keep a handle and move time
/// under a resolver that owns another clone.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    /// Clock stopped at `instant`
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant: Arc::new(RwLock::new(instant)) }
    }

    /// Move every clone to `instant`
    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut guard) = self.instant.write() {
            *guard = instant;
        }
    }

    /// Move every clone forward by `by`
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.instant.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Render an instant in the stored layout
pub fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.format(UTC_FORMAT).to_string()
}

/// Parse a timestamp
///
/// Accepts the stored layout and any RFC 3339 string, which is normalized to
/// UTC. Naive `YYYY-MM-DD HH:MM:SS[.f]` strings are taken as UTC.
pub fn parse_utc(raw: &str) -> GatewayResult<DateTime<Utc>> {
    let trimmed = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| GatewayError::invalid("utc", raw, "An ISO-8601 timestamp must be provided."))
}

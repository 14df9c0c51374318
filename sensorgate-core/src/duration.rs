//! Duration keywords for historical queries
//!
//! A client asks for "the last N units of time" by keyword. The keyword is
//! matched case-insensitively after trimming and resolved against the clock at
//! the moment of the request, never cached:
//!
//! | keyword       | start                         |
//! |---------------|-------------------------------|
//! | `last5Years`  | now minus 60 calendar months  |
//! | `last1Year`   | now minus 12 calendar months  |
//! | `last6Months` | now minus 6 calendar months   |
//! | `last90Days` … `lastDay` | now minus N × 24 h |
//! | `last24Hours` … `lastHour` | now minus N h    |
//!
//! Calendar subtraction clamps the day to the end of the target month, so
//! one year before 2024-02-29 is 2023-02-28.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, GatewayResult};
use crate::time::{format_utc, Clock, SystemClock};

/// Supported look-back windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationKeyword {
    /// 60 calendar months
    #[serde(rename = "last5Years")]
    Last5Years,
    /// 12 calendar months
    #[serde(rename = "last1Year")]
    Last1Year,
    /// 6 calendar months
    #[serde(rename = "last6Months")]
    Last6Months,
    /// 90 days
    #[serde(rename = "last90Days")]
    Last90Days,
    /// 60 days
    #[serde(rename = "last60Days")]
    Last60Days,
    /// 30 days
    #[serde(rename = "last30Days")]
    Last30Days,
    /// 21 days
    #[serde(rename = "last21Days")]
    Last21Days,
    /// 7 days
    #[serde(rename = "last7Days")]
    Last7Days,
    /// 3 days
    #[serde(rename = "last3Days")]
    Last3Days,
    /// 24 hours, spelled as a day
    #[serde(rename = "lastDay")]
    LastDay,
    /// 24 hours
    #[serde(rename = "last24Hours")]
    Last24Hours,
    /// 12 hours
    #[serde(rename = "last12Hours")]
    Last12Hours,
    /// 6 hours
    #[serde(rename = "last6Hours")]
    Last6Hours,
    /// 1 hour
    #[serde(rename = "lastHour")]
    LastHour,
}

/// How far back a keyword reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookBack {
    /// Calendar months, day clamped to month end
    Months(u32),
    /// Fixed length
    Fixed(Duration),
}

impl DurationKeyword {
    /// Every keyword, longest window first
    pub const ALL: [DurationKeyword; 14] = [
        DurationKeyword::Last5Years,
        DurationKeyword::Last1Year,
        DurationKeyword::Last6Months,
        DurationKeyword::Last90Days,
        DurationKeyword::Last60Days,
        DurationKeyword::Last30Days,
        DurationKeyword::Last21Days,
        DurationKeyword::Last7Days,
        DurationKeyword::Last3Days,
        DurationKeyword::LastDay,
        DurationKeyword::Last24Hours,
        DurationKeyword::Last12Hours,
        DurationKeyword::Last6Hours,
        DurationKeyword::LastHour,
    ];

    /// Canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationKeyword::Last5Years => "last5Years",
            DurationKeyword::Last1Year => "last1Year",
            DurationKeyword::Last6Months => "last6Months",
            DurationKeyword::Last90Days => "last90Days",
            DurationKeyword::Last60Days => "last60Days",
            DurationKeyword::Last30Days => "last30Days",
            DurationKeyword::Last21Days => "last21Days",
            DurationKeyword::Last7Days => "last7Days",
            DurationKeyword::Last3Days => "last3Days",
            DurationKeyword::LastDay => "lastDay",
            DurationKeyword::Last24Hours => "last24Hours",
            DurationKeyword::Last12Hours => "last12Hours",
            DurationKeyword::Last6Hours => "last6Hours",
            DurationKeyword::LastHour => "lastHour",
        }
    }

    /// Length of the window
    pub fn look_back(&self) -> LookBack {
        match self {
            DurationKeyword::Last5Years => LookBack::Months(60),
            DurationKeyword::Last1Year => LookBack::Months(12),
            DurationKeyword::Last6Months => LookBack::Months(6),
            DurationKeyword::Last90Days => LookBack::Fixed(Duration::days(90)),
            DurationKeyword::Last60Days => LookBack::Fixed(Duration::days(60)),
            DurationKeyword::Last30Days => LookBack::Fixed(Duration::days(30)),
            DurationKeyword::Last21Days => LookBack::Fixed(Duration::days(21)),
            DurationKeyword::Last7Days => LookBack::Fixed(Duration::days(7)),
            DurationKeyword::Last3Days => LookBack::Fixed(Duration::days(3)),
            DurationKeyword::LastDay => LookBack::Fixed(Duration::days(1)),
            DurationKeyword::Last24Hours => LookBack::Fixed(Duration::hours(24)),
            DurationKeyword::Last12Hours => LookBack::Fixed(Duration::hours(12)),
            DurationKeyword::Last6Hours => LookBack::Fixed(Duration::hours(6)),
            DurationKeyword::LastHour => LookBack::Fixed(Duration::hours(1)),
        }
    }

    /// Start of the window ending at `now`
    pub fn start_from(&self, now: DateTime<Utc>) -> GatewayResult<DateTime<Utc>> {
        let start = match self.look_back() {
            LookBack::Months(n) => now.checked_sub_months(Months::new(n)),
            LookBack::Fixed(d) => now.checked_sub_signed(d),
        };
        start.ok_or_else(|| {
            GatewayError::invalid("duration", self.as_str(), "Range start falls outside the supported calendar.")
        })
    }
}

impl fmt::Display for DurationKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationKeyword {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DurationKeyword::ALL
            .iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = DurationKeyword::ALL.iter().map(|k| k.as_str()).collect();
                GatewayError::invalid(
                    "duration",
                    s,
                    format!("One of [{}] must be provided.", names.join(", ")),
                )
            })
    }
}

/// Closed time interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Earliest instant included
    pub start: DateTime<Utc>,
    /// Latest instant included
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Both bounds are inclusive
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.start <= *instant && *instant <= self.end
    }

    /// Start in the stored timestamp layout
    pub fn start_utc(&self) -> String {
        format_utc(&self.start)
    }

    /// End in the stored timestamp layout
    pub fn end_utc(&self) -> String {
        format_utc(&self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_utc(), self.end_utc())
    }
}

/// Turns duration keywords into time ranges ending now
#[derive(Debug, Clone)]
pub struct DurationResolver<C: Clock = SystemClock> {
    clock: C,
}

impl DurationResolver<SystemClock> {
    /// Resolver on the system clock
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl Default for DurationResolver<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> DurationResolver<C> {
    /// Resolver reading time from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Current instant according to the resolver's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve a keyword against the clock
    pub fn resolve(&self, keyword: &str) -> GatewayResult<TimeRange> {
        self.resolve_at(keyword, self.clock.now())
    }

    /// Resolve a keyword against an explicit instant
    pub fn resolve_at(&self, keyword: &str, now: DateTime<Utc>) -> GatewayResult<TimeRange> {
        let parsed: DurationKeyword = keyword.parse()?;
        let range = TimeRange { start: parsed.start_from(now)?, end: now };
        debug!("duration [{}] resolved to {}", parsed, range);
        Ok(range)
    }

    /// Whether `keyword` names a supported window
    pub fn is_valid(&self, keyword: &str) -> bool {
        keyword.parse::<DurationKeyword>().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FixedClock;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn seven_days_from_fixed_clock() {
        let now = at(2024, 3, 15, 0);
        let resolver = DurationResolver::with_clock(FixedClock::new(now));

        let range = resolver.resolve("last7Days").unwrap();
        assert_eq!(range.start, at(2024, 3, 8, 0));
        assert_eq!(range.end, now);
    }

    #[test]
    fn calendar_windows_clamp_to_month_end() {
        let resolver = DurationResolver::new();
        let leap = at(2024, 2, 29, 12);

        assert_eq!(resolver.resolve_at("last1Year", leap).unwrap().start, at(2023, 2, 28, 12));
        assert_eq!(resolver.resolve_at("last5Years", leap).unwrap().start, at(2019, 2, 28, 12));
        assert_eq!(
            resolver.resolve_at("last6Months", at(2024, 8, 31, 0)).unwrap().start,
            at(2024, 2, 29, 0)
        );
    }

    #[test]
    fn hour_windows_cross_midnight() {
        let resolver = DurationResolver::new();
        let range = resolver.resolve_at("last6Hours", at(2024, 1, 1, 3)).unwrap();
        assert_eq!(range.start, at(2023, 12, 31, 21));
    }

    #[test]
    fn every_keyword_starts_before_now() {
        let resolver = DurationResolver::new();
        let now = at(2024, 3, 15, 0);
        for keyword in DurationKeyword::ALL {
            let range = resolver.resolve_at(keyword.as_str(), now).unwrap();
            assert!(range.start < range.end, "{keyword}");
        }
    }

    #[test]
    fn matching_ignores_case_and_padding() {
        let resolver = DurationResolver::new();
        assert!(resolver.is_valid("last7days"));
        assert!(resolver.is_valid("  LASTHOUR "));
        assert!(!resolver.is_valid("last8days"));
        assert!(!resolver.is_valid(""));
    }

    #[test]
    fn unknown_keyword_names_value() {
        let err = DurationResolver::new().resolve("banana").unwrap_err();
        assert!(err.to_string().contains("duration=[banana]"));
    }

    #[test]
    fn range_is_closed() {
        let range = TimeRange { start: at(2024, 1, 1, 0), end: at(2024, 1, 2, 0) };
        assert!(range.contains(&range.start));
        assert!(range.contains(&range.end));
        assert!(!range.contains(&at(2024, 1, 2, 1)));
    }
}

//! Key codec for dates and times of day
//!
//! Measurements arrive with dates in the external `DD-MM-YYYY` form and
//! times as `HH:MM`. Backends compare dates chronologically, so every
//! date is parsed into a [`Day`] before it reaches storage and rendered
//! back to the external form only when results are reported.
//!
//! Malformed input is rejected here with [`StorageError::InvalidKey`];
//! nothing that fails to parse is ever turned into a storage key.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::storage::error::{StorageError, StorageResult};

const EXTERNAL_DATE_FORMAT: &str = "%d-%m-%Y";
const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// A calendar day
///
/// Ordered chronologically; displayed and serialized as `DD-MM-YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Day(NaiveDate);

/// `true` if `s` is ten bytes: dashes at the two `dashes` positions, digits elsewhere
///
/// chrono's `%Y` takes one to four digits, so short years must be caught here.
fn has_date_shape(s: &str, dashes: [usize; 2]) -> bool {
    s.len() == 10
        && s.bytes().enumerate().all(|(i, b)| {
            if dashes.contains(&i) {
                b == b'-'
            } else {
                b.is_ascii_digit()
            }
        })
}

fn malformed_date(s: &str) -> StorageError {
    StorageError::InvalidKey(format!("invalid date '{s}'"))
}

impl Day {
    /// Build a day from year, month and day-of-month
    pub fn from_ymd(year: i32, month: u32, day: u32) -> StorageResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| {
                StorageError::InvalidKey(format!("no such date: {year:04}-{month:02}-{day:02}"))
            })
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Render in the canonical `YYYY-MM-DD` form used by the SQL engines
    pub fn canonical(&self) -> String {
        self.0.format(CANONICAL_DATE_FORMAT).to_string()
    }

    pub fn first_of_month(&self) -> Self {
        // day 1 exists in every month
        Self(self.0.with_day(1).unwrap_or(self.0))
    }

    /// Parse the canonical `YYYY-MM-DD` form (as returned by the engines)
    pub fn from_canonical(s: &str) -> StorageResult<Self> {
        let s = s.trim();
        if !has_date_shape(s, [4, 7]) {
            return Err(malformed_date(s));
        }
        NaiveDate::parse_from_str(s, CANONICAL_DATE_FORMAT)
            .map(Self)
            .map_err(|e| StorageError::InvalidKey(format!("invalid date '{s}': {e}")))
    }
}

impl FromStr for Day {
    type Err = StorageError;

    /// Accepts `DD-MM-YYYY`, and passes `YYYY-MM-DD` through unchanged
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.as_bytes().get(4) == Some(&b'-') {
            return Self::from_canonical(s);
        }
        if !has_date_shape(s, [2, 5]) {
            return Err(malformed_date(s));
        }
        NaiveDate::parse_from_str(s, EXTERNAL_DATE_FORMAT)
            .map(Self)
            .map_err(|e| StorageError::InvalidKey(format!("invalid date '{s}': {e}")))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(EXTERNAL_DATE_FORMAT))
    }
}

impl From<NaiveDate> for Day {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Serialize for Day {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A time of day at minute resolution
///
/// Seconds are truncated on parse, never rounded. Displayed as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Bucket key used for whole-day and whole-month sums
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(NaiveTime::MIN);

    pub fn from_hm(hour: u32, minute: u32) -> StorageResult<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| StorageError::InvalidKey(format!("no such time: {hour:02}:{minute:02}")))
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    /// Truncate to the start of the hour
    pub fn hour_bucket(&self) -> Self {
        Self(NaiveTime::from_hms_opt(self.0.hour(), 0, 0).unwrap_or(NaiveTime::MIN))
    }

    /// Render with seconds, as the SQL engines expect
    pub fn canonical(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }
}

impl FromStr for TimeOfDay {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidKey(format!("invalid time '{s}'"));
        let mut parts = s.trim().split(':');

        let hour: u32 = parts
            .next()
            .filter(|h| !h.is_empty() && h.len() <= 2)
            .and_then(|h| h.parse().ok())
            .ok_or_else(invalid)?;

        // a bare hour comes back from some engines' hour extraction
        let minute: u32 = match parts.next() {
            None => 0,
            Some(m) if m.len() == 2 => m.parse().map_err(|_| invalid())?,
            Some(_) => return Err(invalid()),
        };

        // seconds are validated, then dropped
        if let Some(seconds) = parts.next() {
            let whole = seconds.split('.').next().unwrap_or_default();
            if whole.len() != 2 || whole.parse::<u32>().map_or(true, |sec| sec > 59) {
                return Err(invalid());
            }
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Self::from_hm(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIME_FORMAT))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Time selector for retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    /// A single 5-minute slot
    Exact(TimeOfDay),
    /// Sums per hour, keyed by the hour's first minute
    Hour,
    /// One sum per day under `00:00`
    Day,
    /// One sum per calendar month under its first day and `00:00`
    Month,
    /// Every raw entry, unaggregated
    All,
}

impl FromStr for Interval {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "month" => Ok(Interval::Month),
            "all" => Ok(Interval::All),
            other => other.parse().map(Interval::Exact),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Exact(time) => write!(f, "{time}"),
            Interval::Hour => write!(f, "hour"),
            Interval::Day => write!(f, "day"),
            Interval::Month => write!(f, "month"),
            Interval::All => write!(f, "all"),
        }
    }
}

/// `DD-MM-YYYY` to `YYYY-MM-DD`
pub fn to_canonical_date(external: &str) -> StorageResult<String> {
    external.parse::<Day>().map(|day| day.canonical())
}

/// `YYYY-MM-DD` to `DD-MM-YYYY`
pub fn to_external_date(canonical: &str) -> StorageResult<String> {
    Day::from_canonical(canonical).map(|day| day.to_string())
}

/// Normalize a time of day to `HH:MM`, dropping any seconds
pub fn strip_seconds(time: &str) -> StorageResult<String> {
    time.parse::<TimeOfDay>().map(|t| t.to_string())
}

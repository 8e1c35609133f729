//! Calendar month values.
//!
//! A schedule belongs to a year + month. The wire form is `YYYY-MM`; full
//! ISO dates and RFC3339 timestamps are also accepted and truncated to their
//! month, since older clients submitted the first day of the month.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A calendar month (year + month).
///
/// Ordering is chronological: field order is `year` then `month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleMonth {
    year: i32,
    month: u32,
}

impl ScheduleMonth {
    /// Creates a month after range-checking it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when `month` is outside `1..=12` or the
    /// year is outside `1..=9999`.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidInput(format!(
                "month must be between 1 and 12 (got {month})"
            )));
        }
        if !(1..=9999).contains(&year) {
            return Err(Error::InvalidInput(format!(
                "year must be between 1 and 9999 (got {year})"
            )));
        }
        Ok(Self { year, month })
    }

    /// Returns the year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Returns the month number (1-12).
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for ScheduleMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ScheduleMonth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::validation("month is required"));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Self::new(dt.year(), dt.month());
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Self::new(date.year(), date.month());
        }

        let invalid = || Error::InvalidInput(format!("month must be formatted as YYYY-MM (got '{s}')"));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl Serialize for ScheduleMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScheduleMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_year_month() {
        let month: ScheduleMonth = "2024-06".parse().unwrap();
        assert_eq!(month.year(), 2024);
        assert_eq!(month.month(), 6);
        assert_eq!(month.to_string(), "2024-06");
    }

    #[test]
    fn accepts_single_digit_month() {
        let month: ScheduleMonth = "2024-6".parse().unwrap();
        assert_eq!(month.to_string(), "2024-06");
    }

    #[test]
    fn truncates_dates_and_timestamps() {
        let from_date: ScheduleMonth = "2024-06-15".parse().unwrap();
        let from_ts: ScheduleMonth = "2024-06-01T00:00:00Z".parse().unwrap();
        assert_eq!(from_date, from_ts);
        assert_eq!(from_date.to_string(), "2024-06");
    }

    #[test]
    fn rejects_out_of_range_month() {
        assert!("2024-13".parse::<ScheduleMonth>().is_err());
        assert!("2024-00".parse::<ScheduleMonth>().is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!("june".parse::<ScheduleMonth>().is_err());
        assert!("24-06".parse::<ScheduleMonth>().is_err());
        assert!(matches!(
            "  ".parse::<ScheduleMonth>(),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn orders_chronologically() {
        let older: ScheduleMonth = "2023-12".parse().unwrap();
        let newer: ScheduleMonth = "2024-01".parse().unwrap();
        assert!(older < newer);
    }

    #[test]
    fn serde_uses_wire_form() {
        let month: ScheduleMonth = "2024-06".parse().unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"2024-06\"");
        let back: ScheduleMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month);
    }
}

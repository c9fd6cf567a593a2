//! Time-of-day values for schedule matching
//!
//! The simulated clock carries a full date and time, but schedule events are
//! matched on the time-of-day component alone. `TimeOfDay` is that component,
//! with `HH:MM:SS` text form and the minute arithmetic used to derive
//! announcement times from exam start/end times.

use crate::{Error, Result};
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Hour, minute and second within a day.
///
/// Ordered chronologically, so `08:40:00 < 10:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
    second: u8,
}

impl TimeOfDay {
    /// Build a time-of-day, rejecting out-of-range components.
    pub fn new(hour: u8, minute: u8, second: u8) -> Result<Self> {
        if hour > 23 || minute > 59 || second > 59 {
            return Err(Error::InvalidTime(format!(
                "{:02}:{:02}:{:02} is not a valid time of day",
                hour, minute, second
            )));
        }
        Ok(Self { hour, minute, second })
    }

    /// Parse `HH:MM:SS`.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidTime(format!("expected HH:MM:SS, got '{}'", text)));
        }
        let field = |s: &str| {
            s.parse::<u8>()
                .map_err(|_| Error::InvalidTime(format!("non-numeric field in '{}'", text)))
        };
        Self::new(field(parts[0])?, field(parts[1])?, field(parts[2])?)
    }

    /// Parse `HH:MM` (seconds zeroed), as entered for a time jump.
    pub fn parse_hh_mm(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(Error::InvalidTime(format!("expected HH:MM, got '{}'", text)));
        }
        let field = |s: &str| {
            s.parse::<u8>()
                .map_err(|_| Error::InvalidTime(format!("non-numeric field in '{}'", text)))
        };
        Self::new(field(parts[0])?, field(parts[1])?, 0)
    }

    /// Time-of-day component of a simulated timestamp.
    pub fn of(datetime: &NaiveDateTime) -> Self {
        Self::from(datetime.time())
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    /// Seconds since midnight.
    pub fn seconds_of_day(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }

    /// Subtract whole minutes, keeping the seconds field.
    ///
    /// `(hour * 60 + minute - minutes)` is normalized back into `hour:minute`,
    /// wrapping into the previous day when negative.
    pub fn minus_minutes(&self, minutes: u32) -> Self {
        let total = self.hour as i64 * 60 + self.minute as i64 - minutes as i64;
        let wrapped = total.rem_euclid(MINUTES_PER_DAY);
        Self {
            hour: (wrapped / 60) as u8,
            minute: (wrapped % 60) as u8,
            second: self.second,
        }
    }

    /// Convert to a chrono time.
    pub fn to_naive_time(&self) -> NaiveTime {
        // Components are validated on construction
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
            .unwrap_or(NaiveTime::MIN)
    }
}

/// Subtract minutes from an `HH:MM:SS` string.
///
/// ```
/// use pasim_common::time::subtract_time;
///
/// assert_eq!(subtract_time("08:40:00", 15).unwrap(), "08:25:00");
/// assert_eq!(subtract_time("00:05:00", 10).unwrap(), "23:55:00");
/// ```
pub fn subtract_time(time: &str, minutes: u32) -> Result<String> {
    Ok(TimeOfDay::parse(time)?.minus_minutes(minutes).to_string())
}

impl From<NaiveTime> for TimeOfDay {
    fn from(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
            second: time.second() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

//! CF calendar handling for model time coordinates.
//!
//! Model output stores time as numeric offsets from an epoch
//! (`"days since 1850-01-01"`) interpreted in a named calendar. Several of
//! those calendars (`noleap`, `360_day`, ...) cannot be represented by
//! `chrono`, so dates are kept as plain field tuples and converted through a
//! per-calendar day number.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CommonError, CommonResult};

const SECONDS_PER_DAY: i64 = 86_400;

/// Largest time offset accepted, in seconds (about 3e9 years).
const MAX_OFFSET_SECONDS: f64 = 1.0e17;

const MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const LEAP_MONTH_DAYS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// CF calendar attached to a time coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calendar {
    /// Mixed Julian/Gregorian in CF; evaluated as proleptic Gregorian here.
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "proleptic_gregorian")]
    ProlepticGregorian,
    #[serde(rename = "noleap")]
    NoLeap,
    #[serde(rename = "all_leap")]
    AllLeap,
    #[serde(rename = "360_day")]
    Day360,
    #[serde(rename = "julian")]
    Julian,
}

impl Calendar {
    /// Canonical CF name.
    pub fn name(&self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
            Calendar::Julian => "julian",
        }
    }

    /// Whether `year` has a leap day in this calendar.
    pub fn is_leap(&self, year: i32) -> bool {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
            }
            Calendar::Julian => year.rem_euclid(4) == 0,
            Calendar::AllLeap => true,
            Calendar::NoLeap | Calendar::Day360 => false,
        }
    }

    /// Number of days in the given month (1-based).
    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        if *self == Calendar::Day360 {
            return 30;
        }
        let table = if self.is_leap(year) {
            &LEAP_MONTH_DAYS
        } else {
            &MONTH_DAYS
        };
        table[(month as usize).saturating_sub(1).min(11)]
    }

    fn days_before_month(&self, year: i32, month: u32) -> i64 {
        (1..month)
            .map(|m| self.days_in_month(year, m) as i64)
            .sum()
    }

    fn days_in_year(&self, year: i32) -> i64 {
        match self {
            Calendar::Day360 => 360,
            _ if self.is_leap(year) => 366,
            _ => 365,
        }
    }

    /// Days elapsed before January 1st of `year`, counted from year 0.
    fn julian_year_start(year: i64) -> i64 {
        365 * year + (year + 3).div_euclid(4)
    }

    /// Convert a date to a day count that is monotonic within this calendar.
    pub fn day_number(&self, date: &CalendarDate) -> CommonResult<i64> {
        if date.month == 0 || date.month > 12 {
            return Err(CommonError::InvalidDate(date.to_string()));
        }
        if date.day == 0 || date.day > self.days_in_month(date.year, date.month) {
            return Err(CommonError::InvalidDate(format!(
                "{} ({} calendar)",
                date,
                self.name()
            )));
        }

        let year = date.year as i64;
        let day_of_year = self.days_before_month(date.year, date.month) + date.day as i64 - 1;

        let number = match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                NaiveDate::from_ymd_opt(date.year, date.month, date.day)
                    .ok_or_else(|| CommonError::InvalidDate(date.to_string()))?
                    .num_days_from_ce() as i64
            }
            Calendar::Day360 => year * 360 + day_of_year,
            Calendar::NoLeap => year * 365 + day_of_year,
            Calendar::AllLeap => year * 366 + day_of_year,
            Calendar::Julian => Self::julian_year_start(year) + day_of_year,
        };
        Ok(number)
    }

    /// Inverse of [`Calendar::day_number`]; the result is at midnight.
    pub fn date_from_day_number(&self, number: i64) -> CommonResult<CalendarDate> {
        let (year, day_of_year) = match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let days = i32::try_from(number)
                    .map_err(|_| CommonError::InvalidDate(format!("day number {}", number)))?;
                let date = NaiveDate::from_num_days_from_ce_opt(days)
                    .ok_or_else(|| CommonError::InvalidDate(format!("day number {}", number)))?;
                return Ok(CalendarDate::new(date.year(), date.month(), date.day()));
            }
            Calendar::Day360 => (number.div_euclid(360), number.rem_euclid(360)),
            Calendar::NoLeap => (number.div_euclid(365), number.rem_euclid(365)),
            Calendar::AllLeap => (number.div_euclid(366), number.rem_euclid(366)),
            Calendar::Julian => {
                let mut year = (number as f64 / 365.25).floor() as i64;
                while Self::julian_year_start(year) > number {
                    year -= 1;
                }
                while Self::julian_year_start(year + 1) <= number {
                    year += 1;
                }
                (year, number - Self::julian_year_start(year))
            }
        };

        let year = i32::try_from(year)
            .map_err(|_| CommonError::InvalidDate(format!("day number {}", number)))?;
        debug_assert!(day_of_year < self.days_in_year(year));

        let mut remaining = day_of_year;
        let mut month = 1;
        while month < 12 {
            let len = self.days_in_month(year, month) as i64;
            if remaining < len {
                break;
            }
            remaining -= len;
            month += 1;
        }
        Ok(CalendarDate::new(year, month, remaining as u32 + 1))
    }

    /// Decode a numeric time value expressed in `units`.
    pub fn date_from_offset(&self, units: &TimeUnits, value: f64) -> CommonResult<CalendarDate> {
        if !value.is_finite() {
            return Err(CommonError::InvalidDate(format!("non-finite offset {}", value)));
        }
        let epoch_day = self.day_number(&units.epoch)?;
        let epoch_seconds = epoch_day * SECONDS_PER_DAY + units.epoch.seconds_of_day();
        let offset = (value * units.unit.seconds()).round();
        // Beyond this no calendar year fits in an i32; fill values land here.
        if offset.abs() > MAX_OFFSET_SECONDS {
            return Err(CommonError::InvalidDate(format!("offset {} out of range", value)));
        }
        let total = epoch_seconds
            .checked_add(offset as i64)
            .ok_or_else(|| CommonError::InvalidDate(format!("offset {} out of range", value)))?;

        let day = total.div_euclid(SECONDS_PER_DAY);
        let seconds_of_day = total.rem_euclid(SECONDS_PER_DAY);
        let date = self.date_from_day_number(day)?;
        Ok(date.with_time(
            (seconds_of_day / 3600) as u32,
            ((seconds_of_day % 3600) / 60) as u32,
            (seconds_of_day % 60) as u32,
        ))
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Calendar {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "no_leap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            "julian" => Ok(Calendar::Julian),
            other => Err(CommonError::UnknownCalendar(other.to_string())),
        }
    }
}

/// Unit of a CF time offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of one unit in seconds.
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => SECONDS_PER_DAY as f64,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "days" | "day" | "d" => Ok(TimeUnit::Days),
            "hours" | "hour" | "hrs" | "hr" | "h" => Ok(TimeUnit::Hours),
            "minutes" | "minute" | "mins" | "min" => Ok(TimeUnit::Minutes),
            "seconds" | "second" | "secs" | "sec" | "s" => Ok(TimeUnit::Seconds),
            other => Err(CommonError::InvalidUnits(format!("unsupported unit '{}'", other))),
        }
    }
}

/// Parsed `"<unit> since <epoch>"` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: CalendarDate,
}

impl TimeUnits {
    /// Convert a value in these units to fractional days.
    pub fn to_days(&self, value: f64) -> f64 {
        value * self.unit.seconds() / SECONDS_PER_DAY as f64
    }
}

impl FromStr for TimeUnits {
    type Err = CommonError;

    /// Parse CF units such as `days since 1850-01-01` or
    /// `hours since 2000-01-01T06:00:00Z`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CommonError::InvalidUnits(s.to_string());

        let mut parts = s.split_whitespace();
        let unit: TimeUnit = parts.next().ok_or_else(invalid)?.parse()?;
        if !parts.next().is_some_and(|w| w.eq_ignore_ascii_case("since")) {
            return Err(invalid());
        }

        let date_part = parts.next().ok_or_else(invalid)?;
        let (date_str, mut time_str) = match date_part.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (date_part, None),
        };
        if time_str.is_none() {
            time_str = parts.next();
        }

        let (negative, date_body) = match date_str.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, date_str),
        };
        let fields: Vec<&str> = date_body.split('-').collect();
        if fields.is_empty() || fields.len() > 3 {
            return Err(invalid());
        }
        let year: i32 = fields[0].parse().map_err(|_| invalid())?;
        let month: u32 = fields.get(1).map_or(Ok(1), |f| f.parse()).map_err(|_| invalid())?;
        let day: u32 = fields.get(2).map_or(Ok(1), |f| f.parse()).map_err(|_| invalid())?;
        let year = if negative { -year } else { year };

        let (mut hour, mut minute, mut second) = (0, 0, 0);
        if let Some(time) = time_str {
            let time = time.trim_end_matches(['Z', 'z']);
            if !time.eq_ignore_ascii_case("utc") && !time.is_empty() {
                let fields: Vec<&str> = time.split(':').collect();
                hour = fields[0].parse().map_err(|_| invalid())?;
                if let Some(m) = fields.get(1) {
                    minute = m.parse().map_err(|_| invalid())?;
                }
                if let Some(sec) = fields.get(2) {
                    let sec: f64 = sec.parse().map_err(|_| invalid())?;
                    second = sec.floor() as u32;
                }
            }
        }
        if month == 0 || month > 12 || day == 0 || day > 31 || hour > 23 || minute > 59 || second > 59
        {
            return Err(invalid());
        }

        Ok(TimeUnits {
            unit,
            epoch: CalendarDate::new(year, month, day).with_time(hour, minute, second),
        })
    }
}

/// A date in an arbitrary CF calendar.
///
/// Field order makes the derived `Ord` chronological, which is only
/// meaningful between dates of the same calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }

    pub fn with_time(self, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
            ..self
        }
    }

    fn seconds_of_day(&self) -> i64 {
        (self.hour * 3600 + self.minute * 60 + self.second) as i64
    }

    /// Format with the `%Y %m %d %H %M %S %%` subset of strftime.
    pub fn format(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len() + 8);
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('Y') => out.push_str(&format!("{:04}", self.year)),
                Some('m') => out.push_str(&format!("{:02}", self.month)),
                Some('d') => out.push_str(&format!("{:02}", self.day)),
                Some('H') => out.push_str(&format!("{:02}", self.hour)),
                Some('M') => out.push_str(&format!("{:02}", self.minute)),
                Some('S') => out.push_str(&format!("{:02}", self.second)),
                Some('%') => out.push('%'),
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            }
        }
        out
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

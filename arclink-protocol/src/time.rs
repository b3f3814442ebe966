//! Timestamps for ArcLink request lines and miniSEED record headers.
//!
//! Handles two representations:
//! - request line format: `"YYYY,MM,DD,hh,mm,ss"` (month/day based)
//! - miniSEED v2 BTime: binary day-of-year based (header bytes 20..30)

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::error::{ArclinkError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// Years accepted by [`Timestamp::parse`]; the request line has a four-digit year.
const MIN_YEAR: i64 = 1;
const MAX_YEAR: i64 = 9999;

/// Comparable timestamp represented as whole seconds since the Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
}

impl Timestamp {
    /// Sentinel written for a bound that could not be resolved.
    pub const UNSET: Self = Self { seconds: 0 };

    pub fn from_unix_seconds(seconds: i64) -> Self {
        Self { seconds }
    }

    pub fn unix_seconds(self) -> i64 {
        self.seconds
    }

    /// Current wall clock time, truncated to whole seconds.
    pub fn now() -> Self {
        let seconds = match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        Self { seconds }
    }

    /// Parse request line format: `"2024,1,15,10,30,45"`.
    ///
    /// Fields: year, month, day, hour, minute, second. Zero padding is optional.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_fields(s.trim()).ok_or_else(|| ArclinkError::InvalidTimestamp(s.to_owned()))
    }

    fn parse_fields(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 6 {
            return None;
        }
        let year: i64 = parts[0].parse().ok()?;
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return None;
        }
        let month: u32 = parts[1].parse().ok()?;
        let day: u32 = parts[2].parse().ok()?;
        let hour: u32 = parts[3].parse().ok()?;
        let minute: u32 = parts[4].parse().ok()?;
        let second: u32 = parts[5].parse().ok()?;

        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }

        let doy = month_day_to_doy(year, month, day)?;
        Some(Self::from_components(year, doy, hour, minute, second))
    }

    /// Parse a miniSEED v2 BTime starting at `header[20]`.
    ///
    /// BTime layout:
    /// - bytes 20..22: year (u16)
    /// - bytes 22..24: day-of-year (u16)
    /// - byte 24: hour, byte 25: minute, byte 26: second
    /// - byte 27: unused
    /// - bytes 28..30: 1/10000 second ticks (ignored)
    pub fn from_btime(header: &[u8], big_endian: bool) -> Option<Self> {
        if header.len() < 30 {
            return None;
        }
        let read_u16 = |at: usize| {
            let bytes = [header[at], header[at + 1]];
            if big_endian {
                u16::from_be_bytes(bytes)
            } else {
                u16::from_le_bytes(bytes)
            }
        };
        let year = read_u16(20) as i64;
        let doy = read_u16(22) as u32;
        let hour = header[24] as u32;
        let minute = header[25] as u32;
        // Leap seconds are encoded as second 60.
        let second = header[26] as u32;

        if year == 0 || doy == 0 || doy > 366 || hour > 23 || minute > 59 || second > 60 {
            return None;
        }

        Some(Self::from_components(year, doy, hour, minute, second))
    }

    /// Build a timestamp from year, day-of-year, and time components.
    fn from_components(year: i64, doy: u32, hour: u32, minute: u32, second: u32) -> Self {
        let days = days_from_civil(year, 1, 1) + (doy as i64) - 1;
        let seconds =
            days * SECONDS_PER_DAY + (hour as i64) * 3600 + (minute as i64) * 60 + (second as i64);
        Self { seconds }
    }

    /// Split into (year, month, day, hour, minute, second), UTC.
    fn civil(self) -> (i64, u32, u32, u32, u32, u32) {
        let days = self.seconds.div_euclid(SECONDS_PER_DAY);
        let time_of_day = self.seconds.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        (
            year,
            month,
            day,
            (time_of_day / 3600) as u32,
            ((time_of_day % 3600) / 60) as u32,
            (time_of_day % 60) as u32,
        )
    }

    /// Format as an ArcLink request line time: `"2024,01,15,10,30,45"`.
    pub fn to_arclink(self) -> String {
        let (y, mo, d, h, mi, s) = self.civil();
        format!("{y:04},{mo:02},{d:02},{h:02},{mi:02},{s:02}")
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (y, mo, d, h, mi, s) = self.civil();
        write!(f, "{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
    }
}

impl FromStr for Timestamp {
    type Err = ArclinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

// Proleptic Gregorian calendar in 400-year eras of 146097 days, counted
// from 0000-03-01 so the leap day falls at the end of each year.
const DAYS_PER_ERA: i64 = 146_097;
const EPOCH_SHIFT: i64 = 719_468;

/// Days since 1970-01-01 for a calendar date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * DAYS_PER_ERA + doe - EPOCH_SHIFT
}

/// Calendar date for a count of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + EPOCH_SHIFT;
    let era = z.div_euclid(DAYS_PER_ERA);
    let doe = z - era * DAYS_PER_ERA;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn month_lengths(year: i64) -> [u32; 12] {
    [
        31,
        if is_leap(year) { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ]
}

/// Convert month (1-12) and day (1-31) to day-of-year (1-366).
fn month_day_to_doy(year: i64, month: u32, day: u32) -> Option<u32> {
    if !(1..=12).contains(&month) {
        return None;
    }
    let month_days = month_lengths(year);
    let max_day = month_days[(month - 1) as usize];
    if day < 1 || day > max_day {
        return None;
    }

    let mut doy = day;
    for &md in month_days.iter().take((month - 1) as usize) {
        doy += md;
    }
    Some(doy)
}

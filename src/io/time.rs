//! CF-style time coordinates
//!
//! Time values are offsets from a reference date, described by a `units` attribute such
//! as `"seconds since 1900-01-01 00:00:00"` and a `calendar` attribute. The real-world
//! calendars and the 365-day model calendar are supported; a `noleap` date is stored as the
//! Gregorian date with the same month and day, which always exists.

use crate::errors::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use std::str::FromStr;

const MILLIS_PER_DAY: i64 = 86_400_000;
const DAYS_BEFORE_MONTH: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// `standard`, `gregorian` or `proleptic_gregorian`
    Gregorian,
    /// `noleap` or `365_day`
    NoLeap,
}

impl FromStr for Calendar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Calendar::Gregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            _ => Err(Error::Time(format!("unsupported calendar '{s}'"))),
        }
    }
}

const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A parsed `"<unit> since <date>"` string
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    /// Length of one unit in seconds
    pub seconds: f64,
    pub reference: NaiveDateTime,
}

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self> {
        let (unit, reference) = units
            .split_once(" since ")
            .ok_or_else(|| Error::Time(format!("expected '<unit> since <date>', got '{units}'")))?;
        let seconds = match unit.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" | "s" | "sec" | "secs" => 1.0,
            "minute" | "minutes" | "min" | "mins" => 60.0,
            "hour" | "hours" | "h" | "hr" | "hrs" => 3600.0,
            "day" | "days" | "d" => 86400.0,
            other => return Err(Error::Time(format!("unsupported time unit '{other}'"))),
        };
        Ok(Self {
            seconds,
            reference: parse_date(reference.trim())?,
        })
    }
}

fn parse_date(text: &str) -> Result<NaiveDateTime> {
    // Some files append a UTC marker
    let text = text.trim_end_matches(" UTC").trim_end_matches('Z');
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| Error::Time(format!("cannot parse reference date '{text}'")))
}

/// Milliseconds since 0000-01-01 counting 365 days in every year
fn noleap_millis(t: &NaiveDateTime) -> Result<i64> {
    if t.month() == 2 && t.day() == 29 {
        return Err(Error::Time(format!("{t} does not exist in the noleap calendar")));
    }
    let days = i64::from(t.year()) * 365 + DAYS_BEFORE_MONTH[t.month0() as usize] + i64::from(t.day0());
    let millis_of_day = i64::from(t.num_seconds_from_midnight()) * 1000
        + i64::from(t.nanosecond() / 1_000_000);
    Ok(days * MILLIS_PER_DAY + millis_of_day)
}

fn from_noleap_millis(millis: i64) -> Option<NaiveDateTime> {
    let days = millis.div_euclid(MILLIS_PER_DAY);
    let day_of_year = days.rem_euclid(365);
    let month0 = DAYS_BEFORE_MONTH.iter().rposition(|d| *d <= day_of_year)?;
    let day = day_of_year - DAYS_BEFORE_MONTH[month0] + 1;
    let year = i32::try_from(days.div_euclid(365)).ok()?;
    NaiveDate::from_ymd_opt(year, month0 as u32 + 1, day as u32)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_milliseconds(millis.rem_euclid(MILLIS_PER_DAY))?)
}

/// Convert numeric offsets into timestamps
pub fn decode(values: &[f64], units: &str, calendar: &str) -> Result<Vec<NaiveDateTime>> {
    let calendar: Calendar = calendar.parse()?;
    let units = TimeUnits::parse(units)?;
    let reference = match calendar {
        Calendar::Gregorian => 0,
        Calendar::NoLeap => noleap_millis(&units.reference)?,
    };
    values
        .iter()
        .map(|v| {
            let millis = v * units.seconds * 1000.0;
            if !millis.is_finite() {
                return Err(Error::Time(format!("invalid time value {v}")));
            }
            let millis = millis.round() as i64;
            let time = match calendar {
                Calendar::Gregorian => TimeDelta::try_milliseconds(millis)
                    .and_then(|delta| units.reference.checked_add_signed(delta)),
                Calendar::NoLeap => reference.checked_add(millis).and_then(from_noleap_millis),
            };
            time.ok_or_else(|| Error::Time(format!("time value {v} is out of range")))
        })
        .collect()
}

/// Convert timestamps into numeric offsets
pub fn encode(times: &[NaiveDateTime], units: &str, calendar: &str) -> Result<Vec<f64>> {
    let calendar: Calendar = calendar.parse()?;
    let units = TimeUnits::parse(units)?;
    let reference = match calendar {
        Calendar::Gregorian => 0,
        Calendar::NoLeap => noleap_millis(&units.reference)?,
    };
    times
        .iter()
        .map(|t| -> Result<f64> {
            let millis = match calendar {
                Calendar::Gregorian => (*t - units.reference).num_milliseconds(),
                Calendar::NoLeap => noleap_millis(t)? - reference,
            };
            Ok(millis as f64 / 1000.0 / units.seconds)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn parse_units() {
        let units = TimeUnits::parse("seconds since 1900-01-01 00:00:00").unwrap();
        assert_eq!(units.seconds, 1.0);
        assert_eq!(units.reference, at(1900, 1, 1));

        let units = TimeUnits::parse("days since 1850-01-01").unwrap();
        assert_eq!(units.seconds, 86400.0);
        assert_eq!(units.reference, at(1850, 1, 1));

        assert!(TimeUnits::parse("fortnights since 1850-01-01").is_err());
        assert!(TimeUnits::parse("days").is_err());
    }

    #[test]
    fn decode_and_encode() {
        let times = decode(&[0.0, 31.0, 365.5], "days since 2000-01-01", "gregorian").unwrap();
        assert_eq!(times[0], at(2000, 1, 1));
        assert_eq!(times[1], at(2000, 2, 1));
        assert_eq!(times[2], at(2000, 12, 31) + TimeDelta::hours(12));

        let back = encode(&times, "days since 2000-01-01", "standard").unwrap();
        assert_eq!(back, vec![0.0, 31.0, 365.5]);
    }

    #[test]
    fn noleap_calendar_skips_29_february() {
        let times = decode(&[58.0, 59.0, 365.0], "days since 2000-01-01", "noleap").unwrap();
        assert_eq!(times, vec![at(2000, 2, 28), at(2000, 3, 1), at(2001, 1, 1)]);
        assert_eq!(
            encode(&times, "days since 2000-01-01", "365_day").unwrap(),
            vec![58.0, 59.0, 365.0]
        );

        let times = decode(&[-0.5], "days since 2001-01-01", "noleap").unwrap();
        assert_eq!(times[0], at(2000, 12, 31) + TimeDelta::hours(12));

        assert!(encode(&[at(2000, 2, 29)], "days since 2000-01-01", "noleap").is_err());
    }

    #[test]
    fn unknown_calendars_are_rejected() {
        assert!(matches!(
            decode(&[0.0], "days since 2000-01-01", "360_day"),
            Err(Error::Time(_))
        ));
        assert!(encode(&[at(2000, 1, 1)], "days since 2000-01-01", "julian").is_err());
        assert_eq!("NOLEAP".parse::<Calendar>().unwrap(), Calendar::NoLeap);
    }
}

//! CF Time Module
//! Parses CF-convention time units ("days since 1860-01-01") and maps
//! time values to calendar years.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CfTimeError {
    #[error("Invalid time units: {0}")]
    InvalidUnits(String),
    #[error("Invalid reference date: {0}")]
    InvalidDate(String),
    #[error("Unsupported calendar: {0}")]
    UnsupportedCalendar(String),
    #[error("Time value out of range: {0}")]
    Overflow(f64),
}

/// CF calendar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CfCalendar {
    /// standard / gregorian / proleptic_gregorian
    #[default]
    Standard,
    /// noleap / 365_day
    NoLeap,
    /// all_leap / 366_day
    AllLeap,
    /// 360_day
    Day360,
}

impl CfCalendar {
    pub fn parse(name: &str) -> Result<Self, CfTimeError> {
        match name.trim().to_lowercase().as_str() {
            "" | "standard" | "gregorian" | "proleptic_gregorian" => Ok(CfCalendar::Standard),
            "noleap" | "365_day" => Ok(CfCalendar::NoLeap),
            "all_leap" | "366_day" => Ok(CfCalendar::AllLeap),
            "360_day" => Ok(CfCalendar::Day360),
            other => Err(CfTimeError::UnsupportedCalendar(other.to_string())),
        }
    }

    /// Whether the date exists in this calendar.
    fn has_date(&self, reference: &CfReference) -> bool {
        let month_len = match (self, reference.month) {
            (_, m) if !(1..=12).contains(&m) => return false,
            (CfCalendar::Standard, _) => return reference.to_datetime().is_some(),
            (CfCalendar::Day360, _) => 30,
            (CfCalendar::AllLeap, 2) => 29,
            (_, m) => NOLEAP_MONTHS[(m - 1) as usize],
        };
        (1..=month_len).contains(&reference.day)
    }

    fn days_in_year(&self) -> Option<f64> {
        match self {
            CfCalendar::Standard => None,
            CfCalendar::NoLeap => Some(365.0),
            CfCalendar::AllLeap => Some(366.0),
            CfCalendar::Day360 => Some(360.0),
        }
    }

    /// Zero-based day of year of a reference date in a fixed-length calendar.
    fn day_of_year(&self, month: u32, day: u32) -> f64 {
        let before: u32 = match self {
            CfCalendar::Day360 => (month - 1) * 30,
            CfCalendar::AllLeap => {
                NOLEAP_MONTHS[..(month - 1) as usize].iter().sum::<u32>() + u32::from(month > 2)
            }
            _ => NOLEAP_MONTHS[..(month - 1) as usize].iter().sum(),
        };
        (before + day - 1) as f64
    }
}

const NOLEAP_MONTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Reference date of a units string as plain fields, since model calendars
/// have dates (2000-02-30) that chrono rejects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfReference {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Seconds after midnight.
    pub seconds: f64,
}

impl CfReference {
    /// Proleptic Gregorian instant of the reference.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::try_milliseconds((self.seconds * 1000.0).round() as i64)?)
    }
}

/// Parsed `"<unit> since <reference>"` string.
#[derive(Debug, Clone, PartialEq)]
pub struct CfTimeUnits {
    /// Seconds per unit.
    pub unit_seconds: f64,
    pub reference: CfReference,
    pub calendar: CfCalendar,
}

impl CfTimeUnits {
    pub fn parse(units: &str, calendar: CfCalendar) -> Result<Self, CfTimeError> {
        let lower = units.trim().to_lowercase();
        let (unit, reference) = lower
            .split_once(" since ")
            .ok_or_else(|| CfTimeError::InvalidUnits(units.to_string()))?;

        let unit_seconds = match unit.trim() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            _ => return Err(CfTimeError::InvalidUnits(units.to_string())),
        };

        let parsed = parse_reference(reference)?;
        if !calendar.has_date(&parsed) {
            return Err(CfTimeError::InvalidDate(reference.trim().to_string()));
        }

        Ok(Self {
            unit_seconds,
            reference: parsed,
            calendar,
        })
    }

    /// Calendar year containing the time value `offset`.
    pub fn year_of(&self, offset: f64) -> Result<i32, CfTimeError> {
        if !offset.is_finite() {
            return Err(CfTimeError::Overflow(offset));
        }
        let seconds = offset * self.unit_seconds;

        match self.calendar.days_in_year() {
            None => {
                let start = self
                    .reference
                    .to_datetime()
                    .ok_or(CfTimeError::Overflow(offset))?;
                let delta = Duration::try_milliseconds((seconds * 1000.0).round() as i64)
                    .ok_or(CfTimeError::Overflow(offset))?;
                start
                    .checked_add_signed(delta)
                    .map(|t| t.year())
                    .ok_or(CfTimeError::Overflow(offset))
            }
            Some(year_len) => {
                let r = self.reference;
                let start = self.calendar.day_of_year(r.month, r.day) + r.seconds / 86400.0;
                let elapsed = start + seconds / 86400.0;
                Ok(r.year + (elapsed / year_len).floor() as i32)
            }
        }
    }
}

fn parse_reference(text: &str) -> Result<CfReference, CfTimeError> {
    let text = text.trim().trim_end_matches(" utc").trim_end_matches('z');
    let mut parts = text.split(|c| c == ' ' || c == 't');
    let date_part = parts.next().unwrap_or_default();
    let time_part = parts.next().unwrap_or("00:00:00");

    // CF allows non-padded dates such as "1-1-1"
    let fields: Vec<&str> = date_part.split('-').collect();
    if fields.len() != 3 {
        return Err(CfTimeError::InvalidDate(text.to_string()));
    }
    let parse = |s: &str| s.parse::<u32>().map_err(|_| CfTimeError::InvalidDate(text.to_string()));
    let year = fields[0]
        .parse::<i32>()
        .map_err(|_| CfTimeError::InvalidDate(text.to_string()))?;
    let (month, day) = (parse(fields[1])?, parse(fields[2])?);

    let hms: Vec<f64> = time_part
        .split(':')
        .map(|s| s.parse::<f64>().map_err(|_| CfTimeError::InvalidDate(text.to_string())))
        .collect::<Result<_, _>>()?;
    let seconds = hms.first().copied().unwrap_or(0.0) * 3600.0
        + hms.get(1).copied().unwrap_or(0.0) * 60.0
        + hms.get(2).copied().unwrap_or(0.0);

    Ok(CfReference {
        year,
        month,
        day,
        seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        let units = CfTimeUnits::parse("days since 1860-01-01 00:00:00", CfCalendar::Standard).unwrap();
        assert_eq!(units.unit_seconds, 86400.0);
        assert_eq!(
            units.reference.to_datetime(),
            NaiveDate::from_ymd_opt(1860, 1, 1).unwrap().and_hms_opt(0, 0, 0)
        );

        let units = CfTimeUnits::parse("hours since 1-1-1", CfCalendar::Standard).unwrap();
        assert_eq!(units.unit_seconds, 3600.0);
        assert_eq!(units.reference.year, 1);

        assert!(CfTimeUnits::parse("fortnights since 1900-01-01", CfCalendar::Standard).is_err());
        assert!(CfTimeUnits::parse("days after 1900-01-01", CfCalendar::Standard).is_err());
        assert!(CfTimeUnits::parse("days since 1900-13-01", CfCalendar::Standard).is_err());
    }

    #[test]
    fn test_year_of_standard_calendar() {
        let units = CfTimeUnits::parse("days since 1971-01-01", CfCalendar::Standard).unwrap();
        assert_eq!(units.year_of(0.0).unwrap(), 1971);
        assert_eq!(units.year_of(364.5).unwrap(), 1971);
        assert_eq!(units.year_of(365.0).unwrap(), 1972);
        // 1972 is a leap year
        assert_eq!(units.year_of(365.0 + 365.0).unwrap(), 1972);
        assert_eq!(units.year_of(365.0 + 366.0).unwrap(), 1973);
        assert!(units.year_of(f64::NAN).is_err());
    }

    #[test]
    fn test_year_of_fixed_calendars() {
        let noleap = CfTimeUnits::parse("days since 1970-07-01", CfCalendar::NoLeap).unwrap();
        // 1 July is day 181 of a 365-day year
        assert_eq!(noleap.year_of(183.0).unwrap(), 1970);
        assert_eq!(noleap.year_of(184.0).unwrap(), 1971);

        let d360 = CfTimeUnits::parse("days since 2000-01-01", CfCalendar::Day360).unwrap();
        assert_eq!(d360.year_of(359.0).unwrap(), 2000);
        assert_eq!(d360.year_of(360.0).unwrap(), 2001);
        assert_eq!(d360.year_of(-1.0).unwrap(), 1999);
    }

    #[test]
    fn test_model_calendar_reference_dates() {
        let d360 = CfTimeUnits::parse("days since 2000-02-30", CfCalendar::Day360).unwrap();
        assert_eq!((d360.reference.month, d360.reference.day), (2, 30));
        // 30 Feb is day 59 of a 360-day year
        assert_eq!(d360.year_of(300.0).unwrap(), 2000);
        assert_eq!(d360.year_of(301.0).unwrap(), 2001);

        assert!(CfTimeUnits::parse("days since 2000-02-30", CfCalendar::Standard).is_err());
        assert!(CfTimeUnits::parse("days since 2000-02-29", CfCalendar::NoLeap).is_err());
        assert!(CfTimeUnits::parse("days since 2001-02-29", CfCalendar::AllLeap).is_ok());
        assert!(CfTimeUnits::parse("days since 2000-01-31", CfCalendar::Day360).is_err());
    }

    #[test]
    fn test_calendar_names() {
        assert_eq!(CfCalendar::parse("proleptic_gregorian").unwrap(), CfCalendar::Standard);
        assert_eq!(CfCalendar::parse("365_day").unwrap(), CfCalendar::NoLeap);
        assert!(matches!(
            CfCalendar::parse("julian"),
            Err(CfTimeError::UnsupportedCalendar(_))
        ));
    }
}

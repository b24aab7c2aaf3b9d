//! Timestamp resolution for DAGMan output lines.
//!
//! DAGMan has written two timestamp encodings over the years and both can
//! show up in the same log:
//!
//! - locale style `MM/DD[/YY] HH:MM:SS`, interpreted in the local zone
//! - ISO-8601 style `YYYY-MM-DD[T ]HH:MM:SS[.fraction](Z|+HH:MM|-HH:MM)`
//!
//! Both resolve to epoch seconds with a configurable adjustment added.

use chrono::{Datelike, Local, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use regex::{Captures, Regex};

const LOCALE_PATTERN: &str =
    r"^\s*(\d{1,2})/(\d{1,2})(/(\d{1,2}))?\s+(\d{1,2}):(\d{2}):(\d{2})";
const ISO_PATTERN: &str =
    r"^\s*(\d{4}).?(\d{2}).?(\d{2}).(\d{2}).?(\d{2}).?(\d{2})([.,]\d+)?([Zz]|[-+](\d{2}).?(\d{2}))";

/// Resolves the leading timestamp of a log line to epoch seconds.
#[derive(Debug, Clone)]
pub struct TimestampResolver<Tz: TimeZone = Local> {
    locale: Regex,
    iso: Regex,
    adjustment: i64,
    zone: Tz,
    reference_year: Option<i32>,
}

impl TimestampResolver<Local> {
    /// Create a resolver interpreting locale timestamps in the local zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in patterns fail to compile.
    pub fn new(adjustment: i64) -> Result<Self, regex::Error> {
        Self::with_zone(adjustment, Local)
    }
}

impl<Tz: TimeZone> TimestampResolver<Tz> {
    /// Create a resolver interpreting locale timestamps in `zone`.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in patterns fail to compile.
    pub fn with_zone(adjustment: i64, zone: Tz) -> Result<Self, regex::Error> {
        Ok(Self {
            locale: Regex::new(LOCALE_PATTERN)?,
            iso: Regex::new(ISO_PATTERN)?,
            adjustment,
            zone,
            reference_year: None,
        })
    }

    /// Pin the year used for locale timestamps that carry none.
    #[must_use]
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// Seconds added to every resolved timestamp.
    #[must_use]
    pub fn adjustment(&self) -> i64 {
        self.adjustment
    }

    /// Resolve the timestamp at the start of `line`.
    ///
    /// Returns `None` when neither encoding matches or an ISO stamp is not
    /// a valid date. Out-of-range locale fields roll over into the next
    /// unit, so `02/29` in a non-leap year is March 1st.
    #[must_use]
    pub fn resolve(&self, line: &str) -> Option<i64> {
        if let Some(caps) = self.locale.captures(line) {
            return self.resolve_locale(&caps);
        }
        let caps = self.iso.captures(line)?;
        self.resolve_iso(&caps)
    }

    fn resolve_locale(&self, caps: &Captures<'_>) -> Option<i64> {
        let year = match caps.get(4) {
            Some(yy) => 2000 + yy.as_str().parse::<i32>().ok()?,
            None => self.current_year(),
        };
        let naive = normalized_datetime(
            year,
            field(caps, 1)?,
            field(caps, 2)?,
            field(caps, 5)?,
            field(caps, 6)?,
            field(caps, 7)?,
        )?;

        // Daylight saving is left to the zone; a time inside a spring-forward
        // gap is pushed past the gap.
        let local = match self.zone.from_local_datetime(&naive) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
            LocalResult::None => self
                .zone
                .from_local_datetime(&(naive + TimeDelta::hours(1)))
                .earliest()?,
        };
        Some(local.timestamp() + self.adjustment)
    }

    fn resolve_iso(&self, caps: &Captures<'_>) -> Option<i64> {
        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let mut naive = naive_datetime(
            year,
            field(caps, 2)?,
            field(caps, 3)?,
            field(caps, 4)?,
            field(caps, 5)?,
            field(caps, 6)?,
        )?;

        let zone = caps.get(8)?.as_str();
        if !zone.eq_ignore_ascii_case("z") {
            let offset = TimeDelta::hours(i64::from(field(caps, 9)?))
                + TimeDelta::minutes(i64::from(field(caps, 10)?));
            if zone.starts_with('-') {
                naive += offset;
            } else {
                naive -= offset;
            }
        }
        Some(naive.and_utc().timestamp() + self.adjustment)
    }

    fn current_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| Utc::now().with_timezone(&self.zone).year())
    }
}

fn field(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index)?.as_str().parse().ok()
}

fn naive_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Like `naive_datetime`, but overflowing fields carry into larger units.
fn normalized_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<NaiveDateTime> {
    let months = i64::from(year) * 12 + i64::from(month) - 1;
    let year = i32::try_from(months.div_euclid(12)).ok()?;
    let month = u32::try_from(months.rem_euclid(12)).ok()? + 1;
    let carry = TimeDelta::days(i64::from(day) - 1)
        + TimeDelta::hours(i64::from(hour))
        + TimeDelta::minutes(i64::from(minute))
        + TimeDelta::seconds(i64::from(second));
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(carry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc_epoch(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().timestamp()
    }

    fn resolver_in(offset_secs: i32, adjustment: i64) -> TimestampResolver<FixedOffset> {
        TimestampResolver::with_zone(adjustment, FixedOffset::east_opt(offset_secs).unwrap())
            .unwrap()
            .with_reference_year(2023)
    }

    #[test]
    fn test_iso_zulu() {
        let resolver = resolver_in(0, 0);
        let ts = resolver.resolve("2024-03-05T10:20:30Z Event: ULOG_SUBMIT");
        assert_eq!(ts, Some(utc_epoch(2024, 3, 5, 10, 20, 30)));
    }

    #[test]
    fn test_iso_lowercase_zulu_with_fraction() {
        let resolver = resolver_in(0, 0);
        let ts = resolver.resolve("2024-03-05 10:20:30.123z rest");
        assert_eq!(ts, Some(utc_epoch(2024, 3, 5, 10, 20, 30)));
    }

    #[test]
    fn test_iso_positive_offset_is_subtracted() {
        let resolver = resolver_in(0, 0);
        let ts = resolver.resolve("2024-03-05T10:20:30+02:00 x");
        assert_eq!(ts, Some(utc_epoch(2024, 3, 5, 8, 20, 30)));
    }

    #[test]
    fn test_iso_negative_offset_is_added() {
        let resolver = resolver_in(0, 0);
        let ts = resolver.resolve("2024-03-05T22:20:30-05:30 x");
        assert_eq!(ts, Some(utc_epoch(2024, 3, 6, 3, 50, 30)));
    }

    #[test]
    fn test_locale_with_two_digit_year() {
        let resolver = resolver_in(3600, 0);
        let ts = resolver.resolve("03/05/24 10:20:30 Submitting Condor Node A job(s)...");
        let expected = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 10, 20, 30)
            .unwrap()
            .timestamp();
        assert_eq!(ts, Some(expected));
    }

    #[test]
    fn test_locale_without_year_uses_reference_year() {
        let resolver = resolver_in(0, 0);
        let ts = resolver.resolve("12/31 23:59:59 ** PID = 4242");
        assert_eq!(ts, Some(utc_epoch(2023, 12, 31, 23, 59, 59)));
    }

    #[test]
    fn test_adjustment_applies_to_both_formats() {
        let resolver = resolver_in(0, 7200);
        assert_eq!(
            resolver.resolve("2024-03-05T10:20:30Z"),
            Some(utc_epoch(2024, 3, 5, 10, 20, 30) + 7200)
        );
        assert_eq!(
            resolver.resolve("03/05/24 10:20:30"),
            Some(utc_epoch(2024, 3, 5, 10, 20, 30) + 7200)
        );
    }

    #[test]
    fn test_unrecognized_line() {
        let resolver = resolver_in(0, 0);
        assert_eq!(resolver.resolve("no timestamp here"), None);
        assert_eq!(resolver.resolve(""), None);
    }

    #[test]
    fn test_locale_overflow_rolls_forward() {
        let resolver = resolver_in(0, 0);
        assert_eq!(
            resolver.resolve("13/40/24 10:20:30"),
            Some(utc_epoch(2025, 2, 9, 10, 20, 30))
        );
        assert_eq!(
            resolver.resolve("12/31/24 23:59:60"),
            Some(utc_epoch(2025, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            resolver.resolve("00/00/24 10:00:00"),
            Some(utc_epoch(2023, 11, 30, 10, 0, 0))
        );
    }

    #[test]
    fn test_leap_day_in_common_year() {
        let resolver = resolver_in(0, 0);
        assert_eq!(
            resolver.resolve("02/29 10:00:00 Event: ULOG_SUBMIT for Condor Node A (1.0.0)"),
            Some(utc_epoch(2023, 3, 1, 10, 0, 0))
        );
    }

    #[test]
    fn test_invalid_iso_date() {
        let resolver = resolver_in(0, 0);
        assert_eq!(resolver.resolve("2024-02-30T10:20:30Z"), None);
    }
}

//! Time types for calendar events.
//!
//! [`EventTime`] is the start or end of an event, either an instant or an
//! all-day date. [`TimeWindow`] is the half-open range used for listing.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// Represents the time of a calendar event.
///
/// - **DateTime**: a specific instant, normalized to UTC
/// - **AllDay**: a calendar date without a time of day
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific datetime, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a new `EventTime::DateTime` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a new `EventTime::DateTime` from a datetime in any timezone.
    pub fn from_local<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Creates a new `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Parses a caller-supplied timestamp.
    ///
    /// Accepts RFC 3339 date-times carrying an offset (`Z` or `+hh:mm`) and
    /// bare `YYYY-MM-DD` dates, which become all-day times. A date-time
    /// without an offset is rejected since its instant is ambiguous.
    pub fn parse(value: &str) -> ValidationResult<Self> {
        let trimmed = value.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::from_local(dt));
        }
        // Minute precision with offset, e.g. 2024-01-01T09:00+01:00
        if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M%:z") {
            return Ok(Self::from_local(dt));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::AllDay(date));
        }

        let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).is_ok());
        if naive {
            return Err(ValidationError::MissingTimezone {
                value: value.to_string(),
            });
        }

        Err(ValidationError::InvalidTimestamp {
            value: value.to_string(),
        })
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns `true` if this is a specific datetime.
    pub fn is_datetime(&self) -> bool {
        matches!(self, Self::DateTime(_))
    }

    /// Returns the datetime if this is a `DateTime` variant.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::AllDay(_) => None,
        }
    }

    /// Returns the date if this is an `AllDay` variant.
    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            Self::AllDay(d) => Some(d),
            Self::DateTime(_) => None,
        }
    }

    /// Converts to a UTC datetime for comparison purposes.
    ///
    /// For all-day events, returns midnight UTC on that date.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Returns the date portion of this event time.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.date_naive(),
            Self::AllDay(date) => *date,
        }
    }

    /// Returns `true` when both times are of the same variant.
    pub fn same_kind(&self, other: &EventTime) -> bool {
        self.is_all_day() == other.is_all_day()
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DateTime(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Self::AllDay(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime()
            .cmp(&other.to_utc_datetime())
            .then_with(|| self.is_datetime().cmp(&other.is_datetime()))
    }
}

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a time window, rejecting empty or inverted ranges.
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> ValidationResult<Self> {
        if start >= end {
            return Err(ValidationError::EmptyWindow);
        }
        Ok(Self { start, end })
    }

    /// The UTC calendar day containing `date`.
    pub fn for_utc_date(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: next_midnight(date),
        }
    }

    /// The UTC calendar day containing `now`.
    pub fn today(now: DateTime<Utc>) -> Self {
        Self::for_utc_date(now.date_naive())
    }

    /// Builds a listing window from optional caller bounds.
    ///
    /// A missing start means the beginning of today. A missing end means the
    /// end of the start's day. An all-day end covers that whole date.
    pub fn from_bounds(
        start: Option<&EventTime>,
        end: Option<&EventTime>,
        now: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        let start = match start {
            Some(t) => t.to_utc_datetime(),
            None => Self::today(now).start,
        };
        let end = match end {
            Some(EventTime::DateTime(dt)) => *dt,
            Some(EventTime::AllDay(date)) => next_midnight(*date),
            None => next_midnight(start.date_naive()),
        };
        Self::try_new(start, end)
    }

    /// Returns the duration of this time window.
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Checks if a datetime falls within this window.
    ///
    /// Uses half-open interval semantics: `[start, end)`.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if an event with given start and end times overlaps with this window.
    ///
    /// An event overlaps if it starts before the window ends and ends after
    /// the window starts. Zero-length events overlap when their instant lies
    /// inside the window.
    pub fn overlaps_event(&self, event_start: &EventTime, event_end: &EventTime) -> bool {
        let start = event_start.to_utc_datetime();
        let end = event_end.to_utc_datetime();
        if start == end {
            return self.contains(start);
        }
        start < self.end && end > self.start
    }
}

fn next_midnight(date: NaiveDate) -> DateTime<Utc> {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    next.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod event_time {
        use super::*;

        #[test]
        fn parse_rfc3339_with_offset() {
            let et = EventTime::parse("2024-01-01T10:00:00+01:00").unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2024, 1, 1, 9, 0, 0)));

            let et = EventTime::parse("2024-01-01T09:00:00Z").unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2024, 1, 1, 9, 0, 0)));
        }

        #[test]
        fn parse_minute_precision() {
            let et = EventTime::parse("2024-01-01T09:30+00:00").unwrap();
            assert_eq!(et, EventTime::from_utc(utc(2024, 1, 1, 9, 30, 0)));
        }

        #[test]
        fn parse_date_only_is_all_day() {
            let et = EventTime::parse("2024-03-15").unwrap();
            assert_eq!(et, EventTime::from_date(date(2024, 3, 15)));
        }

        #[test]
        fn parse_rejects_naive_datetime() {
            let err = EventTime::parse("2024-01-01T09:00:00").unwrap_err();
            assert!(matches!(err, ValidationError::MissingTimezone { .. }));
        }

        #[test]
        fn parse_rejects_garbage() {
            let err = EventTime::parse("tomorrow").unwrap_err();
            assert!(matches!(err, ValidationError::InvalidTimestamp { .. }));
        }

        #[test]
        fn display() {
            let et = EventTime::from_utc(utc(2024, 1, 1, 9, 0, 0));
            assert_eq!(et.to_string(), "2024-01-01T09:00:00Z");
            assert_eq!(EventTime::from_date(date(2024, 1, 1)).to_string(), "2024-01-01");
        }

        #[test]
        fn to_utc_datetime() {
            let d = date(2025, 2, 5);
            let et_ad = EventTime::from_date(d);
            assert_eq!(et_ad.to_utc_datetime(), utc(2025, 2, 5, 0, 0, 0));
        }

        #[test]
        fn ordering() {
            let et1 = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            let et2 = EventTime::from_utc(utc(2025, 2, 5, 11, 0, 0));
            let et3 = EventTime::from_date(date(2025, 2, 5));

            assert!(et3 < et1);
            assert!(et1 < et2);
        }

        #[test]
        fn all_day_sorts_before_timed_at_midnight() {
            let all_day = EventTime::from_date(date(2025, 2, 5));
            let midnight = EventTime::from_utc(utc(2025, 2, 5, 0, 0, 0));
            assert!(all_day < midnight);
        }
    }

    mod time_window {
        use super::*;

        #[test]
        fn try_new_rejects_empty() {
            let t = utc(2025, 2, 5, 9, 0, 0);
            assert_eq!(TimeWindow::try_new(t, t), Err(ValidationError::EmptyWindow));
            assert!(TimeWindow::try_new(t, utc(2025, 2, 5, 8, 0, 0)).is_err());
        }

        #[test]
        fn contains_datetime() {
            let window =
                TimeWindow::try_new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0)).unwrap();

            assert!(window.contains(utc(2025, 2, 5, 9, 0, 0)));
            assert!(window.contains(utc(2025, 2, 5, 16, 59, 59)));
            assert!(!window.contains(utc(2025, 2, 5, 17, 0, 0)));
            assert!(!window.contains(utc(2025, 2, 5, 8, 59, 59)));
        }

        #[test]
        fn overlaps_event() {
            let window =
                TimeWindow::try_new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0)).unwrap();
            let at = |h| EventTime::from_utc(utc(2025, 2, 5, h, 0, 0));

            assert!(window.overlaps_event(&at(10), &at(11)));
            assert!(window.overlaps_event(&at(8), &at(10)));
            assert!(window.overlaps_event(&at(16), &at(18)));
            assert!(window.overlaps_event(&at(8), &at(18)));
            // Touching boundaries do not overlap
            assert!(!window.overlaps_event(&at(8), &at(9)));
            assert!(!window.overlaps_event(&at(17), &at(18)));
        }

        #[test]
        fn zero_length_event_inside_window() {
            let window =
                TimeWindow::try_new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0)).unwrap();
            let t = EventTime::from_utc(utc(2025, 2, 5, 9, 0, 0));
            assert!(window.overlaps_event(&t, &t));
            let t = EventTime::from_utc(utc(2025, 2, 5, 17, 0, 0));
            assert!(!window.overlaps_event(&t, &t));
        }

        #[test]
        fn all_day_event_overlaps_its_day() {
            let window = TimeWindow::for_utc_date(date(2025, 2, 5));
            let start = EventTime::from_date(date(2025, 2, 5));
            let end = EventTime::from_date(date(2025, 2, 6));
            assert!(window.overlaps_event(&start, &end));

            let next = TimeWindow::for_utc_date(date(2025, 2, 6));
            assert!(!next.overlaps_event(&start, &end));
        }

        #[test]
        fn from_bounds_defaults_to_today() {
            let now = utc(2024, 1, 1, 15, 30, 0);
            let window = TimeWindow::from_bounds(None, None, now).unwrap();
            assert_eq!(window.start, utc(2024, 1, 1, 0, 0, 0));
            assert_eq!(window.end, utc(2024, 1, 2, 0, 0, 0));
        }

        #[test]
        fn from_bounds_missing_end_covers_start_day() {
            let now = utc(2024, 1, 1, 15, 30, 0);
            let start = EventTime::from_utc(utc(2024, 3, 10, 8, 0, 0));
            let window = TimeWindow::from_bounds(Some(&start), None, now).unwrap();
            assert_eq!(window.start, utc(2024, 3, 10, 8, 0, 0));
            assert_eq!(window.end, utc(2024, 3, 11, 0, 0, 0));
        }

        #[test]
        fn from_bounds_date_only_end_is_inclusive() {
            let now = utc(2024, 1, 1, 15, 30, 0);
            let start = EventTime::from_date(date(2024, 3, 10));
            let end = EventTime::from_date(date(2024, 3, 12));
            let window = TimeWindow::from_bounds(Some(&start), Some(&end), now).unwrap();
            assert_eq!(window.start, utc(2024, 3, 10, 0, 0, 0));
            assert_eq!(window.end, utc(2024, 3, 13, 0, 0, 0));
        }

        #[test]
        fn from_bounds_rejects_inverted() {
            let now = utc(2024, 1, 1, 15, 30, 0);
            let start = EventTime::from_utc(utc(2024, 3, 10, 8, 0, 0));
            let end = EventTime::from_utc(utc(2024, 3, 9, 8, 0, 0));
            assert_eq!(
                TimeWindow::from_bounds(Some(&start), Some(&end), now),
                Err(ValidationError::EmptyWindow)
            );
        }

        #[test]
        fn duration_of_day() {
            let window = TimeWindow::for_utc_date(date(2025, 2, 5));
            assert_eq!(window.duration(), chrono::Duration::hours(24));
        }
    }
}

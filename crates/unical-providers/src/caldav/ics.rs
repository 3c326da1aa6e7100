//! iCalendar (RFC 5545) conversion for CalDAV resources.

use chrono::{DateTime, Days, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike,
};
use tracing::{debug, warn};
use unical_core::{CanonicalEvent, EventDraft, EventTime};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::UNTITLED;

/// Parses a calendar object and returns every VEVENT it holds.
///
/// With server-side expansion each recurring instance arrives as its own
/// VEVENT sharing the master's UID.
pub fn parse_events(ics: &str) -> ProviderResult<Vec<CanonicalEvent>> {
    let calendar = parse_calendar(ics)?;
    Ok(calendar
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => to_canonical(event),
            _ => None,
        })
        .collect())
}

/// Returns the master VEVENT (no RECURRENCE-ID) with the given UID.
pub fn find_master(ics: &str, uid: &str) -> ProviderResult<Option<CanonicalEvent>> {
    let calendar = parse_calendar(ics)?;
    Ok(calendar.iter().find_map(|component| match component {
        CalendarComponent::Event(event) if is_master(event, uid) => to_canonical(event),
        _ => None,
    }))
}

/// Serializes a new single-event calendar object.
pub fn build_calendar(uid: &str, draft: &EventDraft) -> String {
    let mut event = Event::new();
    event.uid(uid);
    event.summary(&draft.title);
    set_times(&mut event, &draft.start, &draft.end);
    if let Some(description) = &draft.description {
        event.description(description);
    }
    if let Some(location) = &draft.location {
        event.location(location);
    }
    stamp(&mut event);

    let mut calendar = Calendar::new();
    calendar.push(event.done());
    calendar.done().to_string()
}

/// Rewrites the master VEVENT of `ics` to match `updated`.
///
/// Other components (overridden instances, other VEVENTs) are kept as they
/// are. Start and end are always written in UTC or as dates so the result
/// never depends on a VTIMEZONE block.
pub fn rewrite_master(ics: &str, updated: &CanonicalEvent) -> ProviderResult<String> {
    let calendar = parse_calendar(ics)?;
    let mut rewritten = Calendar::new();
    let mut found = false;

    for component in calendar.iter() {
        match component {
            CalendarComponent::Event(event) if !found && is_master(event, &updated.id) => {
                let mut event = event.clone();
                event.summary(&updated.title);
                set_times(&mut event, &updated.start, &updated.end);
                if let Some(description) = &updated.description {
                    event.description(description);
                }
                if let Some(location) = &updated.location {
                    event.location(location);
                }
                let sequence = event
                    .property_value("SEQUENCE")
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .unwrap_or(0);
                event.add_property("SEQUENCE", (sequence + 1).to_string());
                stamp(&mut event);
                rewritten.push(event);
                found = true;
            }
            other => {
                rewritten.push(other.clone());
            }
        }
    }

    if !found {
        return Err(ProviderError::not_found(format!(
            "Event not found: {}",
            updated.id
        )));
    }
    Ok(rewritten.done().to_string())
}

fn parse_calendar(ics: &str) -> ProviderResult<Calendar> {
    ics.parse::<Calendar>()
        .map_err(|e| ProviderError::invalid_response(format!("invalid iCalendar data: {e}")))
}

fn is_master(event: &Event, uid: &str) -> bool {
    event.get_uid() == Some(uid) && event.property_value("RECURRENCE-ID").is_none()
}

fn to_canonical(event: &Event) -> Option<CanonicalEvent> {
    let Some(uid) = event.get_uid() else {
        warn!("Skipping VEVENT without UID");
        return None;
    };
    let start = to_event_time(event.get_start()?);
    let end = match event.get_end() {
        Some(end) => to_event_time(end),
        None => default_end(&start),
    };

    let mut canonical =
        CanonicalEvent::new(uid, event.get_summary().unwrap_or(UNTITLED), start, end);
    canonical.description = event
        .get_description()
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    canonical.location = event
        .get_location()
        .filter(|l| !l.is_empty())
        .map(str::to_string);

    debug!(uid = %canonical.id, start = %canonical.start, "Parsed VEVENT");
    Some(canonical)
}

/// RFC 5545: a DATE start without DTEND lasts one day, a DATE-TIME start
/// without DTEND is instantaneous.
fn default_end(start: &EventTime) -> EventTime {
    match start {
        EventTime::AllDay(date) => {
            EventTime::AllDay(date.checked_add_days(Days::new(1)).unwrap_or(*date))
        }
        EventTime::DateTime(dt) => EventTime::DateTime(*dt),
    }
}

fn to_event_time(value: DatePerhapsTime) -> EventTime {
    match value {
        DatePerhapsTime::Date(date) => EventTime::AllDay(date),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => EventTime::DateTime(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            EventTime::DateTime(Utc.from_utc_datetime(&naive))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let utc = resolve_tzid(&tzid)
                .and_then(|tz| tz.from_local_datetime(&date_time).earliest())
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or_else(|| {
                    warn!(tzid = %tzid, "Unknown TZID, treating time as UTC");
                    Utc.from_utc_datetime(&date_time)
                });
            EventTime::DateTime(utc)
        }
    }
}

/// Resolves an IANA TZID, tolerating vendor prefixes such as
/// `/mozilla.org/20050126_1/Europe/Berlin`.
pub(crate) fn resolve_tzid(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim().trim_matches('"');
    if let Ok(tz) = tzid.parse::<Tz>() {
        return Some(tz);
    }
    let parts: Vec<&str> = tzid.rsplit('/').take(2).collect();
    if parts.len() == 2 {
        return format!("{}/{}", parts[1], parts[0]).parse::<Tz>().ok();
    }
    None
}

fn set_times(event: &mut Event, start: &EventTime, end: &EventTime) {
    match start {
        EventTime::AllDay(date) => event.starts(*date),
        EventTime::DateTime(dt) => event.starts(*dt),
    };
    match end {
        EventTime::AllDay(date) => event.ends(*date),
        EventTime::DateTime(dt) => event.ends(*dt),
    };
}

fn stamp(event: &mut Event) {
    let now = ical_timestamp(Utc::now());
    event.add_property("DTSTAMP", &now);
    event.add_property("LAST-MODIFIED", &now);
}

fn ical_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timed_ics() -> &'static str {
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Test//Test//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:test-event-1@example.com\r\n\
         DTSTART:20250205T100000Z\r\n\
         DTEND:20250205T110000Z\r\n\
         SUMMARY:Team Meeting\r\n\
         DESCRIPTION:Weekly sync\r\n\
         LOCATION:Conference Room A\r\n\
         SEQUENCE:2\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    }

    fn utc(h: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(2025, 2, 5, h, 0, 0).unwrap())
    }

    #[test]
    fn parse_basic_event() {
        let events = parse_events(timed_ics()).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.id, "test-event-1@example.com");
        assert_eq!(event.title, "Team Meeting");
        assert_eq!(event.start, utc(10));
        assert_eq!(event.end, utc(11));
        assert_eq!(event.description.as_deref(), Some("Weekly sync"));
        assert_eq!(event.location.as_deref(), Some("Conference Room A"));
    }

    #[test]
    fn parse_all_day_without_dtend() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:holiday@example.com\r\n\
                   DTSTART;VALUE=DATE:20250210\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR\r\n";
        let events = parse_events(ics).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_all_day());
        assert_eq!(events[0].title, UNTITLED);
        assert_eq!(
            events[0].end,
            EventTime::AllDay(NaiveDate::from_ymd_opt(2025, 2, 11).unwrap())
        );
    }

    #[test]
    fn parse_with_tzid() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:tz@example.com\r\n\
                   DTSTART;TZID=Europe/Berlin:20250205T100000\r\n\
                   DTEND;TZID=Europe/Berlin:20250205T110000\r\n\
                   SUMMARY:Berlin\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR\r\n";
        let events = parse_events(ics).unwrap();
        // CET is UTC+1 in February
        assert_eq!(events[0].start, utc(9));
        assert_eq!(events[0].end, utc(10));
    }

    #[test]
    fn resolve_prefixed_tzid() {
        assert_eq!(
            resolve_tzid("/mozilla.org/20050126_1/Europe/Berlin"),
            Some(chrono_tz::Europe::Berlin)
        );
        assert_eq!(resolve_tzid("America/New_York"), Some(chrono_tz::America::New_York));
        assert!(resolve_tzid("W. Europe Standard Time").is_none());
    }

    #[test]
    fn build_then_parse_preserves_fields() {
        let draft = EventDraft::new("Dentist", utc(14), utc(15))
            .with_description("Bring card")
            .with_location("Main St 1");
        let ics = build_calendar("new-uid", &draft);
        assert!(ics.contains("UID:new-uid"));

        let events = parse_events(&ics).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], CanonicalEvent::from_draft("new-uid", draft));
    }

    #[test]
    fn build_all_day_uses_value_date() {
        let day = |d| EventTime::AllDay(NaiveDate::from_ymd_opt(2025, 3, d).unwrap());
        let ics = build_calendar("allday", &EventDraft::new("Trip", day(1), day(3)));
        assert!(ics.contains("DTSTART;VALUE=DATE:20250301"));
        let events = parse_events(&ics).unwrap();
        assert_eq!(events[0].start, day(1));
        assert_eq!(events[0].end, day(3));
    }

    #[test]
    fn rewrite_master_changes_only_patched_fields() {
        let mut updated = find_master(timed_ics(), "test-event-1@example.com")
            .unwrap()
            .unwrap();
        updated.title = "Renamed".into();

        let ics = rewrite_master(timed_ics(), &updated).unwrap();
        assert!(ics.contains("SEQUENCE:3"));

        let events = parse_events(&ics).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Renamed");
        assert_eq!(events[0].start, utc(10));
        assert_eq!(events[0].description.as_deref(), Some("Weekly sync"));
        assert_eq!(events[0].location.as_deref(), Some("Conference Room A"));
    }

    #[test]
    fn rewrite_unknown_uid_is_not_found() {
        let ghost = CanonicalEvent::new("ghost", "x", utc(1), utc(2));
        let err = rewrite_master(timed_ics(), &ghost).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn find_master_ignores_overrides() {
        let ics = "BEGIN:VCALENDAR\r\n\
                   VERSION:2.0\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:series\r\n\
                   RECURRENCE-ID:20250212T100000Z\r\n\
                   DTSTART:20250212T120000Z\r\n\
                   DTEND:20250212T130000Z\r\n\
                   SUMMARY:Moved instance\r\n\
                   END:VEVENT\r\n\
                   BEGIN:VEVENT\r\n\
                   UID:series\r\n\
                   DTSTART:20250205T100000Z\r\n\
                   DTEND:20250205T110000Z\r\n\
                   RRULE:FREQ=WEEKLY\r\n\
                   SUMMARY:Weekly\r\n\
                   END:VEVENT\r\n\
                   END:VCALENDAR\r\n";
        let master = find_master(ics, "series").unwrap().unwrap();
        assert_eq!(master.title, "Weekly");
        assert_eq!(parse_events(ics).unwrap().len(), 2);
    }
}

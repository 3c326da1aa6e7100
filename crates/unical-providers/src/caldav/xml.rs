//! WebDAV/CalDAV request bodies and multistatus parsing.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::ProviderResult;
use crate::xml::{XmlBody, local_name, xml_error};

/// DAV namespace
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";
/// CalendarServer namespace (for Apple servers)
pub const CS_NS: &str = "http://calendarserver.org/ns/";

/// One `<d:response>` of a PROPFIND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavCollection {
    pub href: String,
    pub display_name: Option<String>,
    pub is_calendar: bool,
}

/// One calendar object resource returned by a REPORT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

/// PROPFIND body asking for display name and resource type.
pub fn propfind_body() -> ProviderResult<String> {
    let mut xml = XmlBody::new()?;
    xml.open(
        "d:propfind",
        &[("xmlns:d", DAV_NS), ("xmlns:c", CALDAV_NS), ("xmlns:cs", CS_NS)],
    )?;
    xml.open("d:prop", &[])?;
    xml.empty("d:displayname", &[])?;
    xml.empty("d:resourcetype", &[])?;
    xml.empty("cs:getctag", &[])?;
    xml.close("d:prop")?;
    xml.close("d:propfind")?;
    xml.finish()
}

/// calendar-query for VEVENTs overlapping `[start, end)`.
///
/// Recurring events are expanded server-side into individual instances.
pub fn time_range_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderResult<String> {
    let start = ical_utc(start);
    let end = ical_utc(end);
    let range = [("start", start.as_str()), ("end", end.as_str())];

    let mut xml = XmlBody::new()?;
    xml.open(
        "c:calendar-query",
        &[("xmlns:d", DAV_NS), ("xmlns:c", CALDAV_NS)],
    )?;
    xml.open("d:prop", &[])?;
    xml.empty("d:getetag", &[])?;
    xml.open("c:calendar-data", &[])?;
    xml.empty("c:expand", &range)?;
    xml.close("c:calendar-data")?;
    xml.close("d:prop")?;
    xml.open("c:filter", &[])?;
    xml.open("c:comp-filter", &[("name", "VCALENDAR")])?;
    xml.open("c:comp-filter", &[("name", "VEVENT")])?;
    xml.empty("c:time-range", &range)?;
    xml.close("c:comp-filter")?;
    xml.close("c:comp-filter")?;
    xml.close("c:filter")?;
    xml.close("c:calendar-query")?;
    xml.finish()
}

/// calendar-query matching a single VEVENT by UID.
pub fn uid_query_body(uid: &str) -> ProviderResult<String> {
    let mut xml = XmlBody::new()?;
    xml.open(
        "c:calendar-query",
        &[("xmlns:d", DAV_NS), ("xmlns:c", CALDAV_NS)],
    )?;
    xml.open("d:prop", &[])?;
    xml.empty("d:getetag", &[])?;
    xml.empty("c:calendar-data", &[])?;
    xml.close("d:prop")?;
    xml.open("c:filter", &[])?;
    xml.open("c:comp-filter", &[("name", "VCALENDAR")])?;
    xml.open("c:comp-filter", &[("name", "VEVENT")])?;
    xml.open("c:prop-filter", &[("name", "UID")])?;
    xml.open("c:text-match", &[("collation", "i;octet")])?;
    xml.text_content(uid)?;
    xml.close("c:text-match")?;
    xml.close("c:prop-filter")?;
    xml.close("c:comp-filter")?;
    xml.close("c:comp-filter")?;
    xml.close("c:filter")?;
    xml.close("c:calendar-query")?;
    xml.finish()
}

/// Parses a PROPFIND multistatus into its responses.
pub fn parse_propfind_response(xml: &str) -> ProviderResult<Vec<DavCollection>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut collections = Vec::new();
    let mut current: Option<DavCollection> = None;
    let mut field: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "response" => {
                        current = Some(DavCollection {
                            href: String::new(),
                            display_name: None,
                            is_calendar: false,
                        });
                    }
                    "href" | "displayname" => field = Some(local),
                    "calendar" => mark_calendar(&mut current),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == "calendar" {
                    mark_calendar(&mut current);
                }
            }
            Event::Text(e) => {
                if let (Some(name), Some(entry)) = (field.as_deref(), current.as_mut()) {
                    let text = e.unescape().map_err(xml_error)?.into_owned();
                    match name {
                        "href" if entry.href.is_empty() => entry.href = text,
                        "displayname" => entry.display_name = Some(text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                if local_name(e.name().as_ref()) == "response" {
                    if let Some(entry) = current.take().filter(|c| !c.href.is_empty()) {
                        collections.push(entry);
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(collections)
}

/// Parses a REPORT multistatus into calendar object resources.
///
/// Responses without `calendar-data` (e.g. 404 propstats) are skipped.
pub fn parse_report_response(xml: &str) -> ProviderResult<Vec<CalendarResource>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut resources = Vec::new();
    let mut href: Option<String> = None;
    let mut etag: Option<String> = None;
    let mut data = String::new();
    let mut field: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "response" => {
                        href = None;
                        etag = None;
                        data.clear();
                    }
                    "href" | "getetag" | "calendar-data" => field = Some(local),
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?;
                collect_report_text(field.as_deref(), &text, &mut href, &mut etag, &mut data);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                collect_report_text(field.as_deref(), &text, &mut href, &mut etag, &mut data);
            }
            Event::End(e) => {
                if local_name(e.name().as_ref()) == "response" {
                    let href = href.take();
                    if let Some(href) = href.filter(|_| !data.trim().is_empty()) {
                        resources.push(CalendarResource {
                            href,
                            etag: etag.take(),
                            data: std::mem::take(&mut data),
                        });
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(resources)
}

fn mark_calendar(current: &mut Option<DavCollection>) {
    if let Some(entry) = current.as_mut() {
        entry.is_calendar = true;
    }
}

fn collect_report_text(
    field: Option<&str>,
    text: &str,
    href: &mut Option<String>,
    etag: &mut Option<String>,
    data: &mut String,
) {
    match field {
        Some("href") if href.is_none() => *href = Some(text.to_string()),
        Some("getetag") => *etag = Some(text.trim().to_string()),
        Some("calendar-data") => data.push_str(text),
        _ => {}
    }
}

/// Formats a datetime for iCalendar time-range filters (UTC format).
fn ical_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

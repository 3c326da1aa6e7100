//! EWS response parsing and conversion to canonical events.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use unical_core::{CanonicalEvent, EventTime};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::UNTITLED;
use crate::xml::{local_name, xml_error};

/// A calendar item as returned by `GetItem`, `FindItem` or `CreateItem`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarItem {
    pub id: String,
    pub change_key: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub is_all_day: bool,
    pub location: Option<String>,
}

/// One `*ResponseMessage` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMessage {
    pub class: String,
    pub code: String,
    pub text: Option<String>,
    pub items: Vec<CalendarItem>,
}

impl ResponseMessage {
    /// Turns an `Error` response class into a provider error.
    ///
    /// `Warning` responses carry usable data and are accepted.
    pub fn check(self) -> ProviderResult<Self> {
        if self.class != "Error" {
            return Ok(self);
        }
        let detail = self.text.clone().unwrap_or_else(|| self.code.clone());
        let message = format!("{}: {detail}", self.code);
        Err(match self.code.as_str() {
            "ErrorItemNotFound" | "ErrorInvalidIdMalformed" | "ErrorInvalidIdEmpty"
            | "ErrorInvalidIdNotAnItemAttachmentId" => {
                ProviderError::not_found(format!("Event not found ({})", self.code))
            }
            "ErrorAccessDenied" | "ErrorDelegateNoUser" | "ErrorNonExistentMailbox" => {
                ProviderError::authorization(message)
            }
            "ErrorServerBusy" => ProviderError::rate_limited(message),
            "ErrorCalendarEndDateIsEarlierThanStartDate"
            | "ErrorCalendarDurationIsTooLong"
            | "ErrorInvalidPropertySet"
            | "ErrorInvalidRequest" => ProviderError::bad_request(message),
            "ErrorIrresolvableConflict" | "ErrorChangeKeyRequiredForWriteOperations" => {
                ProviderError::conflict(message)
            }
            _ => ProviderError::server(message),
        })
    }
}

/// Parses a SOAP response body into its response messages.
///
/// A SOAP fault is returned as a server error.
pub fn parse_response(xml: &str) -> ProviderResult<Vec<ResponseMessage>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut messages = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut message: Option<ResponseMessage> = None;
    let mut item: Option<CalendarItem> = None;
    let mut fault: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref());
                open_element(&e, &local, &mut message, &mut item)?;
                stack.push(local);
            }
            Event::Empty(e) => {
                let local = local_name(e.name().as_ref());
                open_element(&e, &local, &mut message, &mut item)?;
                if local == "ItemId" {
                    read_item_id(&e, &stack, item.as_mut())?;
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?;
                collect_text(&stack, &text, message.as_mut(), item.as_mut(), &mut fault);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                collect_text(&stack, &text, message.as_mut(), item.as_mut(), &mut fault);
            }
            Event::End(e) => {
                let local = local_name(e.name().as_ref());
                stack.pop();
                if local == "CalendarItem" {
                    if let (Some(done), Some(message)) = (item.take(), message.as_mut()) {
                        if !done.id.is_empty() {
                            message.items.push(done);
                        }
                    }
                } else if local.ends_with("ResponseMessage") {
                    if let Some(done) = message.take() {
                        messages.push(done);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(fault) = fault {
        return Err(ProviderError::server(format!("SOAP fault: {fault}")));
    }
    Ok(messages)
}

fn open_element(
    e: &BytesStart<'_>,
    local: &str,
    message: &mut Option<ResponseMessage>,
    item: &mut Option<CalendarItem>,
) -> ProviderResult<()> {
    if local.ends_with("ResponseMessage") {
        *message = Some(ResponseMessage {
            class: attribute(e, "ResponseClass")?.unwrap_or_default(),
            ..ResponseMessage::default()
        });
    } else if local == "CalendarItem" {
        *item = Some(CalendarItem::default());
    }
    Ok(())
}

/// Only the item's own id counts, not ids nested in attachments.
fn read_item_id(
    e: &BytesStart<'_>,
    stack: &[String],
    item: Option<&mut CalendarItem>,
) -> ProviderResult<()> {
    let Some(item) = item else {
        return Ok(());
    };
    if stack.last().map(String::as_str) != Some("CalendarItem") {
        return Ok(());
    }
    item.id = attribute(e, "Id")?.unwrap_or_default();
    item.change_key = attribute(e, "ChangeKey")?;
    Ok(())
}

fn attribute(e: &BytesStart<'_>, name: &str) -> ProviderResult<Option<String>> {
    let Some(attr) = e.try_get_attribute(name).map_err(xml_error)? else {
        return Ok(None);
    };
    let value = attr.unescape_value().map_err(xml_error)?;
    Ok(Some(value.into_owned()))
}

fn collect_text(
    stack: &[String],
    text: &str,
    message: Option<&mut ResponseMessage>,
    item: Option<&mut CalendarItem>,
    fault: &mut Option<String>,
) {
    let Some(current) = stack.last().map(String::as_str) else {
        return;
    };
    if current == "faultstring" {
        fault.get_or_insert_with(String::new).push_str(text);
        return;
    }

    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());
    match (parent, item, message) {
        (Some("CalendarItem"), Some(item), _) => {
            let slot = match current {
                "Subject" => &mut item.subject,
                "Body" => &mut item.body,
                "Start" => &mut item.start,
                "End" => &mut item.end,
                "Location" => &mut item.location,
                "IsAllDayEvent" => {
                    item.is_all_day = text.trim() == "true";
                    return;
                }
                _ => return,
            };
            slot.get_or_insert_with(String::new).push_str(text);
        }
        (Some(p), _, Some(message)) if p.ends_with("ResponseMessage") => match current {
            "ResponseCode" => message.code.push_str(text),
            "MessageText" => message.text.get_or_insert_with(String::new).push_str(text),
            _ => {}
        },
        _ => {}
    }
}

/// Returns the single message of a one-item request, checked for errors.
pub fn single(messages: Vec<ResponseMessage>) -> ProviderResult<ResponseMessage> {
    messages
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid_response("EWS response contained no message"))?
        .check()
}

impl CalendarItem {
    /// Converts to the canonical model.
    ///
    /// All-day items are stored as midnight in the mailbox zone; `tz`
    /// recovers their calendar dates. The end date is exclusive.
    pub fn to_canonical(&self, tz: Tz) -> ProviderResult<CanonicalEvent> {
        let start = parse_time(self.start.as_deref(), "Start")?;
        let end = match self.end.as_deref() {
            Some(value) => parse_time(Some(value), "End")?,
            None => start,
        };

        let (start, end) = if self.is_all_day {
            let first = start.with_timezone(&tz).date_naive();
            let mut last = end.with_timezone(&tz).date_naive();
            if last <= first {
                last = first.checked_add_days(Days::new(1)).unwrap_or(first);
            }
            (EventTime::from_date(first), EventTime::from_date(last))
        } else {
            (EventTime::from_utc(start), EventTime::from_utc(end))
        };

        let title = self
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNTITLED);
        let mut event = CanonicalEvent::new(self.id.clone(), title, start, end);
        event.description = non_empty(self.body.as_deref());
        event.location = non_empty(self.location.as_deref());
        Ok(event)
    }
}

fn parse_time(value: Option<&str>, field: &str) -> ProviderResult<DateTime<Utc>> {
    let value = value
        .ok_or_else(|| ProviderError::invalid_response(format!("calendar item has no {field}")))?;
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            ProviderError::invalid_response(format!("invalid {field} '{value}': {e}")).with_source(e)
        })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Midnight of `date` in `tz`, as the UTC instant EWS expects for all-day items.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Converts a canonical time to the UTC instant sent to EWS.
pub fn to_ews_time(time: &EventTime, tz: Tz) -> DateTime<Utc> {
    match time {
        EventTime::AllDay(date) => local_midnight(*date, tz),
        EventTime::DateTime(dt) => *dt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;

    const GET_ITEM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <m:GetItemResponse xmlns:m="http://schemas.microsoft.com/exchange/services/2006/messages"
                       xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types">
      <m:ResponseMessages>
        <m:GetItemResponseMessage ResponseClass="Success">
          <m:ResponseCode>NoError</m:ResponseCode>
          <m:Items>
            <t:CalendarItem>
              <t:ItemId Id="AAMkAD=" ChangeKey="DwAAAB"/>
              <t:Subject>Budget &amp; Planning</t:Subject>
              <t:Body BodyType="Text">Quarterly review</t:Body>
              <t:Start>2024-01-01T09:00:00Z</t:Start>
              <t:End>2024-01-01T10:00:00Z</t:End>
              <t:IsAllDayEvent>false</t:IsAllDayEvent>
              <t:Location>Room 4</t:Location>
              <t:Organizer><t:Mailbox><t:Name>Boss</t:Name></t:Mailbox></t:Organizer>
            </t:CalendarItem>
          </m:Items>
        </m:GetItemResponseMessage>
        <m:GetItemResponseMessage ResponseClass="Error">
          <m:MessageText>The specified object was not found in the store.</m:MessageText>
          <m:ResponseCode>ErrorItemNotFound</m:ResponseCode>
          <m:Items/>
        </m:GetItemResponseMessage>
      </m:ResponseMessages>
    </m:GetItemResponse>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn parses_items_and_errors() {
        let messages = parse_response(GET_ITEM).unwrap();
        assert_eq!(messages.len(), 2);

        let first = &messages[0];
        assert_eq!(first.class, "Success");
        assert_eq!(first.items.len(), 1);
        let item = &first.items[0];
        assert_eq!(item.id, "AAMkAD=");
        assert_eq!(item.change_key.as_deref(), Some("DwAAAB"));
        assert_eq!(item.subject.as_deref(), Some("Budget & Planning"));
        assert_eq!(item.location.as_deref(), Some("Room 4"));

        let err = messages[1].clone().check().unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NotFound);
    }

    #[test]
    fn soap_fault_is_server_error() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
            <s:Fault><faultcode>a:ErrorSchemaValidation</faultcode>
            <faultstring>The request failed schema validation.</faultstring></s:Fault>
            </s:Body></s:Envelope>"#;
        let err = parse_response(xml).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ServerError);
        assert!(err.message().contains("schema validation"));
    }

    #[test]
    fn timed_item_to_canonical() {
        let messages = parse_response(GET_ITEM).unwrap();
        let event = messages[0].items[0].to_canonical(Tz::UTC).unwrap();
        assert_eq!(event.title, "Budget & Planning");
        assert_eq!(event.description.as_deref(), Some("Quarterly review"));
        assert_eq!(
            event.start,
            EventTime::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
        );
        assert!(!event.is_all_day());
    }

    #[test]
    fn all_day_item_uses_mailbox_zone() {
        // Midnight in Berlin is 23:00 UTC the day before.
        let item = CalendarItem {
            id: "x".into(),
            start: Some("2024-03-09T23:00:00Z".into()),
            end: Some("2024-03-10T23:00:00Z".into()),
            is_all_day: true,
            ..CalendarItem::default()
        };
        let event = item.to_canonical(chrono_tz::Europe::Berlin).unwrap();
        let date = |d| EventTime::from_date(NaiveDate::from_ymd_opt(2024, 3, d).unwrap());
        assert_eq!(event.start, date(10));
        assert_eq!(event.end, date(11));
        assert_eq!(event.title, UNTITLED);
    }

    #[test]
    fn local_midnight_round_trips_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let utc = local_midnight(date, chrono_tz::Europe::Berlin);
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 6, 30, 22, 0, 0).unwrap());
        assert_eq!(local_midnight(date, Tz::UTC).date_naive(), date);
    }

    #[test]
    fn missing_message_is_invalid_response() {
        let err = single(Vec::new()).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::InvalidResponse);
    }
}

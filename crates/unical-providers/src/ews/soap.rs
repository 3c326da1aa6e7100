//! SOAP request bodies for the EWS calendar operations.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ProviderResult;
use crate::xml::XmlBody;

pub const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const TYPES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
pub const MESSAGES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/messages";

const SERVER_VERSION: &str = "Exchange2013_SP1";

/// Upper bound for item ids in one `GetItem` call.
pub const GET_ITEM_BATCH: usize = 100;

/// Calendar item fields written by `CreateItem`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFields {
    pub subject: String,
    pub body: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
}

/// One `SetItemField` of an `UpdateItem`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Subject(String),
    Body(String),
    Start(DateTime<Utc>),
    End(DateTime<Utc>),
    AllDay(bool),
    Location(String),
}

impl FieldUpdate {
    fn field_uri(&self) -> &'static str {
        match self {
            Self::Subject(_) => "item:Subject",
            Self::Body(_) => "item:Body",
            Self::Start(_) => "calendar:Start",
            Self::End(_) => "calendar:End",
            Self::AllDay(_) => "calendar:IsAllDayEvent",
            Self::Location(_) => "calendar:Location",
        }
    }

    fn write_value(&self, xml: &mut XmlBody) -> ProviderResult<()> {
        match self {
            Self::Subject(subject) => xml.text("t:Subject", subject),
            Self::Body(body) => write_body(xml, body),
            Self::Start(start) => xml.text("t:Start", &ews_time(*start)),
            Self::End(end) => xml.text("t:End", &ews_time(*end)),
            Self::AllDay(all_day) => xml.text("t:IsAllDayEvent", bool_str(*all_day)),
            Self::Location(location) => xml.text("t:Location", location),
        }
    }
}

/// Builds envelopes, addressing a delegate mailbox when one is configured.
#[derive(Debug, Clone, Default)]
pub struct SoapBuilder {
    mailbox: Option<String>,
}

impl SoapBuilder {
    pub fn new(mailbox: Option<String>) -> Self {
        Self { mailbox }
    }

    /// `GetFolder` on the calendar, used to verify the connection.
    pub fn get_folder(&self) -> ProviderResult<String> {
        self.envelope(|xml| {
            xml.open("m:GetFolder", &[])?;
            xml.open("m:FolderShape", &[])?;
            xml.text("t:BaseShape", "IdOnly")?;
            xml.close("m:FolderShape")?;
            xml.open("m:FolderIds", &[])?;
            self.calendar_folder(xml)?;
            xml.close("m:FolderIds")?;
            xml.close("m:GetFolder")
        })
    }

    /// `FindItem` over a calendar view. The server expands recurrences.
    pub fn find_items(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderResult<String> {
        let start = ews_time(start);
        let end = ews_time(end);
        self.envelope(|xml| {
            xml.open("m:FindItem", &[("Traversal", "Shallow")])?;
            xml.open("m:ItemShape", &[])?;
            xml.text("t:BaseShape", "IdOnly")?;
            xml.close("m:ItemShape")?;
            xml.empty(
                "m:CalendarView",
                &[("StartDate", start.as_str()), ("EndDate", end.as_str())],
            )?;
            xml.open("m:ParentFolderIds", &[])?;
            self.calendar_folder(xml)?;
            xml.close("m:ParentFolderIds")?;
            xml.close("m:FindItem")
        })
    }

    /// `GetItem` with all properties and a plain-text body.
    pub fn get_items(&self, ids: &[&str]) -> ProviderResult<String> {
        self.envelope(|xml| {
            xml.open("m:GetItem", &[])?;
            xml.open("m:ItemShape", &[])?;
            xml.text("t:BaseShape", "AllProperties")?;
            xml.text("t:BodyType", "Text")?;
            xml.close("m:ItemShape")?;
            xml.open("m:ItemIds", &[])?;
            for id in ids {
                xml.empty("t:ItemId", &[("Id", *id)])?;
            }
            xml.close("m:ItemIds")?;
            xml.close("m:GetItem")
        })
    }

    /// `CreateItem` in the calendar folder without sending invitations.
    pub fn create_item(&self, fields: &ItemFields) -> ProviderResult<String> {
        self.envelope(|xml| {
            xml.open("m:CreateItem", &[("SendMeetingInvitations", "SendToNone")])?;
            xml.open("m:SavedItemFolderId", &[])?;
            self.calendar_folder(xml)?;
            xml.close("m:SavedItemFolderId")?;
            xml.open("m:Items", &[])?;
            xml.open("t:CalendarItem", &[])?;
            // Element order follows the EWS schema.
            xml.text("t:Subject", &fields.subject)?;
            if let Some(body) = &fields.body {
                write_body(xml, body)?;
            }
            xml.text("t:Start", &ews_time(fields.start))?;
            xml.text("t:End", &ews_time(fields.end))?;
            xml.text("t:IsAllDayEvent", bool_str(fields.all_day))?;
            if let Some(location) = &fields.location {
                xml.text("t:Location", location)?;
            }
            xml.close("t:CalendarItem")?;
            xml.close("m:Items")?;
            xml.close("m:CreateItem")
        })
    }

    /// `UpdateItem` with one `SetItemField` per update.
    pub fn update_item(
        &self,
        id: &str,
        change_key: Option<&str>,
        updates: &[FieldUpdate],
    ) -> ProviderResult<String> {
        self.envelope(|xml| {
            xml.open(
                "m:UpdateItem",
                &[
                    ("ConflictResolution", "AlwaysOverwrite"),
                    ("SendMeetingInvitationsOrCancellations", "SendToNone"),
                ],
            )?;
            xml.open("m:ItemChanges", &[])?;
            xml.open("t:ItemChange", &[])?;
            match change_key {
                Some(key) => xml.empty("t:ItemId", &[("Id", id), ("ChangeKey", key)])?,
                None => xml.empty("t:ItemId", &[("Id", id)])?,
            }
            xml.open("t:Updates", &[])?;
            for update in updates {
                xml.open("t:SetItemField", &[])?;
                xml.empty("t:FieldURI", &[("FieldURI", update.field_uri())])?;
                xml.open("t:CalendarItem", &[])?;
                update.write_value(xml)?;
                xml.close("t:CalendarItem")?;
                xml.close("t:SetItemField")?;
            }
            xml.close("t:Updates")?;
            xml.close("t:ItemChange")?;
            xml.close("m:ItemChanges")?;
            xml.close("m:UpdateItem")
        })
    }

    /// `DeleteItem` into Deleted Items without sending cancellations.
    pub fn delete_item(&self, id: &str) -> ProviderResult<String> {
        self.envelope(|xml| {
            xml.open(
                "m:DeleteItem",
                &[
                    ("DeleteType", "MoveToDeletedItems"),
                    ("SendMeetingCancellations", "SendToNone"),
                ],
            )?;
            xml.open("m:ItemIds", &[])?;
            xml.empty("t:ItemId", &[("Id", id)])?;
            xml.close("m:ItemIds")?;
            xml.close("m:DeleteItem")
        })
    }

    fn envelope<F>(&self, body: F) -> ProviderResult<String>
    where
        F: FnOnce(&mut XmlBody) -> ProviderResult<()>,
    {
        let mut xml = XmlBody::new()?;
        xml.open(
            "soap:Envelope",
            &[
                ("xmlns:soap", SOAP_NS),
                ("xmlns:t", TYPES_NS),
                ("xmlns:m", MESSAGES_NS),
            ],
        )?;
        xml.open("soap:Header", &[])?;
        xml.empty("t:RequestServerVersion", &[("Version", SERVER_VERSION)])?;
        xml.close("soap:Header")?;
        xml.open("soap:Body", &[])?;
        body(&mut xml)?;
        xml.close("soap:Body")?;
        xml.close("soap:Envelope")?;
        xml.finish()
    }

    fn calendar_folder(&self, xml: &mut XmlBody) -> ProviderResult<()> {
        match &self.mailbox {
            Some(email) => {
                xml.open("t:DistinguishedFolderId", &[("Id", "calendar")])?;
                xml.open("t:Mailbox", &[])?;
                xml.text("t:EmailAddress", email)?;
                xml.close("t:Mailbox")?;
                xml.close("t:DistinguishedFolderId")
            }
            None => xml.empty("t:DistinguishedFolderId", &[("Id", "calendar")]),
        }
    }
}

fn write_body(xml: &mut XmlBody, body: &str) -> ProviderResult<()> {
    xml.open("t:Body", &[("BodyType", "Text")])?;
    xml.text_content(body)?;
    xml.close("t:Body")
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// EWS `xs:dateTime` in UTC.
pub fn ews_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

//! The calendar tools exposed over MCP.
//!
//! Each tool validates its arguments, routes to the registry or fan-out and
//! renders a JSON document. Failures become tool results with `isError`
//! set, never JSON-RPC errors, so the caller sees the message.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};
use unical_core::{AccountEvent, CanonicalEvent, EventDraft, EventPatch, EventTime, TimeWindow, ValidationError};
use unical_protocol::mcp::{CallToolResult, Tool};

use crate::error::{CalendarError, CalendarResult};
use crate::fanout::{fan_out_list, list_account, merge};
use crate::registry::AccountRegistry;

/// The six calendar tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    ListCalendars,
    ListEvents,
    GetEvent,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        Self::ListCalendars,
        Self::ListEvents,
        Self::GetEvent,
        Self::CreateEvent,
        Self::UpdateEvent,
        Self::DeleteEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListCalendars => "list_calendars",
            Self::ListEvents => "list_events",
            Self::GetEvent => "get_event",
            Self::CreateEvent => "create_event",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a tool name that is not in [`ToolName::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

const TIME_HELP: &str = "ISO-8601 date-time with timezone (2024-01-15T09:00:00Z) or a date (2024-01-15) for all-day";

/// The tool catalogue returned by `tools/list`.
pub fn tool_definitions() -> Vec<Tool> {
    let calendar = json!({"type": "string", "description": "Calendar name from list_calendars"});
    let event_id = json!({"type": "string", "description": "Event id as returned by list_events"});
    let time = json!({"type": "string", "description": TIME_HELP});
    let text = |description: &str| json!({"type": "string", "description": description});

    let tool = |name: ToolName, description: &str, properties: Value, required: &[&str]| Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    };

    vec![
        tool(
            ToolName::ListCalendars,
            "List the configured calendars with their names, labels and backend types.",
            json!({}),
            &[],
        ),
        tool(
            ToolName::ListEvents,
            "List events between start and end. Without a calendar, every configured calendar is queried and the results are merged by start time. Defaults to today.",
            json!({
                "calendar": {"type": "string", "description": "Calendar name; omit to query all calendars"},
                "start": text("Range start. Defaults to today 00:00 UTC"),
                "end": text("Range end. Defaults to the end of the start day"),
            }),
            &[],
        ),
        tool(
            ToolName::GetEvent,
            "Get one event by id.",
            json!({"calendar": calendar, "event_id": event_id}),
            &["calendar", "event_id"],
        ),
        tool(
            ToolName::CreateEvent,
            "Create an event in one calendar.",
            json!({
                "calendar": calendar,
                "title": text("Event title"),
                "start": time,
                "end": time,
                "description": text("Optional description"),
                "location": text("Optional location"),
            }),
            &["calendar", "title", "start", "end"],
        ),
        tool(
            ToolName::UpdateEvent,
            "Update an event. Only the fields given are changed.",
            json!({
                "calendar": calendar,
                "event_id": event_id,
                "title": text("New title"),
                "start": time,
                "end": time,
                "description": text("New description"),
                "location": text("New location"),
            }),
            &["calendar", "event_id"],
        ),
        tool(
            ToolName::DeleteEvent,
            "Delete an event.",
            json!({"calendar": calendar, "event_id": event_id}),
            &["calendar", "event_id"],
        ),
    ]
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListEventsArgs {
    calendar: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventRefArgs {
    calendar: Option<String>,
    event_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventFieldsArgs {
    calendar: Option<String>,
    event_id: Option<String>,
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    description: Option<String>,
    location: Option<String>,
}

/// An event as rendered to the caller.
#[derive(Debug, Serialize)]
struct EventView<'a> {
    id: &'a str,
    calendar: &'a str,
    title: &'a str,
    start: String,
    end: String,
    description: Option<&'a str>,
    location: Option<&'a str>,
    all_day: bool,
}

impl<'a> EventView<'a> {
    fn new(calendar: &'a str, event: &'a CanonicalEvent) -> Self {
        Self {
            id: &event.id,
            calendar,
            title: &event.title,
            start: event.start.to_string(),
            end: event.end.to_string(),
            description: event.description.as_deref(),
            location: event.location.as_deref(),
            all_day: event.is_all_day(),
        }
    }
}

fn event_json(calendar: &str, event: &CanonicalEvent) -> Value {
    serde_json::to_value(EventView::new(calendar, event)).unwrap_or(Value::Null)
}

/// Treats blank strings as absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &'static str) -> CalendarResult<String> {
    present(value).ok_or(CalendarError::from(ValidationError::MissingField(field)))
}

fn parse_time(value: Option<String>) -> CalendarResult<Option<EventTime>> {
    Ok(present(value).map(|v| EventTime::parse(&v)).transpose()?)
}

fn parse_args<T: DeserializeOwned>(arguments: Map<String, Value>) -> CalendarResult<T> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| CalendarError::validation(format!("Invalid arguments: {e}")))
}

fn rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn error_payload(error: &CalendarError) -> Value {
    json!({"error": {"kind": error.kind(), "message": error.to_string()}})
}

/// Runs tool calls against an [`AccountRegistry`].
#[derive(Clone)]
pub struct CalendarTools {
    registry: Arc<AccountRegistry>,
}

impl CalendarTools {
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Runs one tool and renders its result.
    #[instrument(skip_all, fields(tool = %tool))]
    pub async fn call(&self, tool: ToolName, arguments: Map<String, Value>) -> CallToolResult {
        let started = Instant::now();
        let result = match tool {
            ToolName::ListCalendars => self.list_calendars(),
            ToolName::ListEvents => self.list_events(arguments).await,
            ToolName::GetEvent => self.get_event(arguments).await,
            ToolName::CreateEvent => self.create_event(arguments).await,
            ToolName::UpdateEvent => self.update_event(arguments).await,
            ToolName::DeleteEvent => self.delete_event(arguments).await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                info!(elapsed_ms, "Tool call succeeded");
                CallToolResult::json(&value)
            }
            Err(error) => {
                warn!(elapsed_ms, kind = error.kind(), error = %error, "Tool call failed");
                CallToolResult::error_json(&error_payload(&error))
            }
        }
    }

    fn list_calendars(&self) -> CalendarResult<Value> {
        if self.registry.is_empty() {
            return Err(CalendarError::validation("No calendars configured"));
        }
        let calendars: Vec<Value> = self
            .registry
            .list()
            .iter()
            .map(|a| json!({"name": a.name, "label": a.label(), "type": a.kind()}))
            .collect();
        Ok(json!({"calendars": calendars}))
    }

    async fn list_events(&self, arguments: Map<String, Value>) -> CalendarResult<Value> {
        let args: ListEventsArgs = parse_args(arguments)?;
        let calendar = present(args.calendar);
        if let Some(name) = &calendar {
            self.registry.account(name)?;
        }
        let start = parse_time(args.start)?;
        let end = parse_time(args.end)?;
        let window = TimeWindow::from_bounds(start.as_ref(), end.as_ref(), Utc::now())?;

        let (queried, events, failures) = match calendar {
            Some(name) => {
                let events = list_account(&self.registry, &name, &window).await?;
                let merged = merge([(name.clone(), Ok(events))]);
                (vec![name], merged.events, Vec::new())
            }
            None => {
                let names: Vec<String> = self.registry.names().map(str::to_string).collect();
                let merged = fan_out_list(&self.registry, &names, &window).await;
                (names, merged.events, merged.failures)
            }
        };

        let rendered: Vec<Value> = events
            .iter()
            .map(|AccountEvent { account, event }| event_json(account, event))
            .collect();
        let mut body = json!({
            "calendars_queried": queried,
            "start": rfc3339(&window.start),
            "end": rfc3339(&window.end),
            "count": rendered.len(),
            "events": rendered,
        });
        if !failures.is_empty() {
            body["errors"] = json!(failures);
        }
        Ok(body)
    }

    async fn get_event(&self, arguments: Map<String, Value>) -> CalendarResult<Value> {
        let args: EventRefArgs = parse_args(arguments)?;
        let calendar = required(args.calendar, "calendar")?;
        self.registry.account(&calendar)?;
        let event_id = required(args.event_id, "event_id")?;

        let adapter = self.registry.resolve(&calendar).await?;
        let event = adapter
            .get_event(&event_id)
            .await
            .map_err(|e| CalendarError::operation_failed(&calendar, Some(&event_id), e))?;
        Ok(json!({"event": event_json(&calendar, &event)}))
    }

    async fn create_event(&self, arguments: Map<String, Value>) -> CalendarResult<Value> {
        let args: EventFieldsArgs = parse_args(arguments)?;
        let calendar = required(args.calendar, "calendar")?;
        self.registry.account(&calendar)?;
        let title = required(args.title, "title")?;
        let start = parse_time(args.start)?.ok_or(ValidationError::MissingField("start"))?;
        let end = parse_time(args.end)?.ok_or(ValidationError::MissingField("end"))?;

        let mut draft = EventDraft::new(title, start, end);
        if let Some(description) = present(args.description) {
            draft = draft.with_description(description);
        }
        if let Some(location) = present(args.location) {
            draft = draft.with_location(location);
        }
        draft.validate()?;

        let adapter = self.registry.resolve(&calendar).await?;
        let event = adapter
            .create_event(draft)
            .await
            .map_err(|e| CalendarError::operation_failed(&calendar, None, e))?;
        info!(account = %calendar, event_id = %event.id, "Event created");
        Ok(json!({"success": true, "event": event_json(&calendar, &event)}))
    }

    async fn update_event(&self, arguments: Map<String, Value>) -> CalendarResult<Value> {
        let args: EventFieldsArgs = parse_args(arguments)?;
        let calendar = required(args.calendar, "calendar")?;
        self.registry.account(&calendar)?;
        let event_id = required(args.event_id, "event_id")?;

        let patch = EventPatch {
            title: present(args.title),
            start: parse_time(args.start)?,
            end: parse_time(args.end)?,
            description: present(args.description),
            location: present(args.location),
        };
        patch.validate()?;

        let adapter = self.registry.resolve(&calendar).await?;
        let event = adapter
            .update_event(&event_id, patch)
            .await
            .map_err(|e| CalendarError::operation_failed(&calendar, Some(&event_id), e))?;
        info!(account = %calendar, event_id = %event.id, "Event updated");
        Ok(json!({"success": true, "event": event_json(&calendar, &event)}))
    }

    async fn delete_event(&self, arguments: Map<String, Value>) -> CalendarResult<Value> {
        let args: EventRefArgs = parse_args(arguments)?;
        let calendar = required(args.calendar, "calendar")?;
        let label = self.registry.account(&calendar)?.label().to_string();
        let event_id = required(args.event_id, "event_id")?;

        let adapter = self.registry.resolve(&calendar).await?;
        adapter
            .delete_event(&event_id)
            .await
            .map_err(|e| CalendarError::operation_failed(&calendar, Some(&event_id), e))?;
        info!(account = %calendar, event_id = %event_id, "Event deleted");
        Ok(json!({"success": true, "message": format!("Event deleted from {label}")}))
    }
}

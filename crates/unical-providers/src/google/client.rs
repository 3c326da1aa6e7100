//! Google Calendar API client.
//!
//! Low-level HTTP access to the events collection of one calendar, plus the
//! mapping between API event resources and [`CanonicalEvent`].

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use unical_core::{CanonicalEvent, EventDraft, EventPatch, EventTime, TimeWindow};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{status_error, transport_error};
use crate::provider::UNTITLED;

use super::config::GoogleConfig;

/// Page size for events.list.
const PAGE_SIZE: u32 = 250;

/// Google Calendar API client.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleCalendarClient {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create HTTP client: {e}")).with_source(e)
            })?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Lists expanded event instances in the window, following pagination.
    pub async fn list_events(
        &self,
        access_token: &str,
        window: &TimeWindow,
    ) -> ProviderResult<Vec<ApiEvent>> {
        let url = self.config.events_url();
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("timeMin", window.start.to_rfc3339()),
                    ("timeMax", window.end.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                    ("maxResults", PAGE_SIZE.to_string()),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: EventListResponse = self.execute(request, "Calendar").await?;
            items.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar = %self.config.calendar_id, count = items.len(), "Fetched event pages");
        Ok(items)
    }

    /// Fetches the raw event resource.
    pub async fn get_event(&self, access_token: &str, event_id: &str) -> ProviderResult<Value> {
        let request = self
            .http_client
            .get(self.config.event_url(event_id))
            .bearer_auth(access_token);
        self.execute(request, "Event").await
    }

    pub async fn insert_event(&self, access_token: &str, body: &Value) -> ProviderResult<Value> {
        let request = self
            .http_client
            .post(self.config.events_url())
            .bearer_auth(access_token)
            .json(body);
        self.execute(request, "Calendar").await
    }

    /// Replaces the event resource with `body`.
    pub async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        body: &Value,
    ) -> ProviderResult<Value> {
        let request = self
            .http_client
            .put(self.config.event_url(event_id))
            .bearer_auth(access_token)
            .json(body);
        self.execute(request, "Event").await
    }

    pub async fn delete_event(&self, access_token: &str, event_id: &str) -> ProviderResult<()> {
        let response = self
            .http_client
            .delete(self.config.event_url(event_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, "Event").await.map(|_| ())
    }

    pub fn timezone(&self) -> Option<&str> {
        self.config.timezone.as_deref()
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> ProviderResult<T> {
        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response, what).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {e}")))?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse response: {e}")).with_source(e)
        })
    }
}

async fn check_status(response: Response, what: &str) -> ProviderResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::authentication(
            "access token expired or invalid",
        ));
    }
    Err(status_error(response, what).await)
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// The fields of an event resource that map to [`CanonicalEvent`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub id: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub start: ApiEventTime,
    #[serde(default)]
    pub end: ApiEventTime,
}

/// `start`/`end` of an event resource: `date` for all-day, `dateTime`
/// otherwise.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    pub date: Option<String>,
    pub date_time: Option<String>,
    pub time_zone: Option<String>,
}

impl ApiEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    pub fn from_resource(resource: &Value) -> ProviderResult<Self> {
        serde_json::from_value(resource.clone()).map_err(|e| {
            ProviderError::invalid_response(format!("malformed event resource: {e}")).with_source(e)
        })
    }

    /// Converts to the canonical model. Events without an id or a parseable
    /// start are dropped.
    pub fn to_canonical(&self) -> Option<CanonicalEvent> {
        let id = self.id.as_deref()?;
        let start = match self.start.to_event_time() {
            Some(start) => start,
            None => {
                warn!(id = %id, "Event has no usable start time");
                return None;
            }
        };
        let end = self.end.to_event_time().unwrap_or_else(|| start.clone());

        let mut event = CanonicalEvent::new(
            id,
            self.summary.as_deref().unwrap_or(UNTITLED),
            start,
            end,
        );
        event.description = self.description.clone().filter(|d| !d.is_empty());
        event.location = self.location.clone().filter(|l| !l.is_empty());
        Some(event)
    }
}

impl ApiEventTime {
    fn to_event_time(&self) -> Option<EventTime> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .map(EventTime::from_local)
                .map_err(|e| warn!(value = %dt, error = %e, "Unparseable dateTime"))
                .ok();
        }
        let date = self.date.as_deref()?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(EventTime::AllDay)
            .map_err(|e| warn!(value = %date, error = %e, "Unparseable date"))
            .ok()
    }
}

/// JSON for an event `start`/`end` field.
pub fn time_json(time: &EventTime, timezone: Option<&str>) -> Value {
    match time {
        EventTime::AllDay(date) => json!({ "date": date.format("%Y-%m-%d").to_string() }),
        EventTime::DateTime(dt) => {
            let mut value = json!({ "dateTime": rfc3339(dt) });
            if let Some(tz) = timezone {
                value["timeZone"] = json!(tz);
            }
            value
        }
    }
}

/// Request body for events.insert.
pub fn draft_body(draft: &EventDraft, timezone: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("summary".into(), json!(draft.title));
    body.insert("start".into(), time_json(&draft.start, timezone));
    body.insert("end".into(), time_json(&draft.end, timezone));
    if let Some(description) = &draft.description {
        body.insert("description".into(), json!(description));
    }
    if let Some(location) = &draft.location {
        body.insert("location".into(), json!(location));
    }
    Value::Object(body)
}

/// Writes the fields present in `patch` into a fetched event resource.
/// Everything else in the resource is left as it came from the server.
pub fn apply_patch(resource: &mut Value, patch: &EventPatch, timezone: Option<&str>) {
    let Some(object) = resource.as_object_mut() else {
        return;
    };
    if let Some(title) = &patch.title {
        object.insert("summary".into(), json!(title));
    }
    if let Some(start) = &patch.start {
        object.insert("start".into(), time_json(start, timezone));
    }
    if let Some(end) = &patch.end {
        object.insert("end".into(), time_json(end, timezone));
    }
    if let Some(description) = &patch.description {
        object.insert("description".into(), json!(description));
    }
    if let Some(location) = &patch.location {
        object.insert("location".into(), json!(location));
    }
}

fn rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

//! CalDAV calendar provider implementation.

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use unical_core::{CanonicalEvent, EventDraft, EventPatch, TimeWindow};
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BackendKind, BoxFuture, CalendarProvider, retain_in_window};

use super::client::{CalDavClient, PutMode};
use super::config::CalDavConfig;
use super::ics::{build_calendar, find_master, parse_events, rewrite_master};
use super::xml::{
    CalendarResource, DavCollection, parse_propfind_response, parse_report_response,
    propfind_body, time_range_query_body, uid_query_body,
};

/// CalDAV calendar provider bound to one calendar collection.
///
/// Event ids are iCalendar UIDs.
pub struct CalDavProvider {
    name: String,
    /// Absolute URL of the calendar collection, with a trailing slash.
    collection: String,
    client: Mutex<CalDavClient>,
}

impl CalDavProvider {
    /// Connects to the server and resolves the calendar collection.
    ///
    /// Issues a Depth 0 PROPFIND on the configured URL, and a Depth 1
    /// PROPFIND when a calendar is selected by display name.
    #[instrument(skip(name, config), fields(account = tracing::field::Empty, url = %config.url))]
    pub async fn connect(name: impl Into<String>, config: CalDavConfig) -> ProviderResult<Self> {
        let name = name.into();
        tracing::Span::current().record("account", name.as_str());
        let mut client = CalDavClient::new(config.clone())?;
        let body = propfind_body()?;

        let root = parse_propfind_response(&client.propfind(config.url_str(), &body, 0).await?)?;
        if root.is_empty() {
            return Err(ProviderError::invalid_response(
                "PROPFIND returned no resources for the configured URL",
            ));
        }

        let collection = match &config.calendar_name {
            None => {
                if !root.iter().any(|c| c.is_calendar) {
                    warn!(account = %name, "Configured URL is not advertised as a calendar collection");
                }
                config.url_str().to_string()
            }
            Some(wanted) => {
                let children =
                    parse_propfind_response(&client.propfind(config.url_str(), &body, 1).await?)?;
                let found = select_calendar(&children, wanted).ok_or_else(|| {
                    let available: Vec<&str> = children
                        .iter()
                        .filter(|c| c.is_calendar)
                        .filter_map(|c| c.display_name.as_deref())
                        .collect();
                    ProviderError::calendar(format!(
                        "Calendar '{wanted}' not found at {} (available: {})",
                        config.url,
                        available.join(", ")
                    ))
                })?;
                resolve_href(&config.url, &found.href)
            }
        };

        let collection = with_trailing_slash(collection);
        info!(account = %name, collection = %collection, "Connected to CalDAV calendar");

        Ok(Self {
            name,
            collection,
            client: Mutex::new(client),
        })
    }

    /// Returns the resolved calendar collection URL.
    pub fn collection_url(&self) -> &str {
        &self.collection
    }

    fn resource_url(&self, href: &str) -> ProviderResult<String> {
        let base = url::Url::parse(&self.collection).map_err(|e| {
            ProviderError::internal(format!("invalid collection URL: {e}")).with_source(e)
        })?;
        Ok(resolve_href(&base, href))
    }

    async fn find_resource(&self, uid: &str) -> ProviderResult<CalendarResource> {
        let body = uid_query_body(uid)?;
        let response = {
            let mut client = self.client.lock().await;
            client.report(&self.collection, &body).await?
        };
        parse_report_response(&response)?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::not_found(format!("Event not found: {uid}")))
    }

    async fn fetch_window(&self, window: &TimeWindow) -> ProviderResult<Vec<CanonicalEvent>> {
        debug!(
            collection = %self.collection,
            start = %window.start,
            end = %window.end,
            "Fetching events with REPORT"
        );

        let body = time_range_query_body(window.start, window.end)?;
        let response = {
            let mut client = self.client.lock().await;
            client.report(&self.collection, &body).await?
        };

        let mut events = Vec::new();
        for resource in parse_report_response(&response)? {
            match parse_events(&resource.data) {
                Ok(parsed) => events.extend(parsed),
                Err(e) => warn!(href = %resource.href, error = %e, "Skipping unparseable resource"),
            }
        }
        Ok(events)
    }

    async fn fetch_master(&self, uid: &str) -> ProviderResult<(CalendarResource, CanonicalEvent)> {
        let resource = self.find_resource(uid).await?;
        let event = match find_master(&resource.data, uid)? {
            Some(event) => event,
            // Only overridden instances stored: fall back to the first one.
            None => parse_events(&resource.data)?
                .into_iter()
                .find(|e| e.id == uid)
                .ok_or_else(|| ProviderError::not_found(format!("Event not found: {uid}")))?,
        };
        Ok((resource, event))
    }
}

impl CalendarProvider for CalDavProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::CalDav
    }

    fn list_events(
        &self,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
        Box::pin(async move {
            let events = self.fetch_window(&window).await?;
            let events = retain_in_window(events, &window);
            info!(account = %self.name, count = events.len(), "Fetched CalDAV events");
            Ok(events)
        })
    }

    fn get_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
        Box::pin(async move {
            let (_, event) = self.fetch_master(id).await?;
            Ok(event)
        })
    }

    fn create_event(&self, draft: EventDraft) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
        Box::pin(async move {
            draft.validate()?;
            let uid = Uuid::new_v4().to_string();
            let url = format!("{}{uid}.ics", self.collection);
            let ics = build_calendar(&uid, &draft);

            {
                let mut client = self.client.lock().await;
                client.put(&url, &ics, PutMode::Create).await?;
            }
            info!(account = %self.name, uid = %uid, "Created CalDAV event");
            Ok(CanonicalEvent::from_draft(uid, draft))
        })
    }

    fn update_event<'a>(
        &'a self,
        id: &'a str,
        patch: EventPatch,
    ) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
        Box::pin(async move {
            patch.validate()?;
            let (resource, current) = self.fetch_master(id).await?;
            let updated = patch.apply(&current)?;
            let ics = rewrite_master(&resource.data, &updated)?;
            let url = self.resource_url(&resource.href)?;

            {
                let mut client = self.client.lock().await;
                client
                    .put(
                        &url,
                        &ics,
                        PutMode::Replace {
                            etag: resource.etag.as_deref(),
                        },
                    )
                    .await?;
            }
            info!(account = %self.name, uid = %id, "Updated CalDAV event");
            Ok(updated)
        })
    }

    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let resource = self.find_resource(id).await?;
            let url = self.resource_url(&resource.href)?;
            {
                let mut client = self.client.lock().await;
                client.delete(&url, resource.etag.as_deref()).await?;
            }
            info!(account = %self.name, uid = %id, "Deleted CalDAV event");
            Ok(())
        })
    }
}

fn select_calendar<'a>(collections: &'a [DavCollection], wanted: &str) -> Option<&'a DavCollection> {
    collections.iter().filter(|c| c.is_calendar).find(|c| {
        c.display_name
            .as_deref()
            .is_some_and(|n| n.trim().eq_ignore_ascii_case(wanted.trim()))
    })
}

/// Resolves a relative href against a base URL.
fn resolve_href(base: &url::Url, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        base.join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

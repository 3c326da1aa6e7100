//! Exchange Web Services provider implementation.

use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use unical_core::{CanonicalEvent, EventDraft, EventPatch, TimeWindow};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BackendKind, BoxFuture, CalendarProvider, retain_in_window};

use super::client::EwsClient;
use super::config::EwsConfig;
use super::response::{CalendarItem, single, to_ews_time};
use super::soap::{FieldUpdate, GET_ITEM_BATCH, ItemFields, SoapBuilder};

/// EWS provider for the calendar folder of one mailbox.
pub struct EwsProvider {
    name: String,
    soap: SoapBuilder,
    timezone: Tz,
    client: Mutex<EwsClient>,
}

impl EwsProvider {
    /// Connects to the endpoint and checks the calendar folder is reachable.
    #[instrument(skip(name, config), fields(account = tracing::field::Empty, url = %config.url))]
    pub async fn connect(name: impl Into<String>, config: EwsConfig) -> ProviderResult<Self> {
        let name = name.into();
        tracing::Span::current().record("account", name.as_str());
        let mut client = EwsClient::new(&config)?;
        let soap = SoapBuilder::new(config.email.clone());

        let messages = client.call("GetFolder", &soap.get_folder()?).await?;
        single(messages)?;

        info!(account = %name, url = %client.url(), "EWS calendar connected");
        Ok(Self {
            name,
            soap,
            timezone: config.timezone,
            client: Mutex::new(client),
        })
    }

    async fn get_items(&self, ids: &[&str]) -> ProviderResult<Vec<CalendarItem>> {
        let mut items = Vec::with_capacity(ids.len());
        let mut client = self.client.lock().await;
        for batch in ids.chunks(GET_ITEM_BATCH) {
            let messages = client.call("GetItem", &self.soap.get_items(batch)?).await?;
            for message in messages {
                items.extend(message.check()?.items);
            }
        }
        Ok(items)
    }

    async fn fetch_item(&self, id: &str) -> ProviderResult<CalendarItem> {
        let mut client = self.client.lock().await;
        let messages = client.call("GetItem", &self.soap.get_items(&[id])?).await?;
        single(messages)?
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::not_found(format!("Event not found: {id}")))
    }
}

/// The `SetItemField` updates for `patch`, using the merged times so a change
/// between timed and all-day also flips `IsAllDayEvent`.
fn field_updates(patch: &EventPatch, merged: &CanonicalEvent, tz: Tz) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();
    if let Some(title) = &patch.title {
        updates.push(FieldUpdate::Subject(title.clone()));
    }
    if let Some(description) = &patch.description {
        updates.push(FieldUpdate::Body(description.clone()));
    }
    if patch.start.is_some() || patch.end.is_some() {
        updates.push(FieldUpdate::Start(to_ews_time(&merged.start, tz)));
        updates.push(FieldUpdate::End(to_ews_time(&merged.end, tz)));
        updates.push(FieldUpdate::AllDay(merged.is_all_day()));
    }
    if let Some(location) = &patch.location {
        updates.push(FieldUpdate::Location(location.clone()));
    }
    updates
}

impl CalendarProvider for EwsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Ews
    }

    fn list_events(
        &self,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
        Box::pin(async move {
            let found = {
                let mut client = self.client.lock().await;
                let body = self.soap.find_items(window.start, window.end)?;
                single(client.call("FindItem", &body).await?)?.items
            };
            debug!(account = %self.name, count = found.len(), "FindItem returned ids");
            if found.is_empty() {
                return Ok(Vec::new());
            }

            let ids: Vec<&str> = found.iter().map(|item| item.id.as_str()).collect();
            let events = self
                .get_items(&ids)
                .await?
                .iter()
                .map(|item| item.to_canonical(self.timezone))
                .collect::<ProviderResult<Vec<_>>>()?;
            let events = retain_in_window(events, &window);
            info!(account = %self.name, count = events.len(), "Fetched EWS events");
            Ok(events)
        })
    }

    fn get_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
        Box::pin(async move { self.fetch_item(id).await?.to_canonical(self.timezone) })
    }

    fn create_event(&self, draft: EventDraft) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
        Box::pin(async move {
            draft.validate()?;
            let fields = ItemFields {
                subject: draft.title.clone(),
                body: draft.description.clone(),
                start: to_ews_time(&draft.start, self.timezone),
                end: to_ews_time(&draft.end, self.timezone),
                all_day: draft.start.is_all_day(),
                location: draft.location.clone(),
            };

            let mut client = self.client.lock().await;
            let messages = client
                .call("CreateItem", &self.soap.create_item(&fields)?)
                .await?;
            let id = single(messages)?
                .items
                .into_iter()
                .next()
                .map(|item| item.id)
                .ok_or_else(|| ProviderError::invalid_response("CreateItem returned no item id"))?;

            info!(account = %self.name, "Created EWS event");
            Ok(CanonicalEvent::from_draft(id, draft))
        })
    }

    fn update_event<'a>(
        &'a self,
        id: &'a str,
        patch: EventPatch,
    ) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
        Box::pin(async move {
            patch.validate()?;
            let current = self.fetch_item(id).await?;
            let merged = patch.apply(&current.to_canonical(self.timezone)?)?;
            let updates = field_updates(&patch, &merged, self.timezone);

            let body = self
                .soap
                .update_item(&current.id, current.change_key.as_deref(), &updates)?;
            let mut client = self.client.lock().await;
            single(client.call("UpdateItem", &body).await?)?;

            info!(account = %self.name, fields = updates.len(), "Updated EWS event");
            Ok(merged)
        })
    }

    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let mut client = self.client.lock().await;
            single(client.call("DeleteItem", &self.soap.delete_item(id)?).await?)?;
            info!(account = %self.name, "Deleted EWS event");
            Ok(())
        })
    }
}

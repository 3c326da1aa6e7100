//! Google Calendar provider implementation.

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use unical_core::{CanonicalEvent, EventDraft, EventPatch, TimeWindow};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{BackendKind, BoxFuture, CalendarProvider, retain_in_window};

use super::client::{ApiEvent, GoogleCalendarClient, apply_patch, draft_body};
use super::config::{GoogleConfig, OAuthCredentials};
use super::oauth::OAuthClient;
use super::tokens::{TokenInfo, TokenStorage};

/// Google Calendar provider for one calendar of one Google account.
pub struct GoogleProvider {
    name: String,
    client: GoogleCalendarClient,
    oauth: OAuthClient,
    storage: TokenStorage,
    token: Mutex<TokenInfo>,
}

impl GoogleProvider {
    /// Loads the stored token, refreshing it when expired.
    ///
    /// Fails with an authentication-required error when there is no token or
    /// it cannot be refreshed; the message names the command that fixes it.
    #[instrument(skip(name, config), fields(account = tracing::field::Empty, calendar_id = %config.calendar_id))]
    pub async fn connect(name: impl Into<String>, config: GoogleConfig) -> ProviderResult<Self> {
        let name = name.into();
        tracing::Span::current().record("account", name.as_str());
        let storage = TokenStorage::new(&config.token_file);

        let Some(token) = storage.load()? else {
            if !config.credentials_file.exists() {
                return Err(ProviderError::configuration(format!(
                    "credentials file not found: {}",
                    config.credentials_file.display()
                )));
            }
            return Err(reauth_required(&name, "Google token not found"));
        };

        let credentials = resolve_credentials(&config, &token)?;
        let oauth = OAuthClient::new(credentials, config.token_url.clone(), config.timeout)?;
        let client = GoogleCalendarClient::new(config)?;

        let provider = Self {
            name,
            client,
            oauth,
            storage,
            token: Mutex::new(token),
        };
        provider.access_token().await?;
        info!(account = %provider.name, "Google Calendar connected");
        Ok(provider)
    }

    /// Runs the interactive OAuth flow for `config` and stores the token.
    pub async fn authorize(config: &GoogleConfig) -> ProviderResult<TokenInfo> {
        let credentials = OAuthCredentials::from_file(&config.credentials_file)?;
        let oauth = OAuthClient::new(credentials, config.token_url.clone(), config.timeout)?;
        let token = oauth.authorize(&config.scopes).await?;
        if token.refresh_token.is_none() {
            warn!("Google returned no refresh token; the token will need renewal when it expires");
        }
        TokenStorage::new(&config.token_file).save(&token)?;
        Ok(token)
    }

    /// Returns a valid access token, refreshing and persisting if needed.
    async fn access_token(&self) -> ProviderResult<String> {
        let mut token = self.token.lock().await;
        if !token.is_expired() {
            return Ok(token.token.clone());
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(reauth_required(
                &self.name,
                "Google token expired and has no refresh token",
            ));
        };

        debug!(account = %self.name, "Refreshing expired access token");
        let response = self.oauth.refresh(&refresh_token).await.map_err(|e| {
            if e.code() == ProviderErrorCode::AuthenticationRequired {
                reauth_required(&self.name, e.message())
            } else {
                e
            }
        })?;
        token.refreshed(
            response.access_token,
            response.expires_in,
            response.refresh_token,
        );
        if token.client_id.is_none() {
            *token = token
                .clone()
                .with_client(self.oauth.credentials(), self.oauth.token_url());
        }
        self.storage.save(&token)?;
        info!(account = %self.name, "Google token refreshed");
        Ok(token.token.clone())
    }

    async fn fetch_resource(&self, access_token: &str, id: &str) -> ProviderResult<serde_json::Value> {
        let resource = self.client.get_event(access_token, id).await?;
        if ApiEvent::from_resource(&resource)?.is_cancelled() {
            return Err(ProviderError::not_found(format!("Event not found: {id}")));
        }
        Ok(resource)
    }
}

/// Client secrets come from the credentials file, falling back to the ones
/// embedded in the token file.
fn resolve_credentials(config: &GoogleConfig, token: &TokenInfo) -> ProviderResult<OAuthCredentials> {
    if config.credentials_file.exists() {
        return OAuthCredentials::from_file(&config.credentials_file);
    }
    token.embedded_credentials().ok_or_else(|| {
        ProviderError::configuration(format!(
            "credentials file not found: {}",
            config.credentials_file.display()
        ))
    })
}

fn reauth_required(account: &str, reason: &str) -> ProviderError {
    ProviderError::authentication_required(format!(
        "Calendar '{account}': {reason}. Run: unical-mcp --auth google --calendar {account}"
    ))
}

fn to_event(resource: &serde_json::Value) -> ProviderResult<CanonicalEvent> {
    ApiEvent::from_resource(resource)?
        .to_canonical()
        .ok_or_else(|| ProviderError::invalid_response("event resource has no id or start time"))
}

impl CalendarProvider for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    fn list_events(
        &self,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
        Box::pin(async move {
            let access_token = self.access_token().await?;
            let items = self.client.list_events(&access_token, &window).await?;
            let events: Vec<_> = items
                .iter()
                .filter(|e| !e.is_cancelled())
                .filter_map(ApiEvent::to_canonical)
                .collect();
            let events = retain_in_window(events, &window);
            info!(account = %self.name, count = events.len(), "Fetched Google events");
            Ok(events)
        })
    }

    fn get_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
        Box::pin(async move {
            let access_token = self.access_token().await?;
            let resource = self.fetch_resource(&access_token, id).await?;
            to_event(&resource)
        })
    }

    fn create_event(&self, draft: EventDraft) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
        Box::pin(async move {
            draft.validate()?;
            let access_token = self.access_token().await?;
            let body = draft_body(&draft, self.client.timezone());
            let created = self.client.insert_event(&access_token, &body).await?;
            let id = created
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProviderError::invalid_response("created event has no id"))?
                .to_string();
            info!(account = %self.name, id = %id, "Created Google event");
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
            let access_token = self.access_token().await?;
            let mut resource = self.fetch_resource(&access_token, id).await?;
            patch.apply(&to_event(&resource)?)?;

            apply_patch(&mut resource, &patch, self.client.timezone());
            let stored = self.client.update_event(&access_token, id, &resource).await?;
            info!(account = %self.name, id = %id, "Updated Google event");
            to_event(&stored)
        })
    }

    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let access_token = self.access_token().await?;
            self.client.delete_event(&access_token, id).await?;
            info!(account = %self.name, id = %id, "Deleted Google event");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use unical_core::EventTime;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _dir: tempfile::TempDir,
        config: GoogleConfig,
    }

    fn fixture(server: &MockServer, token: Option<TokenInfo>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let credentials = dir.path().join("credentials.json");
        std::fs::write(
            &credentials,
            r#"{"installed": {"client_id": "cid", "client_secret": "cs"}}"#,
        )
        .unwrap();
        let token_file = dir.path().join("token.json");
        if let Some(token) = token {
            TokenStorage::new(&token_file).save(&token).unwrap();
        }
        let config = GoogleConfig::new(credentials)
            .with_token_file(token_file)
            .with_api_base_url(server.uri())
            .with_token_url(format!("{}/token", server.uri()));
        Fixture { _dir: dir, config }
    }

    fn valid_token() -> TokenInfo {
        TokenInfo::new("live-token", Some("refresh".into()), Some(3600), vec![])
    }

    fn at(h: u32) -> EventTime {
        EventTime::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn missing_token_requires_authentication() {
        let server = MockServer::start().await;
        let fx = fixture(&server, None);
        let err = GoogleProvider::connect("family", fx.config.clone())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationRequired);
        assert!(err.message().contains("--auth google --calendar family"));
    }

    #[tokio::test]
    async fn expired_token_without_refresh_requires_authentication() {
        let server = MockServer::start().await;
        let mut token = TokenInfo::new("old", None, None, vec![]);
        token.expiry = Some(Utc::now() - Duration::hours(1));
        let fx = fixture(&server, Some(token));

        let err = GoogleProvider::connect("family", fx.config.clone())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationRequired);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut token = TokenInfo::new("old", Some("refresh".into()), None, vec![]);
        token.expiry = Some(Utc::now() - Duration::hours(1));
        let fx = fixture(&server, Some(token));

        GoogleProvider::connect("family", fx.config.clone())
            .await
            .unwrap();
        let stored = TokenStorage::new(&fx.config.token_file)
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.token, "fresh-token");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(stored.client_id.as_deref(), Some("cid"));
    }

    #[tokio::test]
    async fn list_events_skips_cancelled_and_paginates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer live-token"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "b", "summary": "Second",
                    "start": {"dateTime": "2024-01-01T12:00:00Z"},
                    "end": {"dateTime": "2024-01-01T13:00:00Z"}
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "a", "summary": "First",
                        "start": {"dateTime": "2024-01-01T09:00:00Z"},
                        "end": {"dateTime": "2024-01-01T10:00:00Z"}
                    },
                    {"id": "gone", "status": "cancelled"}
                ],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let fx = fixture(&server, Some(valid_token()));
        let provider = GoogleProvider::connect("family", fx.config.clone())
            .await
            .unwrap();
        let window = TimeWindow::for_utc_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let events = provider.list_events(window).await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn get_missing_event_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events/cancelled"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cancelled", "status": "cancelled"
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let fx = fixture(&server, Some(valid_token()));
        let provider = GoogleProvider::connect("family", fx.config.clone())
            .await
            .unwrap();
        assert!(provider.get_event("nope").await.unwrap_err().is_not_found());
        assert!(provider.get_event("cancelled").await.unwrap_err().is_not_found());
        assert!(provider.delete_event("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn create_returns_server_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/events"))
            .and(body_partial_json(json!({
                "summary": "Dentist",
                "start": {"dateTime": "2024-01-01T09:00:00Z"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "srv-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, Some(valid_token()));
        let provider = GoogleProvider::connect("family", fx.config.clone())
            .await
            .unwrap();
        let created = provider
            .create_event(EventDraft::new("Dentist", at(9), at(10)).with_description("Checkup"))
            .await
            .unwrap();
        assert_eq!(created.id, "srv-1");
        assert_eq!(created.description.as_deref(), Some("Checkup"));
    }

    #[tokio::test]
    async fn update_sends_full_resource_with_changes() {
        let server = MockServer::start().await;
        let original = json!({
            "id": "e1",
            "summary": "Old",
            "location": "Room 1",
            "attendees": [{"email": "x@example.com"}],
            "start": {"dateTime": "2024-01-01T09:00:00Z"},
            "end": {"dateTime": "2024-01-01T10:00:00Z"}
        });
        let mut stored = original.clone();
        stored["summary"] = json!("New");

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events/e1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(original))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/calendars/primary/events/e1"))
            .and(body_partial_json(json!({
                "summary": "New",
                "attendees": [{"email": "x@example.com"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, Some(valid_token()));
        let provider = GoogleProvider::connect("family", fx.config.clone())
            .await
            .unwrap();
        let patch = EventPatch {
            title: Some("New".into()),
            ..EventPatch::default()
        };
        let updated = provider.update_event("e1", patch).await.unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.start, at(9));
        assert_eq!(updated.location.as_deref(), Some("Room 1"));
    }
}

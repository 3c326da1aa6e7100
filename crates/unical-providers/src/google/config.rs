//! Google Calendar provider configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};

/// OAuth 2.0 client credentials for Google API access.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Structure of Google's OAuth client secrets JSON file.
///
/// Supports the Cloud Console layout (`installed` or `web` section) and a
/// flat layout with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads OAuth credentials from a client secrets JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read credentials file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parses OAuth credentials from a client secrets JSON string.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse credentials JSON: {e}"))
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(ProviderError::configuration(
            "credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret' at root level",
        ))
    }
}

/// Configuration for one Google Calendar account.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Calendar to operate on. Defaults to `primary`.
    pub calendar_id: String,

    /// OAuth client secrets file downloaded from Google Cloud Console.
    pub credentials_file: PathBuf,

    /// Where the authorized-user token is stored.
    pub token_file: PathBuf,

    /// IANA time zone sent with timed events on create/update.
    pub timezone: Option<String>,

    /// Calendar API base URL.
    pub api_base_url: String,

    /// OAuth token endpoint.
    pub token_url: String,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Read/write calendar scope.
    pub const CALENDAR_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar";

    pub const DEFAULT_CALENDAR_ID: &'static str = "primary";
    pub const DEFAULT_TOKEN_FILE: &'static str = "/data/google_calendar_token.json";
    pub const API_BASE_URL: &'static str = "https://www.googleapis.com/calendar/v3";
    pub const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Creates a configuration using the given client secrets file.
    pub fn new(credentials_file: impl Into<PathBuf>) -> Self {
        Self {
            calendar_id: Self::DEFAULT_CALENDAR_ID.to_string(),
            credentials_file: credentials_file.into(),
            token_file: PathBuf::from(Self::DEFAULT_TOKEN_FILE),
            timezone: None,
            api_base_url: Self::API_BASE_URL.to_string(),
            token_url: Self::TOKEN_URL.to_string(),
            scopes: vec![Self::CALENDAR_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("unical/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_calendar_id(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = calendar_id.into();
        self
    }

    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = path.into();
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Points the client at a different API host (used by tests).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of the events collection of the configured calendar.
    pub fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base_url,
            urlencoding::encode(&self.calendar_id)
        )
    }

    /// URL of a single event.
    pub fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = GoogleConfig::new("/config/google_credentials.json");
        assert_eq!(config.calendar_id, "primary");
        assert_eq!(
            config.token_file,
            PathBuf::from("/data/google_calendar_token.json")
        );
        assert_eq!(config.scopes, vec![GoogleConfig::CALENDAR_SCOPE.to_string()]);
        assert!(config.timezone.is_none());
    }

    #[test]
    fn event_urls_are_encoded() {
        let config = GoogleConfig::new("c.json")
            .with_calendar_id("family@group.calendar.google.com")
            .with_api_base_url("http://127.0.0.1:9000/");
        assert_eq!(
            config.events_url(),
            "http://127.0.0.1:9000/calendars/family%40group.calendar.google.com/events"
        );
        assert!(config.event_url("a b").ends_with("/events/a%20b"));
    }

    #[test]
    fn credentials_from_json_installed() {
        let json = r#"{
            "installed": {
                "client_id": "test-id.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "project_id": "my-project"
            }
        }"#;

        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
    }

    #[test]
    fn credentials_from_json_web() {
        let json = r#"{"web": {"client_id": "web-id", "client_secret": "web-secret"}}"#;
        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-id");
    }

    #[test]
    fn credentials_from_json_flat() {
        let json = r#"{
            "client_id": "flat-id.apps.googleusercontent.com",
            "client_secret": "flat-secret",
            "refresh_token": "some-refresh-token"
        }"#;

        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_secret, "flat-secret");
    }

    #[test]
    fn credentials_errors() {
        assert!(
            OAuthCredentials::from_json(r#"{ "other": {} }"#)
                .unwrap_err()
                .message()
                .contains("client_id")
        );
        assert!(
            OAuthCredentials::from_json("not json")
                .unwrap_err()
                .message()
                .contains("parse")
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let shown = format!("{:?}", OAuthCredentials::new("id", "hunter2"));
        assert!(!shown.contains("hunter2"));
    }
}

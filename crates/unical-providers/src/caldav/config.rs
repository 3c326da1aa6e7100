//! CalDAV provider configuration.

use std::time::Duration;
use url::Url;

use crate::http::SessionOptions;
use crate::http_auth::Credentials;

/// Configuration for the CalDAV provider.
#[derive(Debug, Clone)]
pub struct CalDavConfig {
    /// Base URL of the CalDAV server (principal or calendar collection).
    pub url: Url,

    /// Credentials resolved from the environment.
    pub credentials: Option<Credentials>,

    /// Display name of the calendar collection to use below `url`.
    ///
    /// When unset, `url` itself is treated as the calendar collection.
    pub calendar_name: Option<String>,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl CalDavConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a new CalDAV configuration with the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url.as_ref())?;
        Ok(Self {
            url: parsed,
            credentials: None,
            calendar_name: None,
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("unical/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Sets the credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Selects a child calendar collection by display name.
    pub fn with_calendar_name(mut self, name: impl Into<String>) -> Self {
        self.calendar_name = Some(name.into());
        self
    }

    /// Disables TLS verification (for testing only).
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the base URL as a string.
    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    /// Returns true if credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub(crate) fn session_options(&self) -> SessionOptions {
        SessionOptions {
            verify_tls: self.verify_tls,
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_creation() {
        let config = CalDavConfig::new("https://caldav.example.com/calendars/user/").unwrap();
        assert_eq!(
            config.url.as_str(),
            "https://caldav.example.com/calendars/user/"
        );
        assert!(!config.has_credentials());
        assert!(config.verify_tls);
    }

    #[test]
    fn config_with_credentials() {
        let config = CalDavConfig::new("https://caldav.example.com/")
            .unwrap()
            .with_credentials("user", "pass");

        assert!(config.has_credentials());
        let credentials = config.credentials.as_ref().unwrap();
        assert_eq!(credentials.username, "user");
        assert_eq!(credentials.password, "pass");
        assert!(!format!("{config:?}").contains("pass\""));
    }

    #[test]
    fn config_builder_methods() {
        let config = CalDavConfig::new("https://caldav.example.com/")
            .unwrap()
            .with_calendar_name("Family")
            .with_insecure_tls()
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.calendar_name.as_deref(), Some("Family"));
        assert!(!config.verify_tls);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_url_returns_error() {
        let result = CalDavConfig::new("not a valid url");
        assert!(result.is_err());
    }
}

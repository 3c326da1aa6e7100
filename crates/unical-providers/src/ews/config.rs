//! EWS provider configuration.

use std::time::Duration;

use chrono_tz::Tz;
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::http::SessionOptions;
use crate::http_auth::Credentials;

/// Configuration for one Exchange mailbox calendar.
#[derive(Debug, Clone)]
pub struct EwsConfig {
    /// Direct EWS endpoint, e.g. `https://mail.example.com/EWS/Exchange.asmx`.
    pub url: Url,

    pub credentials: Option<Credentials>,

    /// SMTP address of the mailbox to open. When unset the authenticated
    /// user's own calendar is used.
    pub email: Option<String>,

    /// Zone used to recover the calendar date of all-day items.
    pub timezone: Tz,

    pub verify_tls: bool,
    pub timeout: Duration,
    pub user_agent: String,
}

impl EwsConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration for the given endpoint URL.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(url.as_ref())?,
            credentials: None,
            email: None,
            timezone: Tz::UTC,
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("unical/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Addresses another mailbox through delegate access.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the mailbox timezone from an IANA name.
    pub fn with_timezone(mut self, name: &str) -> ProviderResult<Self> {
        self.timezone = name
            .parse::<Tz>()
            .map_err(|_| ProviderError::configuration(format!("unknown timezone '{name}'")))?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn session_options(&self) -> SessionOptions {
        SessionOptions {
            verify_tls: self.verify_tls,
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

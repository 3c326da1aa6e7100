//! Errors raised by the calendar adapters.
//!
//! Adapters classify every failure with a [`ProviderErrorCode`]; the server
//! maps codes onto the tool error kinds it reports to clients.

use std::fmt;
use thiserror::Error;

/// Classification of an adapter failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// The backend rejected the credentials (401).
    AuthenticationFailed,
    /// No stored token; the interactive login has to run first.
    AuthenticationRequired,
    /// Credentials accepted but access denied (403, EWS access errors).
    AuthorizationFailed,
    /// Connection, TLS, DNS or timeout failure.
    NetworkError,
    /// 429 or an EWS throttling response.
    RateLimited,
    /// 5xx or an EWS internal server error.
    ServerError,
    /// A response body that could not be parsed.
    InvalidResponse,
    /// The event or collection does not exist.
    NotFound,
    /// The backend refused the request content.
    BadRequest,
    /// Adapter settings are missing or unusable.
    ConfigurationError,
    /// The selected calendar could not be resolved.
    CalendarError,
    /// 412 on a conditional write.
    Conflict,
    /// A bug or unexpected local state.
    InternalError,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthenticationRequired => "authentication_required",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::CalendarError => "calendar_error",
            Self::Conflict => "conflict",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified adapter failure, optionally tagged with the account it came
/// from and the lower-level cause.
#[derive(Debug, Error)]
#[error("{}{code}: {message}", .provider.as_deref().map(|p| format!("[{p}] ")).unwrap_or_default())]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

macro_rules! constructors {
    ($($name:ident => $code:ident),* $(,)?) => {
        $(
            pub fn $name(message: impl Into<String>) -> Self {
                Self::new(ProviderErrorCode::$code, message)
            }
        )*
    };
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    constructors! {
        authentication => AuthenticationFailed,
        authentication_required => AuthenticationRequired,
        authorization => AuthorizationFailed,
        network => NetworkError,
        rate_limited => RateLimited,
        server => ServerError,
        invalid_response => InvalidResponse,
        not_found => NotFound,
        bad_request => BadRequest,
        configuration => ConfigurationError,
        calendar => CalendarError,
        conflict => Conflict,
        internal => InternalError,
    }

    /// Tags the error with the account name.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// True when the event (or the collection holding it) does not exist.
    pub fn is_not_found(&self) -> bool {
        self.code == ProviderErrorCode::NotFound
    }

    /// Copies code, message and provider. The source chain is dropped.
    pub fn duplicate(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            provider: self.provider.clone(),
            source: None,
        }
    }
}

impl From<unical_core::ValidationError> for ProviderError {
    fn from(error: unical_core::ValidationError) -> Self {
        ProviderError::bad_request(error.to_string()).with_source(error)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

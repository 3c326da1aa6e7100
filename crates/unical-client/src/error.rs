//! Client error types.

use std::fmt;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that end the `unical-mcp` process.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Provider error.
    Provider(unical_providers::ProviderError),
    /// Server error.
    Server(unical_server::ServerError),
    /// IO error.
    Io(std::io::Error),
    /// Logging could not be set up.
    Tracing(unical_core::TracingError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Provider(err) => write!(f, "{}", err),
            Self::Server(err) => write!(f, "server error: {}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Tracing(err) => write!(f, "logging setup failed: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provider(err) => Some(err),
            Self::Server(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Tracing(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<unical_providers::ProviderError> for ClientError {
    fn from(err: unical_providers::ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<unical_server::ServerError> for ClientError {
    fn from(err: unical_server::ServerError) -> Self {
        Self::Server(err)
    }
}

impl From<unical_server::ConfigError> for ClientError {
    fn from(err: unical_server::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<unical_core::TracingError> for ClientError {
    fn from(err: unical_core::TracingError) -> Self {
        Self::Tracing(err)
    }
}

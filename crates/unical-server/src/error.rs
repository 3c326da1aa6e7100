//! Server error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use unical_core::ValidationError;
use unical_providers::{BackendKind, ProviderError, ProviderErrorCode};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error on stdin/stdout.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] unical_protocol::ProtocolError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading the accounts file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML in config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// One entry of the `calendars` list is invalid.
    #[error("calendar entry #{index}: {message}")]
    Entry { index: usize, message: String },
}

impl ConfigError {
    pub fn entry(index: usize, message: impl Into<String>) -> Self {
        Self::Entry {
            index,
            message: message.into(),
        }
    }
}

/// Result type for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

/// A failed calendar operation, reported to the caller as a tool error.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Unknown calendar '{name}'. Available: {available}")]
    UnknownAccount { name: String, available: String },

    #[error("Calendar '{account}' ({kind}) is unavailable: {message}")]
    BackendConnection {
        account: String,
        kind: BackendKind,
        message: String,
    },

    #[error("{message}")]
    AuthenticationRequired { account: String, message: String },

    #[error("Event not found in calendar '{account}': {id}")]
    EventNotFound { account: String, id: String },

    #[error("{message}")]
    Validation { message: String },

    /// A backend failure after the adapter was connected.
    #[error("Calendar '{account}': {source}")]
    Backend {
        account: String,
        #[source]
        source: ProviderError,
    },
}

impl CalendarError {
    pub fn unknown_account<'a>(
        name: impl Into<String>,
        available: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::UnknownAccount {
            name: name.into(),
            available: available.into_iter().collect::<Vec<_>>().join(", "),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Maps an adapter construction failure.
    ///
    /// A missing Google token keeps its own kind so the caller learns which
    /// command fixes it.
    pub fn connect_failed(account: &str, kind: BackendKind, error: ProviderError) -> Self {
        if error.code() == ProviderErrorCode::AuthenticationRequired {
            return Self::AuthenticationRequired {
                account: account.to_string(),
                message: error.message().to_string(),
            };
        }
        Self::BackendConnection {
            account: account.to_string(),
            kind,
            message: error.to_string(),
        }
    }

    /// Maps a failure of an operation on a connected adapter.
    ///
    /// Not-found only means a missing event when an event was addressed; on
    /// a listing it is the collection itself that is gone.
    pub fn operation_failed(account: &str, event_id: Option<&str>, error: ProviderError) -> Self {
        match (error.code(), event_id) {
            (ProviderErrorCode::NotFound, Some(id)) => Self::EventNotFound {
                account: account.to_string(),
                id: id.to_string(),
            },
            (ProviderErrorCode::BadRequest, _) => Self::validation(error.message()),
            (ProviderErrorCode::AuthenticationRequired, _) => Self::AuthenticationRequired {
                account: account.to_string(),
                message: error.message().to_string(),
            },
            _ => Self::Backend {
                account: account.to_string(),
                source: error,
            },
        }
    }

    /// The wire name of this error's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAccount { .. } => "unknown_account",
            Self::BackendConnection { .. } => "backend_connection",
            Self::AuthenticationRequired { .. } => "authentication_required",
            Self::EventNotFound { .. } => "event_not_found",
            Self::Validation { .. } => "validation",
            Self::Backend { .. } => "backend",
        }
    }
}

impl From<ValidationError> for CalendarError {
    fn from(error: ValidationError) -> Self {
        Self::validation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_lists_names() {
        let err = CalendarError::unknown_account("x", ["work", "family"]);
        assert_eq!(err.to_string(), "Unknown calendar 'x'. Available: work, family");
        assert_eq!(err.kind(), "unknown_account");
    }

    #[test]
    fn connect_failure_kinds() {
        let err = CalendarError::connect_failed(
            "family",
            BackendKind::Google,
            ProviderError::authentication_required("run the auth command"),
        );
        assert_eq!(err.kind(), "authentication_required");
        assert_eq!(err.to_string(), "run the auth command");

        let err = CalendarError::connect_failed(
            "work",
            BackendKind::Ews,
            ProviderError::network("connection refused"),
        );
        assert_eq!(err.kind(), "backend_connection");
        assert!(err.to_string().contains("'work' (ews)"));
    }

    #[test]
    fn operation_failure_kinds() {
        let err =
            CalendarError::operation_failed("work", Some("abc"), ProviderError::not_found("gone"));
        assert_eq!(err.kind(), "event_not_found");
        assert!(err.to_string().ends_with("abc"));

        let err = CalendarError::operation_failed(
            "work",
            None,
            ProviderError::from(ValidationError::EmptyTitle),
        );
        assert_eq!(err.kind(), "validation");

        let err = CalendarError::operation_failed("work", None, ProviderError::server("boom"));
        assert_eq!(err.kind(), "backend");
    }

    #[test]
    fn missing_collection_on_listing_is_a_backend_error() {
        let err = CalendarError::operation_failed(
            "family",
            None,
            ProviderError::not_found("calendar collection returned 404"),
        );
        assert_eq!(err.kind(), "backend");
        assert!(err.to_string().contains("calendar collection returned 404"));
    }
}

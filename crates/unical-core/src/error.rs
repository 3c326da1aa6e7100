//! Validation errors raised before any backend is contacted.

use thiserror::Error;

/// A request was rejected because its parameters are malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("start ({start}) is after end ({end})")]
    StartAfterEnd { start: String, end: String },

    #[error("start and end must both be all-day dates or both be date-times")]
    MixedTimeKinds,

    #[error("invalid timestamp '{value}': expected ISO-8601 date-time with timezone or YYYY-MM-DD")]
    InvalidTimestamp { value: String },

    #[error("timestamp '{value}' has no timezone offset")]
    MissingTimezone { value: String },

    #[error("time range is empty: start must be before end")]
    EmptyWindow,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("No fields to update")]
    EmptyPatch,
}

impl ValidationError {
    pub(crate) fn start_after_end(start: impl ToString, end: impl ToString) -> Self {
        Self::StartAfterEnd {
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

/// Result alias for validation checks.
pub type ValidationResult<T> = Result<T, ValidationError>;

//! CalendarProvider trait definition.
//!
//! [`CalendarProvider`] is the capability set every backend adapter
//! implements: list, get, create, update and delete events in one account.
//! Adapters translate between their backend's wire format and
//! [`CanonicalEvent`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unical_core::{CanonicalEvent, EventDraft, EventPatch, TimeWindow};

use crate::error::{ProviderError, ProviderResult};

/// Title used when a backend event has no summary.
pub const UNTITLED: &str = "(No title)";

/// The backend an account is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ews,
    Google,
    #[serde(rename = "caldav")]
    CalDav,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ews => "ews",
            Self::Google => "google",
            Self::CalDav => "caldav",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ews" => Ok(Self::Ews),
            "google" => Ok(Self::Google),
            "caldav" => Ok(Self::CalDav),
            other => Err(ProviderError::configuration(format!(
                "unknown calendar type '{other}' (expected ews, google or caldav)"
            ))),
        }
    }
}

/// A boxed future for async trait methods.
///
/// Boxing keeps the trait object-safe so the registry can hold
/// `Arc<dyn CalendarProvider>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core abstraction for calendar backends.
///
/// # Implementation Notes
///
/// - `list_events` must only return events overlapping the window;
///   ordering is not significant
/// - `get_event`, `update_event` and `delete_event` fail with a
///   [`ProviderErrorCode::NotFound`](crate::ProviderErrorCode::NotFound)
///   error when the id is unknown
/// - `update_event` leaves fields absent from the patch unchanged
///
/// ```ignore
/// impl CalendarProvider for MyProvider {
///     fn name(&self) -> &str { &self.account }
///     fn kind(&self) -> BackendKind { BackendKind::CalDav }
///
///     fn list_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
///         Box::pin(async move {
///             let events = self.client.fetch(&window).await?;
///             Ok(retain_in_window(events, &window))
///         })
///     }
///     // ...
/// }
/// ```
pub trait CalendarProvider: Send + Sync {
    /// The account name this adapter serves.
    fn name(&self) -> &str;

    /// The backend type.
    fn kind(&self) -> BackendKind;

    /// Lists events overlapping `[window.start, window.end)`.
    fn list_events(&self, window: TimeWindow)
    -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>>;

    /// Fetches one event by its backend id.
    fn get_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<CanonicalEvent>>;

    /// Creates an event and returns it with the backend-assigned id.
    fn create_event(&self, draft: EventDraft) -> BoxFuture<'_, ProviderResult<CanonicalEvent>>;

    /// Applies `patch` to an existing event and returns the stored result.
    fn update_event<'a>(
        &'a self,
        id: &'a str,
        patch: EventPatch,
    ) -> BoxFuture<'a, ProviderResult<CanonicalEvent>>;

    /// Deletes an event. Deleting an unknown id is an error.
    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Drops events that do not overlap the window.
pub fn retain_in_window(mut events: Vec<CanonicalEvent>, window: &TimeWindow) -> Vec<CanonicalEvent> {
    events.retain(|e| window.overlaps_event(&e.start, &e.end));
    events
}

/// A provider that always returns an error.
///
/// Stands in for an account whose adapter could not be built, and is handy
/// in tests exercising failure paths.
#[derive(Debug)]
pub struct ErrorProvider {
    name: String,
    kind: BackendKind,
    error: ProviderError,
}

impl ErrorProvider {
    /// Creates a new error provider.
    pub fn new(name: impl Into<String>, kind: BackendKind, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            kind,
            error,
        }
    }

    fn fail<T: Send + 'static>(&self) -> BoxFuture<'_, ProviderResult<T>> {
        let error = self.error.duplicate().with_provider(&self.name);
        Box::pin(async move { Err(error) })
    }
}

impl CalendarProvider for ErrorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn list_events(
        &self,
        _window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<CanonicalEvent>>> {
        self.fail()
    }

    fn get_event<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
        self.fail()
    }

    fn create_event(&self, _draft: EventDraft) -> BoxFuture<'_, ProviderResult<CanonicalEvent>> {
        self.fail()
    }

    fn update_event<'a>(
        &'a self,
        _id: &'a str,
        _patch: EventPatch,
    ) -> BoxFuture<'a, ProviderResult<CanonicalEvent>> {
        self.fail()
    }

    fn delete_event<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        self.fail()
    }
}

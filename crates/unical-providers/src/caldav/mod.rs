//! CalDAV calendar provider implementation.
//!
//! [`CalDavProvider`] serves one calendar collection on a CalDAV server
//! (Nextcloud, Radicale, iCloud, ...).
//!
//! # Features
//!
//! - HTTP Basic authentication with Digest fallback
//! - PROPFIND for collection lookup by display name
//! - REPORT calendar-query with server-side recurrence expansion
//! - PUT/DELETE guarded by ETags
//! - iCalendar parsing and generation via the `icalendar` crate
//!
//! # Example
//!
//! ```ignore
//! use unical_providers::caldav::{CalDavConfig, CalDavProvider};
//!
//! let config = CalDavConfig::new("https://cloud.example.com/remote.php/dav/calendars/me/")?
//!     .with_credentials("me", password)
//!     .with_calendar_name("Family");
//!
//! let provider = CalDavProvider::connect("family", config).await?;
//! let events = provider.list_events(TimeWindow::today(Utc::now())).await?;
//! ```

mod client;
mod config;
mod ics;
mod provider;
mod xml;

pub use config::CalDavConfig;
pub use provider::CalDavProvider;

//! CalendarProvider trait and backend adapters.
//!
//! This crate provides the abstraction layer for calendar backends:
//!
//! - [`CalendarProvider`] - The capability set every backend implements
//! - [`ProviderError`] - Error types for provider operations
//! - [`ews`], [`google`], [`caldav`] - One adapter per backend, each behind a
//!   cargo feature of the same name
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Exchange EWS │   │  Google API  │   │ CalDAV server│
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │ SOAP             │ REST             │ WebDAV
//!        ▼                  ▼                  ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ EwsProvider  │   │GoogleProvider│   │CalDavProvider│
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        └──────────────────┼──────────────────┘
//!                           │ CalendarProvider
//!                           ▼
//!                   ┌────────────────┐
//!                   │ CanonicalEvent │
//!                   └────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use unical_providers::{CalendarProvider, caldav::{CalDavConfig, CalDavProvider}};
//!
//! let provider = CalDavProvider::connect("family", config).await?;
//! let events = provider.list_events(window).await?;
//! ```

#[cfg(feature = "caldav")]
pub mod caldav;
pub mod error;
#[cfg(feature = "ews")]
pub mod ews;
#[cfg(feature = "google")]
pub mod google;
mod http;
pub mod http_auth;
pub mod provider;
mod xml;

// Re-export main types at crate root
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use http_auth::Credentials;
pub use provider::{BackendKind, BoxFuture, CalendarProvider, ErrorProvider, UNTITLED, retain_in_window};

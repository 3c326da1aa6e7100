//! Google Calendar provider implementation.
//!
//! [`GoogleProvider`] talks to the Calendar API v3 with a stored OAuth token.
//!
//! # Authentication Flow
//!
//! Tokens are obtained once, interactively, with [`GoogleProvider::authorize`]
//! (PKCE with a loopback redirect) and written to the configured token file.
//! At runtime the provider only loads that file and refreshes the access
//! token when it expires. Without a usable token every operation fails with
//! an authentication-required error.
//!
//! # Example
//!
//! ```ignore
//! use unical_providers::google::{GoogleConfig, GoogleProvider};
//!
//! let config = GoogleConfig::new("/config/google_credentials.json")
//!     .with_calendar_id("family@group.calendar.google.com");
//!
//! let provider = GoogleProvider::connect("family", config).await?;
//! let events = provider.list_events(TimeWindow::today(Utc::now())).await?;
//! ```

mod client;
mod config;
mod oauth;
mod provider;
mod tokens;

pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::{OAuthClient, PkceFlow};
pub use provider::GoogleProvider;
pub use tokens::{TokenInfo, TokenStorage};

//! Exchange Web Services provider.
//!
//! Talks SOAP 1.1 to a direct EWS endpoint (no autodiscovery) using Basic
//! authentication, falling back to Digest when the server asks for it.
//! Recurring meetings are expanded by the server's calendar view.

mod client;
mod config;
mod provider;
mod response;
mod soap;

pub use config::EwsConfig;
pub use provider::EwsProvider;

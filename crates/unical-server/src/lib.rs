//! MCP server: account registry, concurrent fan-out and the calendar tools.
//!
//! This crate provides the server side of unical:
//! - YAML account configuration
//! - Lazily connected, cached backend adapters per account
//! - Concurrent listing across accounts with per-account failure reporting
//! - The six calendar tools served over MCP on stdio
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unical_server::{AccountRegistry, CalendarConfig, CalendarTools, McpHandler, StdioServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CalendarConfig::load("/config/calendar_accounts.yaml".as_ref())?;
//!     let tools = CalendarTools::new(Arc::new(AccountRegistry::new(config)));
//!     let server = StdioServer::new(McpHandler::new(tools));
//!     server.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod fanout;
mod handler;
mod registry;
mod signals;
mod stdio;
mod tools;

pub use config::{
    Account, BackendSettings, CONFIG_ENV, CalDavSettings, CalendarConfig, DEFAULT_CONFIG_PATH,
    DEFAULT_TOKEN_FILE, EwsSettings, GoogleSettings,
};
pub use error::{CalendarError, CalendarResult, ConfigError, ServerError, ServerResult};
pub use fanout::{AccountFailure, MergedEventList, fan_out_list, merge};
pub use handler::{McpHandler, SERVER_NAME};
pub use registry::{AccountRegistry, Adapter, AdapterFactory, BackendFactory, google_config};
pub use signals::{ShutdownHandle, SignalHandler};
pub use stdio::StdioServer;
pub use tools::{CalendarTools, ToolName, UnknownTool, tool_definitions};

//! CLI and process entry points for `unical-mcp`.
//!
//! - [`commands::serve`]: the MCP server on stdio
//! - [`commands::auth`]: the one-time Google authorization

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};

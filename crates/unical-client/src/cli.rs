//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use unical_core::TracingOutputFormat;
use unical_server::{CONFIG_ENV, DEFAULT_CONFIG_PATH};

/// unical-mcp - one MCP server for Exchange, Google and CalDAV calendars
///
/// Without `--auth`, serves the calendar tools over MCP on stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "unical-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the calendar accounts file
    #[arg(long, short, env = CONFIG_ENV, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format on stderr
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Run the one-time interactive authorization for a provider
    #[arg(long, value_enum)]
    pub auth: Option<AuthProvider>,

    /// Calendar to authorize (defaults to the first google calendar)
    #[arg(long, requires = "auth")]
    pub calendar: Option<String>,
}

/// Providers with an interactive authorization flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthProvider {
    Google,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
            LogFormat::Json => Self::Json,
        }
    }
}

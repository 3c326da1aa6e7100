//! unical-mcp entry point.

use std::process::ExitCode;

use clap::Parser;

use unical_client::cli::{AuthProvider, Cli};
use unical_client::commands;
use unical_client::error::ClientResult;
use unical_core::{TracingConfig, init_tracing};
use unical_server::CalendarConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    // Logs go to stderr; stdout belongs to the MCP session.
    let mut tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::stdio_server()
    };
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(format.into());
    }
    init_tracing(tracing_config)?;

    match cli.auth {
        Some(AuthProvider::Google) => {
            let config = CalendarConfig::load(&cli.config)?;
            commands::auth::google(&config, cli.calendar.as_deref()).await
        }
        None => commands::serve::run(&cli).await,
    }
}

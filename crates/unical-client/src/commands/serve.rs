//! Serve command: the MCP server on stdin/stdout.

use std::sync::Arc;

use tracing::info;

use unical_server::{
    AccountRegistry, CalendarConfig, CalendarTools, McpHandler, SignalHandler, StdioServer,
};

use crate::cli::Cli;
use crate::error::ClientResult;

/// Serves MCP until stdin closes or a termination signal arrives.
///
/// Accounts are only connected when a tool first needs them, so a broken
/// account does not keep the server from starting.
pub async fn run(cli: &Cli) -> ClientResult<()> {
    let config = CalendarConfig::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        accounts = config.accounts.len(),
        "Starting unical MCP server"
    );
    for account in &config.accounts {
        info!(account = %account.name, kind = %account.kind(), "Calendar configured");
    }

    let registry = Arc::new(AccountRegistry::new(config));
    let server = StdioServer::new(McpHandler::new(CalendarTools::new(registry)));

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    server
        .serve_until_shutdown(
            tokio::io::stdin(),
            tokio::io::stdout(),
            signal_handler.shutdown_handle(),
        )
        .await?;

    info!("Server stopped");
    Ok(())
}

//! Request/response dispatch handler.
//!
//! Routes MCP methods to the calendar tools and produces JSON-RPC responses.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use unical_protocol::mcp::{
    self, CallToolParams, Implementation, InitializeParams, InitializeResult, ListToolsResult,
    ServerCapabilities, ToolsCapability, methods,
};
use unical_protocol::{ErrorCode, Request, Response, RpcError};

use crate::tools::{CalendarTools, ToolName, tool_definitions};

/// Name reported to clients in `initialize`.
pub const SERVER_NAME: &str = "unical-calendar";

/// Handles MCP requests for one session.
#[derive(Clone)]
pub struct McpHandler {
    tools: CalendarTools,
}

impl McpHandler {
    pub fn new(tools: CalendarTools) -> Self {
        Self { tools }
    }

    /// Handles a single request and returns the response.
    #[instrument(skip_all, fields(method = %request.method, id = ?request.id))]
    pub async fn handle(&self, request: Request) -> Response {
        let start = std::time::Instant::now();
        let result = self.dispatch(&request.method, request.params).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(duration_ms, "Request handled"),
            Err(e) => warn!(duration_ms, code = e.code, error = %e.message, "Request failed"),
        }

        match (request.id, result) {
            (Some(id), Ok(value)) => Response::success(id, value),
            (id, Err(error)) => Response::error(id, error),
            (None, Ok(_)) => Response::error(
                None,
                RpcError::new(ErrorCode::InvalidRequest, "request without id"),
            ),
        }
    }

    /// Handles a notification. Nothing is sent back.
    pub fn handle_notification(&self, notification: &Request) {
        match notification.method.as_str() {
            methods::INITIALIZED => info!("Client initialized"),
            methods::CANCELLED => debug!(params = ?notification.params, "Client cancelled a request"),
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            methods::INITIALIZE => {
                let params: InitializeParams = parse_params(params)?;
                to_result(&self.initialize(params))
            }
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => to_result(&ListToolsResult {
                tools: tool_definitions(),
                next_cursor: None,
            }),
            methods::TOOLS_CALL => {
                let params: CallToolParams = parse_params(params)?;
                let tool: ToolName = params
                    .name
                    .parse()
                    .map_err(|e: crate::tools::UnknownTool| {
                        RpcError::new(ErrorCode::InvalidParams, e.to_string())
                    })?;
                let result = self
                    .tools
                    .call(tool, params.arguments.unwrap_or_default())
                    .await;
                to_result(&result)
            }
            other => Err(RpcError::new(
                ErrorCode::MethodNotFound,
                format!("Method not found: {other}"),
            )),
        }
    }

    fn initialize(&self, params: InitializeParams) -> InitializeResult {
        let protocol_version = mcp::negotiate_version(&params.protocol_version);
        match &params.client_info {
            Some(client) => info!(
                client = %client.name,
                client_version = %client.version,
                requested = %params.protocol_version,
                negotiated = protocol_version,
                "Initialize"
            ),
            None => info!(negotiated = protocol_version, "Initialize"),
        }

        let registry = self.tools.registry();
        let instructions = if registry.is_empty() {
            "No calendars are configured.".to_string()
        } else {
            format!(
                "Unified calendar access. Configured calendars: {}. Use list_calendars for labels and types.",
                registry.names().collect::<Vec<_>>().join(", ")
            )
        };

        InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(instructions),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let value = params.filter(|v| !v.is_null()).unwrap_or_else(|| json!({}));
    serde_json::from_value(value).map_err(|e| RpcError::new(ErrorCode::InvalidParams, e.to_string()))
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(ErrorCode::InternalError, e.to_string()))
}

//! JSON-RPC 2.0 message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::JSONRPC_VERSION;
use crate::error::{ProtocolError, ProtocolResult};

/// Request identifier, echoed back in the matching response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A request or notification from the client.
///
/// Notifications carry no `id` and never receive a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Standard JSON-RPC error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// A response to a request.
///
/// `id` is `null` only when the request id could not be determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request(Request),
    Notification(Request),
    /// A response to a server-initiated request; the server sends none, so
    /// these are ignored.
    Response(Response),
}

impl Incoming {
    /// Classifies one line of input.
    ///
    /// Invalid JSON yields [`ProtocolError::Serialization`]; JSON that is not
    /// a JSON-RPC 2.0 object yields [`ProtocolError::InvalidMessage`].
    pub fn parse(line: &[u8]) -> ProtocolResult<Self> {
        let value: Value = crate::decode_message(line)?;
        let Some(obj) = value.as_object() else {
            return Err(ProtocolError::InvalidMessage(
                "expected a JSON object".to_string(),
            ));
        };
        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(ProtocolError::InvalidMessage(
                "missing or unsupported jsonrpc version".to_string(),
            ));
        }

        if obj.contains_key("method") {
            let request: Request = serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
            return Ok(if request.is_notification() {
                Self::Notification(request)
            } else {
                Self::Request(request)
            });
        }

        if obj.contains_key("result") || obj.contains_key("error") {
            let response: Response = serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
            return Ok(Self::Response(response));
        }

        Err(ProtocolError::InvalidMessage(
            "neither a request nor a response".to_string(),
        ))
    }
}

/// Best-effort extraction of an id from a line that failed validation.
pub(crate) fn salvage_id(line: &[u8]) -> Option<RequestId> {
    let value: Value = serde_json::from_slice(line.trim_ascii()).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

impl ProtocolError {
    /// Maps a decoding failure to the JSON-RPC error the peer should receive.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Serialization(e) => RpcError::new(ErrorCode::ParseError, e.to_string()),
            Self::InvalidMessage(msg) => RpcError::new(ErrorCode::InvalidRequest, msg.clone()),
            Self::MessageTooLarge { .. } => {
                RpcError::new(ErrorCode::InvalidRequest, self.to_string())
            }
            other => RpcError::new(ErrorCode::InternalError, other.to_string()),
        }
    }

    /// Builds the error response for an undecodable line.
    pub fn to_response(&self, line: &[u8]) -> Response {
        Response::error(salvage_id(line), self.to_rpc_error())
    }
}

//! Wire types and stdio framing for the unical MCP server.
//!
//! The server speaks the Model Context Protocol: JSON-RPC 2.0 messages, one
//! per line, over stdin/stdout.
//!
//! # Example
//!
//! ```rust
//! use unical_protocol::{decode_message, encode_message, Request, RequestId};
//!
//! let request = Request::new(RequestId::Number(1), "ping", None);
//! let bytes = encode_message(&request).unwrap();
//! assert_eq!(bytes.last(), Some(&b'\n'));
//! let decoded: Request = decode_message(&bytes).unwrap();
//! assert_eq!(decoded.method, "ping");
//! ```

mod error;
mod framing;
mod jsonrpc;
pub mod mcp;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{decode_message, encode_message, LineReader, LineWriter};
pub use jsonrpc::{ErrorCode, Incoming, Request, RequestId, Response, RpcError};

/// JSON-RPC version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Maximum size of one framed message (4 MB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

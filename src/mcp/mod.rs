// src/mcp/mod.rs
// MCP protocol engine: JSON-RPC 2.0 dispatch shared by the stdio and HTTP
// transports.

pub mod dispatch;
pub mod rpc;
pub mod stdio;

pub use dispatch::{McpEngine, PROTOCOL_VERSION, RequestContext, SERVER_NAME};
pub use rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

// src/mcp/dispatch.rs
// Method dispatch for the MCP engine. Transport-agnostic: stdio and HTTP
// both feed requests through `handle`.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::registry::{ToolCallContext, ToolRegistry};
use crate::resilience::ResilientExecutor;
use crate::tenancy::TenantScope;

use super::rpc::{
    INVALID_PARAMS, INVALID_REQUEST, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
};

pub const PROTOCOL_VERSION: &str = "2024-11-01";
pub const SERVER_NAME: &str = "limbodancer-mcp";

/// Per-request context resolved by the transport before dispatch.
#[derive(Clone)]
pub struct RequestContext {
    /// Scope resolution outcome. Errors surface when a tool call actually
    /// needs the scope; initialize and shutdown proceed without one.
    pub scope: std::result::Result<TenantScope, Arc<ServerError>>,
    pub cancel: CancellationToken,
    pub permissions: Vec<String>,
}

impl RequestContext {
    pub fn new(scope: Result<TenantScope>) -> Self {
        Self {
            scope: scope.map_err(Arc::new),
            cancel: CancellationToken::new(),
            permissions: vec!["tools".into()],
        }
    }
}

/// The protocol engine: registry + resilience pipeline + shutdown signal.
pub struct McpEngine {
    registry: ToolRegistry,
    executor: ResilientExecutor,
    shutdown: CancellationToken,
}

impl McpEngine {
    pub fn new(registry: ToolRegistry, executor: ResilientExecutor) -> Self {
        Self {
            registry,
            executor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token the transports watch to stop accepting new work.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatch one request. Returns None for notifications.
    pub async fn handle(&self, request: JsonRpcRequest, ctx: RequestContext) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                INVALID_REQUEST,
                "expected jsonrpc 2.0 envelope",
            ));
        }

        let id = request.id.clone();
        match request.method.as_str() {
            // Requests with no id are notifications: handled, never answered.
            "initialize" => id.map(|id| JsonRpcResponse::success(Some(id), self.initialize_result())),
            "tools/list" => id.map(|id| JsonRpcResponse::success(Some(id), self.tools_list_result())),
            "tools/call" => self.handle_tools_call(request, ctx).await,
            "shutdown" => {
                info!("Shutdown requested; draining in-flight work");
                self.shutdown.cancel();
                // Shutdown is specified as a notification; a stray id still
                // gets an acknowledgment rather than silence.
                id.map(|id| JsonRpcResponse::success(Some(id), Value::Null))
            }
            other => {
                if request.is_notification() {
                    debug!(method = other, "Ignoring unknown notification");
                    None
                } else {
                    Some(JsonRpcResponse::error(
                        id,
                        METHOD_NOT_FOUND,
                        format!("unknown method: {other}"),
                    ))
                }
            }
        }
    }

    /// Idempotent: repeated calls return identical server info.
    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn tools_list_result(&self) -> Value {
        let tools: Vec<Value> = self
            .registry
            .list()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(
        &self,
        request: JsonRpcRequest,
        ctx: RequestContext,
    ) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        let params = request.params.unwrap_or(Value::Null);

        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                "tools/call requires a string 'name'",
            ));
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        // Unknown tool is a protocol-level error; everything below is a
        // tool-level error carried inside the result.
        let Some(registration) = self.registry.get(name) else {
            return Some(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("unknown tool: {name}"),
            ));
        };

        let result = self.call_tool(&registration, ctx, arguments).await;
        let response = match result {
            Ok(value) => {
                let text =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                json!({ "content": [{ "type": "text", "text": text }] })
            }
            Err(err) => {
                let body = err.body();
                let text = serde_json::to_string_pretty(&body)
                    .unwrap_or_else(|_| format!("{{\"errorCode\":\"{}\"}}", err.kind().as_str()));
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": true,
                })
            }
        };
        if request.id.is_none() {
            // tools/call as a notification: execute, discard the result.
            return None;
        }
        Some(JsonRpcResponse::success(id, response))
    }

    async fn call_tool(
        &self,
        registration: &Arc<crate::registry::ToolRegistration>,
        ctx: RequestContext,
        arguments: Value,
    ) -> Result<Value> {
        // Pipeline order: schema validation gets first say, then scope and
        // permissions. A tool still never executes without a resolved scope.
        registration.validate_args(&arguments)?;

        let scope = match &ctx.scope {
            Ok(scope) => scope.clone(),
            Err(err) => {
                return Err(match err.as_ref() {
                    ServerError::ScopeViolation(msg) => ServerError::ScopeViolation(msg.clone()),
                    ServerError::TenantUnresolved(msg) => {
                        ServerError::TenantUnresolved(msg.clone())
                    }
                    other => ServerError::TenantUnresolved(other.to_string()),
                });
            }
        };

        for permission in &registration.permissions {
            if !ctx.permissions.contains(permission) {
                return Err(ServerError::Forbidden(format!(
                    "missing permission '{permission}' for tool '{}'",
                    registration.name
                )));
            }
        }

        let call_ctx = ToolCallContext {
            scope,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            cancel: ctx.cancel.clone(),
            permissions: ctx.permissions.clone(),
        };
        self.executor.execute(registration, &call_ctx, arguments).await
    }
}

// src/web/mcp_http.rs
// MCP over HTTP: one endpoint per capability. Same dispatch semantics as
// the stdio transport, different framing.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde_json::{Value, json};

use crate::mcp::dispatch::RequestContext;
use crate::mcp::rpc::{JsonRpcRequest, METHOD_NOT_FOUND};

use super::auth::{ApiError, resolve_request_scope};
use super::state::AppState;

/// POST /api/mcp/initialize — anonymous; idempotent server info.
pub async fn initialize(State(state): State<AppState>) -> Json<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(json!(0)),
        method: "initialize".into(),
        params: None,
    };
    // Initialize needs no scope; the context error is never consulted.
    let ctx = RequestContext::new(Err(crate::error::ServerError::TenantUnresolved(
        "anonymous".into(),
    )));
    let response = state.engine.handle(request, ctx).await;
    Json(response.and_then(|r| r.result).unwrap_or(Value::Null))
}

/// GET /api/mcp/tools — bearer auth; tool listing.
pub async fn list_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    resolve_request_scope(&state.settings, &headers)?;

    let request = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(json!(0)),
        method: "tools/list".into(),
        params: None,
    };
    let ctx = RequestContext::new(Err(crate::error::ServerError::TenantUnresolved(
        "listing needs no scope".into(),
    )));
    let response = state.engine.handle(request, ctx).await;
    Ok(Json(
        response.and_then(|r| r.result).unwrap_or(Value::Null),
    ))
}

/// POST /api/mcp/tools/{name} — bearer auth; body is the tool arguments.
pub async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(arguments): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    // Scope resolution may fail here; dispatch still runs so the pipeline
    // order holds (tool resolution and schema validation come before the
    // scope check). The engine surfaces the scope error only once the
    // earlier steps pass.
    let scope = resolve_request_scope(&state.settings, &headers);

    let request = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(json!(0)),
        method: "tools/call".into(),
        params: Some(json!({ "name": name, "arguments": arguments })),
    };
    let ctx = RequestContext::new(scope);
    let response = state.engine.handle(request, ctx).await;

    match response {
        Some(resp) => {
            if let Some(err) = resp.error {
                // Unknown tool surfaces as 404; other protocol errors as 400.
                let server_err = if err.code == METHOD_NOT_FOUND {
                    crate::error::ServerError::NotFound(err.message)
                } else {
                    crate::error::ServerError::SchemaInvalid(err.message)
                };
                return Err(server_err.into());
            }
            let result = resp.result.unwrap_or(Value::Null);
            // Auth failures keep their HTTP status codes; every other
            // tool-level error rides in the result so the protocol
            // continues.
            if let Some((code, message)) = tool_error_code(&result) {
                match code.as_str() {
                    "tenant-unresolved" => {
                        return Err(crate::error::ServerError::TenantUnresolved(message).into());
                    }
                    "scope-violation" => {
                        return Err(crate::error::ServerError::ScopeViolation(message).into());
                    }
                    _ => {}
                }
            }
            Ok(Json(result))
        }
        None => Ok(Json(Value::Null)),
    }
}

/// Pull the tool-level error code and message out of a tools/call result.
fn tool_error_code(result: &Value) -> Option<(String, String)> {
    if result.get("isError").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let body: Value = serde_json::from_str(result["content"][0]["text"].as_str()?).ok()?;
    Some((
        body["errorCode"].as_str()?.to_string(),
        body["message"].as_str().unwrap_or_default().to_string(),
    ))
}

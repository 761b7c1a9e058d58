// src/web/chat_http.rs
// Chat ingestion endpoints: create a session, post a message into it.
// Streaming happens on /api/mcp/events.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::auth::{ApiError, resolve_request_scope};
use super::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub system_prompt: Option<String>,
}

/// POST /api/chat/sessions — bearer auth.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let scope = resolve_request_scope(&state.settings, &headers)?;
    let system_prompt = body.and_then(|Json(req)| req.system_prompt);

    let session = state
        .orchestrator
        .create_session(&scope.tenant_id, system_prompt)
        .await?;
    Ok((StatusCode::CREATED, Json(json!(session))))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// POST /api/chat/sessions/{id}/messages — bearer auth. Returns the
/// correlation id tying the produced stream to this message.
pub async fn post_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let scope = resolve_request_scope(&state.settings, &headers)?;

    let correlation_id = state
        .orchestrator
        .enqueue(&scope.tenant_id, &session_id, req.content)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "sessionId": session_id, "correlationId": correlation_id })),
    ))
}

/// DELETE /api/chat/sessions/{id} — bearer auth.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let scope = resolve_request_scope(&state.settings, &headers)?;
    state
        .orchestrator
        .delete_session(&scope.tenant_id, &session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

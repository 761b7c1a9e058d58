// src/tools/history.rs
// history_get / history_append tool handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Result, ServerError};
use crate::registry::{ToolCallContext, ToolHandler};
use crate::stores::history::{HistoryStore, NewMessage};

use super::ToolDeps;

const MAX_LIMIT: u32 = 1000;

/// Clamp a caller-supplied limit into [1, 1000].
fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(100).clamp(1, MAX_LIMIT)
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HistoryGetRequest {
    #[schemars(description = "Session to read")]
    pub session_id: String,
    #[schemars(description = "Max messages to return (clamped to 1..=1000, default 100)")]
    pub limit: Option<u32>,
    #[schemars(description = "Only messages strictly older than this RFC3339 timestamp")]
    pub before: Option<DateTime<Utc>>,
}

pub struct HistoryGetTool {
    pub deps: ToolDeps,
}

#[async_trait]
impl ToolHandler for HistoryGetTool {
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<Value> {
        let req: HistoryGetRequest = serde_json::from_value(args)?;
        let limit = clamp_limit(req.limit);

        // Tenant isolation is silent: messages outside the caller's tenant
        // simply do not exist from this query's point of view.
        let messages = self
            .deps
            .history
            .list_messages(&ctx.scope.tenant_id, &req.session_id, limit, req.before)
            .await?;

        Ok(json!({
            "sessionId": req.session_id,
            "messages": messages,
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HistoryAppendRequest {
    #[schemars(description = "Session to append to; must exist and belong to the caller's tenant")]
    pub session_id: String,
    #[schemars(description = "Message sender role: user/assistant/tool/system")]
    pub sender: String,
    pub text: String,
    pub metadata: Option<Value>,
}

pub struct HistoryAppendTool {
    pub deps: ToolDeps,
}

#[async_trait]
impl ToolHandler for HistoryAppendTool {
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<Value> {
        let req: HistoryAppendRequest = serde_json::from_value(args)?;

        let exists = self
            .deps
            .history
            .session_exists(&ctx.scope.tenant_id, &req.session_id)
            .await?;
        if !exists {
            // Covers both truly unknown sessions and sessions owned by a
            // different tenant; the caller cannot tell them apart.
            return Err(ServerError::NotFound(format!(
                "session {:?}",
                req.session_id
            )));
        }

        let stored = self
            .deps
            .history
            .append_message(NewMessage {
                tenant_id: ctx.scope.tenant_id.clone(),
                session_id: req.session_id,
                sender: req.sender,
                text: req.text,
                metadata: req.metadata,
                tool_calls: None,
            })
            .await?;

        Ok(json!({
            "id": stored.id,
            "sessionId": stored.session_id,
            "timestamp": stored.timestamp,
        }))
    }
}

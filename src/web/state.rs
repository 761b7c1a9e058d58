// src/web/state.rs
// Shared state for the HTTP transport.

use std::sync::Arc;

use crate::chat::ChatOrchestrator;
use crate::config::Settings;
use crate::mcp::McpEngine;
use crate::tools::ToolDeps;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Arc<McpEngine>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub deps: ToolDeps,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        engine: Arc<McpEngine>,
        orchestrator: Arc<ChatOrchestrator>,
        deps: ToolDeps,
    ) -> Self {
        Self {
            settings,
            engine,
            orchestrator,
            deps,
        }
    }
}

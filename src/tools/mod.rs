// src/tools/mod.rs
// The tool set: history get/append, memory search, graph query. Each
// handler consumes the external stores through their narrow interfaces and
// carries the resolved scope end-to-end.

pub mod graph;
pub mod history;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use schemars::schema_for;

use crate::config::Settings;
use crate::error::Result;
use crate::ontology::OntologyStore;
use crate::registry::{ToolRegistration, ToolRegistry};
use crate::stores::graph::GraphStore;
use crate::stores::history::HistoryStore;
use crate::stores::vector::VectorIndex;

/// Shared dependencies handed to every tool handler.
#[derive(Clone)]
pub struct ToolDeps {
    pub history: Arc<dyn HistoryStore>,
    pub vector: Arc<dyn VectorIndex>,
    pub graph: Arc<dyn GraphStore>,
    pub ontology: Arc<OntologyStore>,
}

/// Build the immutable registry with the four core tools. Tool input
/// schemas are generated from the request types.
pub fn build_registry(settings: &Settings, deps: ToolDeps) -> Result<ToolRegistry> {
    let timeout = Duration::from_millis(settings.tool_timeout_ms);
    let registrations = vec![
        ToolRegistration::new(
            "history_get",
            "Read a session's message history in ascending timestamp order.",
            "history",
            vec!["tools".into()],
            timeout,
            true,
            serde_json::to_value(schema_for!(history::HistoryGetRequest))?,
            None,
            Arc::new(history::HistoryGetTool { deps: deps.clone() }),
        )?,
        ToolRegistration::new(
            "history_append",
            "Append a message to an existing session.",
            "history",
            vec!["tools".into()],
            timeout,
            // Appends are not idempotent; never retried.
            false,
            serde_json::to_value(schema_for!(history::HistoryAppendRequest))?,
            None,
            Arc::new(history::HistoryAppendTool { deps: deps.clone() }),
        )?,
        ToolRegistration::new(
            "memory_search",
            "Search the memory index lexically, semantically, or hybrid.",
            "memory",
            vec!["tools".into()],
            timeout,
            true,
            serde_json::to_value(schema_for!(memory::MemorySearchRequest))?,
            None,
            Arc::new(memory::MemorySearchTool { deps: deps.clone() }),
        )?,
        ToolRegistration::new(
            "graph_query",
            "Query the knowledge graph with filters and traversals.",
            "graph",
            vec!["tools".into()],
            timeout,
            true,
            serde_json::to_value(schema_for!(graph::GraphQueryRequest))?,
            None,
            Arc::new(graph::GraphQueryTool { deps }),
        )?,
    ];
    Ok(ToolRegistry::new(registrations))
}

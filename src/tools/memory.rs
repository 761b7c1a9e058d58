// src/tools/memory.rs
// memory_search tool handler.

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Result, ServerError};
use crate::registry::{ToolCallContext, ToolHandler};
use crate::stores::vector::{SearchRequest, VectorIndex};

use super::ToolDeps;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemorySearchRequest {
    #[schemars(description = "Natural-language query; drives the lexical/semantic leg")]
    pub query_text: Option<String>,
    #[schemars(description = "Embedding vector; drives the vector leg")]
    pub query_vector: Option<Vec<f32>>,
    #[schemars(description = "Number of hits to return")]
    pub k: Option<usize>,
    #[schemars(description = "Field equality filters, ANDed with the mandatory tenant filter")]
    pub filters: Option<HashMap<String, String>>,
    #[schemars(description = "Restrict to documents of this ontology class (aliases resolve)")]
    pub ontology_class: Option<String>,
}

pub struct MemorySearchTool {
    pub deps: ToolDeps,
}

#[async_trait]
impl ToolHandler for MemorySearchTool {
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<Value> {
        let req: MemorySearchRequest = serde_json::from_value(args)?;
        if req.query_text.is_none() && req.query_vector.is_none() {
            return Err(ServerError::SchemaInvalid(
                "at least one of queryText/queryVector is required".into(),
            ));
        }

        // Ontology class names may arrive as aliases; resolve them against
        // the caller's catalog before filtering.
        let ontology_class = match req.ontology_class {
            Some(class) => {
                let catalog = self.deps.ontology.get_or_load(&ctx.scope).await?;
                Some(catalog.resolve_alias(&class).to_string())
            }
            None => None,
        };

        let hits = self
            .deps
            .vector
            .search_hybrid(SearchRequest {
                tenant_id: ctx.scope.tenant_id.clone(),
                text: req.query_text,
                vector: req.query_vector,
                k: req.k.unwrap_or(10).max(1),
                filters: req.filters.unwrap_or_default(),
                ontology_class,
            })
            .await?;

        Ok(json!({ "hits": hits }))
    }
}

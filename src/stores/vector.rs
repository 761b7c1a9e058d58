// src/stores/vector.rs
// Vector search index interface and the Qdrant client behind it.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, ServerError};

/// A document stored in the index.
#[derive(Debug, Clone)]
pub struct MemoryDoc {
    pub id: String,
    pub tenant_id: String,
    pub title: Option<String>,
    pub source: Option<String>,
    pub chunk: Option<String>,
    pub ontology_class: Option<String>,
    pub tags: Vec<String>,
    pub content: String,
    pub vector: Vec<f32>,
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHit {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ontology_class: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub score: f32,
}

/// Search request carried to the index. The tenant filter is mandatory and
/// implementations MUST apply it regardless of caller-supplied filters.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub tenant_id: String,
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub k: usize,
    pub filters: HashMap<String, String>,
    pub ontology_class: Option<String>,
}

/// Vector index contract: ensure, upsert, hybrid search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn ensure_index(&self, dim: u64) -> Result<()>;
    async fn upsert(&self, docs: Vec<MemoryDoc>) -> Result<()>;

    /// Text-only requests run a lexical (and, where the backend supports
    /// it, semantic) search; vector-only requests run a pure vector search;
    /// both together run a hybrid search with fan-out 2k before truncating
    /// back to k.
    async fn search_hybrid(&self, request: SearchRequest) -> Result<Vec<MemoryHit>>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> Result<()>;
}

fn upstream(e: impl std::fmt::Display) -> ServerError {
    // Qdrant transport failures are worth a retry; the message is kept
    // short so credentials in connection strings never leak through.
    ServerError::Upstream {
        message: format!("vector index error: {e}"),
        transient: true,
    }
}

/// Qdrant-backed index. One collection; tenancy is a payload field with a
/// mandatory filter condition on every query.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorIndex {
    pub fn connect(url: &str, collection: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(upstream)?;
        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    fn filter_for(&self, request: &SearchRequest) -> Filter {
        let mut conditions = vec![Condition::matches("tenant", request.tenant_id.clone())];
        for (field, value) in &request.filters {
            conditions.push(Condition::matches(field.clone(), value.clone()));
        }
        if let Some(class) = &request.ontology_class {
            conditions.push(Condition::matches("ontology_class", class.clone()));
        }
        Filter::must(conditions)
    }

    fn point_to_hit(point_payload: HashMap<String, QdrantValue>, id: String, score: f32) -> MemoryHit {
        let get_str = |key: &str| -> Option<String> {
            point_payload.get(key).and_then(|v| match &v.kind {
                Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
                _ => None,
            })
        };
        let tags = get_str("tags")
            .map(|t| t.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        MemoryHit {
            id,
            title: get_str("title"),
            source: get_str("source"),
            chunk: get_str("chunk"),
            ontology_class: get_str("ontology_class"),
            tags,
            content: get_str("content"),
            score,
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn ensure_index(&self, dim: u64) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(upstream)?;
        if !exists {
            info!(collection = %self.collection, dim, "Creating Qdrant collection");
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(dim, Distance::Cosine)),
                )
                .await
                .map_err(upstream)?;
        }
        Ok(())
    }

    async fn upsert(&self, docs: Vec<MemoryDoc>) -> Result<()> {
        let points: Vec<PointStruct> = docs
            .into_iter()
            .map(|doc| {
                let mut payload: HashMap<String, QdrantValue> = HashMap::new();
                payload.insert("tenant".into(), doc.tenant_id.into());
                payload.insert("content".into(), doc.content.into());
                if let Some(title) = doc.title {
                    payload.insert("title".into(), title.into());
                }
                if let Some(source) = doc.source {
                    payload.insert("source".into(), source.into());
                }
                if let Some(chunk) = doc.chunk {
                    payload.insert("chunk".into(), chunk.into());
                }
                if let Some(class) = doc.ontology_class {
                    payload.insert("ontology_class".into(), class.into());
                }
                if !doc.tags.is_empty() {
                    payload.insert("tags".into(), doc.tags.join(",").into());
                }
                PointStruct::new(doc.id, doc.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(upstream)?;
        Ok(())
    }

    async fn search_hybrid(&self, request: SearchRequest) -> Result<Vec<MemoryHit>> {
        let k = request.k.max(1);
        match (&request.vector, &request.text) {
            (Some(vector), text) => {
                // Vector (or hybrid) search. With a text leg present the
                // fan-out doubles and the text becomes a full-text filter
                // condition before truncating back to k.
                let fan_out = if text.is_some() { 2 * k } else { k };
                let mut filter = self.filter_for(&request);
                if let Some(text) = text {
                    filter
                        .must
                        .push(Condition::matches_text("content", text.clone()));
                }
                let results = self
                    .client
                    .search_points(
                        SearchPointsBuilder::new(&self.collection, vector.clone(), fan_out as u64)
                            .filter(filter)
                            .with_payload(true),
                    )
                    .await
                    .map_err(upstream)?;
                let mut hits: Vec<MemoryHit> = results
                    .result
                    .into_iter()
                    .map(|p| {
                        let id = p
                            .id
                            .and_then(|pid| pid.point_id_options)
                            .map(|opt| match opt {
                                qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => {
                                    n.to_string()
                                }
                                qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u,
                            })
                            .unwrap_or_default();
                        Self::point_to_hit(p.payload, id, p.score)
                    })
                    .collect();
                hits.truncate(k);
                Ok(hits)
            }
            (None, Some(text)) => {
                // Lexical-only: full-text payload match, rank order.
                let mut filter = self.filter_for(&request);
                filter
                    .must
                    .push(Condition::matches_text("content", text.clone()));
                let results = self
                    .client
                    .scroll(
                        ScrollPointsBuilder::new(&self.collection)
                            .filter(filter)
                            .limit(k as u32)
                            .with_payload(true),
                    )
                    .await
                    .map_err(upstream)?;
                debug!(count = results.result.len(), "Lexical scroll complete");
                let total = results.result.len() as f32;
                Ok(results
                    .result
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let id = p
                            .id
                            .and_then(|pid| pid.point_id_options)
                            .map(|opt| match opt {
                                qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => {
                                    n.to_string()
                                }
                                qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u,
                            })
                            .unwrap_or_default();
                        // Scroll has no scores; use rank position.
                        let score = 1.0 - (i as f32 / total.max(1.0));
                        Self::point_to_hit(p.payload, id, score)
                    })
                    .collect())
            }
            (None, None) => Err(ServerError::SchemaInvalid(
                "memory search requires queryText or queryVector".into(),
            )),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.client.health_check().await.map_err(upstream)?;
        Ok(())
    }
}

/// In-memory index used by tests and stdio smoke runs. Implements the same
/// hybrid contract: substring match for the lexical leg, cosine similarity
/// for the vector leg.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    docs: RwLock<Vec<MemoryDoc>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
    }

    fn matches_filters(doc: &MemoryDoc, request: &SearchRequest) -> bool {
        if doc.tenant_id != request.tenant_id {
            return false;
        }
        if let Some(class) = &request.ontology_class
            && doc.ontology_class.as_deref() != Some(class.as_str())
        {
            return false;
        }
        for (field, value) in &request.filters {
            let matched = match field.as_str() {
                "source" => doc.source.as_deref() == Some(value.as_str()),
                "title" => doc.title.as_deref() == Some(value.as_str()),
                "tags" => doc.tags.iter().any(|t| t == value),
                _ => false,
            };
            if !matched {
                return false;
            }
        }
        true
    }

    fn to_hit(doc: &MemoryDoc, score: f32) -> MemoryHit {
        MemoryHit {
            id: doc.id.clone(),
            title: doc.title.clone(),
            source: doc.source.clone(),
            chunk: doc.chunk.clone(),
            ontology_class: doc.ontology_class.clone(),
            tags: doc.tags.clone(),
            content: Some(doc.content.clone()),
            score,
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_index(&self, _dim: u64) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, docs: Vec<MemoryDoc>) -> Result<()> {
        let mut stored = self.docs.write().await;
        for doc in docs {
            stored.retain(|d| d.id != doc.id || d.tenant_id != doc.tenant_id);
            stored.push(doc);
        }
        Ok(())
    }

    async fn search_hybrid(&self, request: SearchRequest) -> Result<Vec<MemoryHit>> {
        if request.text.is_none() && request.vector.is_none() {
            return Err(ServerError::SchemaInvalid(
                "memory search requires queryText or queryVector".into(),
            ));
        }
        let k = request.k.max(1);

        let docs = self.docs.read().await;
        let mut hits: Vec<MemoryHit> = docs
            .iter()
            .filter(|doc| Self::matches_filters(doc, &request))
            .filter_map(|doc| {
                let lexical = request.text.as_ref().map(|t| {
                    doc.content.to_lowercase().contains(&t.to_lowercase()) as u8 as f32
                });
                let semantic = request
                    .vector
                    .as_ref()
                    .map(|v| Self::cosine(v, &doc.vector));
                let score = match (lexical, semantic) {
                    (Some(l), Some(s)) => (l + s) / 2.0,
                    (Some(l), None) => l,
                    (None, Some(s)) => s,
                    (None, None) => unreachable!(),
                };
                (score > 0.0).then(|| Self::to_hit(doc, score))
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, tenant: &str, content: &str, vector: Vec<f32>) -> MemoryDoc {
        MemoryDoc {
            id: id.into(),
            tenant_id: tenant.into(),
            title: None,
            source: None,
            chunk: None,
            ontology_class: None,
            tags: vec![],
            content: content.into(),
            vector,
        }
    }

    fn request(tenant: &str) -> SearchRequest {
        SearchRequest {
            tenant_id: tenant.into(),
            text: None,
            vector: None,
            k: 5,
            filters: HashMap::new(),
            ontology_class: None,
        }
    }

    #[tokio::test]
    async fn tenant_filter_is_always_applied() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![
                doc("1", "acme", "hello world", vec![1.0, 0.0]),
                doc("2", "rival", "hello world", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let mut req = request("acme");
        req.text = Some("hello".into());
        let hits = index.search_hybrid(req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[tokio::test]
    async fn missing_both_query_inputs_is_schema_invalid() {
        let index = InMemoryVectorIndex::new();
        let err = index.search_hybrid(request("acme")).await.unwrap_err();
        assert!(matches!(err, ServerError::SchemaInvalid(_)));
    }

    #[tokio::test]
    async fn vector_search_ranks_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![
                doc("near", "acme", "a", vec![1.0, 0.0]),
                doc("far", "acme", "b", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let mut req = request("acme");
        req.vector = Some(vec![1.0, 0.1]);
        let hits = index.search_hybrid(req).await.unwrap();
        assert_eq!(hits[0].id, "near");
    }
}

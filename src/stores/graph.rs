// src/stores/graph.rs
// Knowledge-graph store interface. Every operation carries the tenant id;
// the in-memory implementation partitions by tenant up front so cross-tenant
// traversal is impossible by construction.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Result, ServerError};

/// A graph vertex with its property map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub id: String,
    pub properties: HashMap<String, Value>,
}

/// Property filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Exists,
    NotExists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFilter {
    pub property: String,
    pub op: FilterOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl GraphFilter {
    pub fn matches(&self, vertex: &Vertex) -> bool {
        let current = vertex.properties.get(&self.property);
        match self.op {
            FilterOp::Eq => current == self.value.as_ref(),
            FilterOp::Neq => current != self.value.as_ref(),
            FilterOp::Exists => current.is_some(),
            FilterOp::NotExists => current.is_none(),
        }
    }
}

/// Traversal direction along an edge label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Traversal {
    pub direction: Direction,
    pub relation: String,
    pub hops: u32,
}

/// Narrow graph-store contract consumed by the graph tool handler and the
/// effect/precondition machinery.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_vertex(&self, tenant_id: &str, id: &str) -> Result<Option<Vertex>>;

    async fn get_vertex_property(
        &self,
        tenant_id: &str,
        id: &str,
        key: &str,
    ) -> Result<Option<Value>>;

    /// Upsert a property on a vertex, creating the vertex when absent.
    async fn upsert_vertex_property(
        &self,
        tenant_id: &str,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<()>;

    /// Upsert a directed labeled edge.
    async fn upsert_edge(&self, tenant_id: &str, from: &str, label: &str, to: &str) -> Result<()>;

    /// Seeded query: start from `subject_ids` (or the whole tenant
    /// partition), expand traversals hop by hop, filter, truncate to
    /// `limit`. The tenant guard applies at every hop.
    async fn query(
        &self,
        tenant_id: &str,
        subject_ids: Option<Vec<String>>,
        filters: Vec<GraphFilter>,
        traversals: Vec<Traversal>,
        limit: usize,
    ) -> Result<Vec<Vertex>>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct TenantGraph {
    vertices: HashMap<String, HashMap<String, Value>>,
    /// (from, label) -> targets
    edges_out: HashMap<(String, String), Vec<String>>,
    /// (to, label) -> sources
    edges_in: HashMap<(String, String), Vec<String>>,
}

/// In-memory graph store. Default wiring for stdio smoke runs and tests;
/// the production backend sits behind the same trait.
#[derive(Default)]
pub struct InMemoryGraphStore {
    tenants: RwLock<HashMap<String, TenantGraph>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_vertex(&self, tenant_id: &str, id: &str) -> Result<Option<Vertex>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).and_then(|graph| {
            graph.vertices.get(id).map(|props| Vertex {
                id: id.to_string(),
                properties: props.clone(),
            })
        }))
    }

    async fn get_vertex_property(
        &self,
        tenant_id: &str,
        id: &str,
        key: &str,
    ) -> Result<Option<Value>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .and_then(|graph| graph.vertices.get(id))
            .and_then(|props| props.get(key).cloned()))
    }

    async fn upsert_vertex_property(
        &self,
        tenant_id: &str,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        let graph = tenants.entry(tenant_id.to_string()).or_default();
        graph
            .vertices
            .entry(id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn upsert_edge(&self, tenant_id: &str, from: &str, label: &str, to: &str) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        let graph = tenants.entry(tenant_id.to_string()).or_default();
        if !graph.vertices.contains_key(from) {
            return Err(ServerError::NotFound(format!("vertex {from:?}")));
        }
        graph.vertices.entry(to.to_string()).or_default();

        let out = graph
            .edges_out
            .entry((from.to_string(), label.to_string()))
            .or_default();
        if !out.iter().any(|t| t == to) {
            out.push(to.to_string());
        }
        let incoming = graph
            .edges_in
            .entry((to.to_string(), label.to_string()))
            .or_default();
        if !incoming.iter().any(|s| s == from) {
            incoming.push(from.to_string());
        }
        Ok(())
    }

    async fn query(
        &self,
        tenant_id: &str,
        subject_ids: Option<Vec<String>>,
        filters: Vec<GraphFilter>,
        traversals: Vec<Traversal>,
        limit: usize,
    ) -> Result<Vec<Vertex>> {
        let tenants = self.tenants.read().await;
        let Some(graph) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        // Seed set: named subjects that exist in this tenant's partition,
        // or the whole partition.
        let mut frontier: Vec<String> = match subject_ids {
            Some(ids) => ids
                .into_iter()
                .filter(|id| graph.vertices.contains_key(id))
                .collect(),
            None => {
                let mut all: Vec<String> = graph.vertices.keys().cloned().collect();
                all.sort();
                all
            }
        };

        for traversal in &traversals {
            for _ in 0..traversal.hops.max(1) {
                let mut next: Vec<String> = Vec::new();
                let mut seen: HashSet<String> = HashSet::new();
                for id in &frontier {
                    let mut push_targets = |key: &(String, String), map: &HashMap<(String, String), Vec<String>>| {
                        if let Some(targets) = map.get(key) {
                            for target in targets {
                                // Re-apply the tenant guard on every hop: a
                                // target is only followed if it exists in
                                // this tenant's vertex set.
                                if graph.vertices.contains_key(target)
                                    && seen.insert(target.clone())
                                {
                                    next.push(target.clone());
                                }
                            }
                        }
                    };
                    let key = (id.clone(), traversal.relation.clone());
                    match traversal.direction {
                        Direction::Out => push_targets(&key, &graph.edges_out),
                        Direction::In => push_targets(&key, &graph.edges_in),
                        Direction::Both => {
                            push_targets(&key, &graph.edges_out);
                            push_targets(&key, &graph.edges_in);
                        }
                    }
                }
                frontier = next;
                if frontier.is_empty() {
                    break;
                }
            }
        }

        let mut vertices: Vec<Vertex> = frontier
            .into_iter()
            .filter_map(|id| {
                graph.vertices.get(&id).map(|props| Vertex {
                    id,
                    properties: props.clone(),
                })
            })
            .filter(|vertex| filters.iter().all(|f| f.matches(vertex)))
            .collect();
        vertices.truncate(limit);
        Ok(vertices)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        store
            .upsert_vertex_property("acme", "task-1", "status", json!("open"))
            .await
            .unwrap();
        store
            .upsert_vertex_property("acme", "task-2", "status", json!("done"))
            .await
            .unwrap();
        store
            .upsert_edge("acme", "task-1", "blocks", "task-2")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn filters_match_eq_and_exists() {
        let store = seeded().await;
        let open = store
            .query(
                "acme",
                None,
                vec![GraphFilter {
                    property: "status".into(),
                    op: FilterOp::Eq,
                    value: Some(json!("open")),
                }],
                vec![],
                10,
            )
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "task-1");
    }

    #[tokio::test]
    async fn traversal_follows_direction() {
        let store = seeded().await;
        let out = store
            .query(
                "acme",
                Some(vec!["task-1".into()]),
                vec![],
                vec![Traversal {
                    direction: Direction::Out,
                    relation: "blocks".into(),
                    hops: 1,
                }],
                10,
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "task-2");

        let inbound = store
            .query(
                "acme",
                Some(vec!["task-2".into()]),
                vec![],
                vec![Traversal {
                    direction: Direction::In,
                    relation: "blocks".into(),
                    hops: 1,
                }],
                10,
            )
            .await
            .unwrap();
        assert_eq!(inbound[0].id, "task-1");
    }

    #[tokio::test]
    async fn tenants_cannot_see_each_other() {
        let store = seeded().await;
        assert!(store.get_vertex("rival", "task-1").await.unwrap().is_none());
        let vertices = store.query("rival", None, vec![], vec![], 10).await.unwrap();
        assert!(vertices.is_empty());
    }

    #[tokio::test]
    async fn edge_from_missing_vertex_is_not_found() {
        let store = InMemoryGraphStore::new();
        let err = store
            .upsert_edge("acme", "ghost", "rel", "other")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }
}

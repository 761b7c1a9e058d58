// src/tools/graph.rs
// graph_query tool handler plus precondition evaluation and effect commit,
// both grounded in the ontology runtime's predicate mapping.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::error::{Result, ServerError};
use crate::ontology::PropertyKeyMapper;
use crate::registry::{ToolCallContext, ToolHandler};
use crate::stores::graph::{Direction, FilterOp, GraphFilter, GraphStore, Traversal};
use crate::tenancy::TenantScope;

use super::ToolDeps;

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOpSpec {
    Eq,
    Neq,
    Exists,
    NotExists,
}

impl From<FilterOpSpec> for FilterOp {
    fn from(op: FilterOpSpec) -> Self {
        match op {
            FilterOpSpec::Eq => FilterOp::Eq,
            FilterOpSpec::Neq => FilterOp::Neq,
            FilterOpSpec::Exists => FilterOp::Exists,
            FilterOpSpec::NotExists => FilterOp::NotExists,
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilterSpec {
    pub property: String,
    pub op: FilterOpSpec,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DirectionSpec {
    Out,
    In,
    Both,
}

impl From<DirectionSpec> for Direction {
    fn from(d: DirectionSpec) -> Self {
        match d {
            DirectionSpec::Out => Direction::Out,
            DirectionSpec::In => Direction::In,
            DirectionSpec::Both => Direction::Both,
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TraverseSpec {
    pub direction: DirectionSpec,
    pub relation: String,
    #[schemars(description = "Hops to expand along this relation (default 1)")]
    pub hops: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GraphQueryRequest {
    #[schemars(description = "Seed vertex ids; omitted means the whole tenant partition")]
    pub subject_ids: Option<Vec<String>>,
    pub filters: Option<Vec<FilterSpec>>,
    pub traverse: Option<Vec<TraverseSpec>>,
    #[schemars(description = "Max vertices to return (clamped to 1..=1000, default 100)")]
    pub limit: Option<usize>,
}

pub struct GraphQueryTool {
    pub deps: ToolDeps,
}

#[async_trait]
impl ToolHandler for GraphQueryTool {
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<Value> {
        let req: GraphQueryRequest = serde_json::from_value(args)?;
        let limit = req.limit.unwrap_or(100).clamp(1, MAX_LIMIT);

        let filters: Vec<GraphFilter> = req
            .filters
            .unwrap_or_default()
            .into_iter()
            .map(|f| GraphFilter {
                property: f.property,
                op: f.op.into(),
                value: f.value,
            })
            .collect();
        let traversals: Vec<Traversal> = req
            .traverse
            .unwrap_or_default()
            .into_iter()
            .map(|t| Traversal {
                direction: t.direction.into(),
                relation: t.relation,
                hops: t.hops.unwrap_or(1).max(1),
            })
            .collect();

        let vertices = self
            .deps
            .graph
            .query(
                &ctx.scope.tenant_id,
                req.subject_ids,
                filters,
                traversals,
                limit,
            )
            .await?;

        Ok(json!({ "vertices": vertices }))
    }
}

// --- Preconditions & effects -------------------------------------------

/// A typed constraint on the graph state, expressed in ontology terms:
/// the predicate may be a local name, a CURIE, or an absolute IRI.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    pub predicate: String,
    pub op: FilterOpSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionViolation {
    pub predicate: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionOutcome {
    pub is_satisfied: bool,
    pub violations: Vec<PreconditionViolation>,
}

/// A typed mutation of the graph state. A `value` makes this a property
/// effect; an `edge_target` makes it an edge effect whose label is the
/// mapped predicate key (or `edge_label` when given).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    pub predicate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub applied: usize,
    /// Predicates skipped because they map to nothing in the catalog.
    pub skipped: Vec<String>,
}

async fn mapper_for(deps: &ToolDeps, scope: &TenantScope) -> Result<PropertyKeyMapper> {
    let catalog = deps.ontology.get_or_load(scope).await?;
    Ok(PropertyKeyMapper::from_catalog(
        &catalog,
        deps.ontology.prefixes(),
    ))
}

/// Evaluate preconditions against a subject vertex. A missing subject
/// fails every precondition; an unmapped predicate fails closed.
pub async fn evaluate_preconditions(
    deps: &ToolDeps,
    scope: &TenantScope,
    subject_id: &str,
    preconditions: &[Precondition],
) -> Result<PreconditionOutcome> {
    let mapper = mapper_for(deps, scope).await?;

    let Some(subject) = deps.graph.get_vertex(&scope.tenant_id, subject_id).await? else {
        let violations = preconditions
            .iter()
            .map(|p| PreconditionViolation {
                predicate: p.predicate.clone(),
                reason: "subject-missing".into(),
            })
            .collect();
        return Ok(PreconditionOutcome {
            is_satisfied: false,
            violations,
        });
    };

    let mut violations = Vec::new();
    for precondition in preconditions {
        let Some(key) = mapper.resolve(&precondition.predicate) else {
            violations.push(PreconditionViolation {
                predicate: precondition.predicate.clone(),
                reason: "unmapped-predicate".into(),
            });
            continue;
        };

        let filter = GraphFilter {
            property: key,
            op: precondition.op.into(),
            value: precondition.expected.clone(),
        };
        if !filter.matches(&subject) {
            violations.push(PreconditionViolation {
                predicate: precondition.predicate.clone(),
                reason: format!("{:?} check failed", precondition.op),
            });
        }
    }

    Ok(PreconditionOutcome {
        is_satisfied: violations.is_empty(),
        violations,
    })
}

/// Apply effects in the given order. Unmapped predicates are skipped with
/// a warning; the first store failure aborts the remainder and surfaces
/// `effect-failed` (no rollback of already-applied effects).
pub async fn commit_effects(
    deps: &ToolDeps,
    scope: &TenantScope,
    subject_id: &str,
    effects: &[Effect],
) -> Result<CommitOutcome> {
    let mapper = mapper_for(deps, scope).await?;

    let mut applied = 0usize;
    let mut skipped = Vec::new();
    for effect in effects {
        let Some(key) = mapper.resolve(&effect.predicate) else {
            warn!(predicate = %effect.predicate, "Skipping effect on unmapped predicate");
            skipped.push(effect.predicate.clone());
            continue;
        };

        let result = match (&effect.value, &effect.edge_target) {
            (Some(value), None) => {
                deps.graph
                    .upsert_vertex_property(&scope.tenant_id, subject_id, &key, value.clone())
                    .await
            }
            (None, Some(target)) => {
                let label = effect.edge_label.as_deref().unwrap_or(&key);
                deps.graph
                    .upsert_edge(&scope.tenant_id, subject_id, label, target)
                    .await
            }
            _ => Err(ServerError::SchemaInvalid(format!(
                "effect on '{}' needs exactly one of value / edgeTarget",
                effect.predicate
            ))),
        };

        match result {
            Ok(()) => applied += 1,
            Err(e) => {
                return Err(ServerError::EffectFailed {
                    predicate: effect.predicate.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(CommitOutcome { applied, skipped })
}

// src/web/health.rs
// Liveness and readiness probes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::ontology::OntologyRepository;
use crate::stores::graph::GraphStore;
use crate::stores::history::HistoryStore;
use crate::stores::vector::VectorIndex;

use super::state::AppState;

/// GET /health — process is up.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /ready — all backing stores answer. 503 names the first failure.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let checks: [(&str, crate::error::Result<()>); 4] = [
        ("history", state.deps.history.ping().await),
        ("vector", state.deps.vector.ping().await),
        ("graph", state.deps.graph.ping().await),
        ("ontology", state.deps.ontology.repository().ping().await),
    ];

    for (name, outcome) in checks {
        if let Err(e) = outcome {
            tracing::warn!(dependency = name, error = %e, "Readiness check failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "dependency": name })),
            );
        }
    }
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

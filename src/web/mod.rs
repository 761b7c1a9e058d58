// src/web/mod.rs
// HTTP transport: router assembly.

pub mod auth;
pub mod chat_http;
pub mod events;
pub mod health;
pub mod mcp_http;
pub mod ontology_http;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics;

pub use state::AppState;

/// Build the HTTP router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        // MCP over HTTP: one endpoint per capability
        .route("/mcp/initialize", post(mcp_http::initialize))
        .route("/mcp/tools", get(mcp_http::list_tools))
        .route("/mcp/tools/{name}", post(mcp_http::call_tool))
        .route("/mcp/events", get(events::events))
        // Ontology validation and export
        .route(
            "/ontology/validate",
            get(ontology_http::validate_get).post(ontology_http::validate_post),
        )
        .route("/ontology/export", get(ontology_http::export))
        // Chat ingestion
        .route("/chat/sessions", post(chat_http::create_session))
        .route(
            "/chat/sessions/{id}",
            delete(chat_http::delete_session),
        )
        .route(
            "/chat/sessions/{id}/messages",
            post(chat_http::post_message),
        )
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api", api_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// src/cli/serve.rs
// Server wiring shared by the HTTP and stdio transports.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use limbodancer::chat::ChatOrchestrator;
use limbodancer::config::Settings;
use limbodancer::mcp::McpEngine;
use limbodancer::ontology::{InMemoryOntologyRepository, OntologyStore};
use limbodancer::ontology::governance::GovernanceGates;
use limbodancer::resilience::ResilientExecutor;
use limbodancer::stores::graph::InMemoryGraphStore;
use limbodancer::stores::history::SqliteHistoryStore;
use limbodancer::stores::vector::QdrantVectorIndex;
use limbodancer::tenancy::{ScopeInputs, resolve_scope};
use limbodancer::tools::{self, ToolDeps};
use limbodancer::web::{AppState, create_router};

use super::CliError;

/// Assembled server components shared by both transports.
pub struct ServerContext {
    pub settings: Arc<Settings>,
    pub deps: ToolDeps,
    pub engine: Arc<McpEngine>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

/// Open the stores, build the registry and the engine. The graph store and
/// ontology repository default to the in-memory implementations; the
/// production backends plug in behind the same traits.
pub async fn init_server_context(settings: Settings) -> anyhow::Result<ServerContext> {
    let settings = Arc::new(settings);

    let history = Arc::new(
        SqliteHistoryStore::connect(&settings.database_url)
            .await
            .context("opening history store")?,
    );
    history.migrate().await.context("migrating history store")?;

    let vector = Arc::new(
        QdrantVectorIndex::connect(&settings.qdrant_url, &settings.qdrant_collection)
            .context("configuring vector index")?,
    );
    let graph = Arc::new(InMemoryGraphStore::new());
    let ontology = Arc::new(OntologyStore::new(Arc::new(
        InMemoryOntologyRepository::new(GovernanceGates::from_settings(&settings)),
    )));

    let deps = ToolDeps {
        history: history.clone(),
        vector,
        graph,
        ontology,
    };

    let registry = tools::build_registry(&settings, deps.clone())
        .map_err(|e| anyhow::anyhow!("building tool registry: {e}"))?;
    let executor = ResilientExecutor::from_settings(&settings);
    let engine = Arc::new(McpEngine::new(registry, executor));
    let orchestrator = Arc::new(ChatOrchestrator::new(&settings, history));

    Ok(ServerContext {
        settings,
        deps,
        engine,
        orchestrator,
    })
}

/// Run the HTTP transport until SIGINT.
pub async fn run_http_server(settings: Settings) -> Result<(), CliError> {
    limbodancer::metrics::init_metrics();
    let ctx = init_server_context(settings)
        .await
        .map_err(|e| CliError::DependencyUnavailable(format!("{e:#}")))?;

    let state = AppState::new(
        ctx.settings.clone(),
        ctx.engine.clone(),
        ctx.orchestrator.clone(),
        ctx.deps.clone(),
    );
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&ctx.settings.http_addr)
        .await
        .map_err(|e| {
            CliError::DependencyUnavailable(format!("bind {}: {e}", ctx.settings.http_addr))
        })?;
    info!(addr = %ctx.settings.http_addr, "HTTP transport listening");

    let shutdown = ctx.engine.shutdown_token();
    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        })
        .await;
    serve_result.map_err(|e| CliError::Generic(e.into()))?;

    info!("HTTP transport drained");
    Err(CliError::Canceled)
}

/// Run the stdio transport with a scope pinned at process start.
pub async fn run_stdio_server(
    settings: Settings,
    tenant: Option<String>,
    package: Option<String>,
    channel: Option<String>,
) -> Result<(), CliError> {
    let ctx = init_server_context(settings)
        .await
        .map_err(|e| CliError::DependencyUnavailable(format!("{e:#}")))?;

    let inputs = ScopeInputs {
        fixed_tenant: tenant,
        header_package: package,
        header_channel: channel,
        ..Default::default()
    };
    let scope = resolve_scope(&ctx.settings, &inputs);
    if let Ok(scope) = &scope {
        info!(scope = %scope, "stdio scope pinned");
    }

    limbodancer::mcp::stdio::serve(ctx.engine.clone(), scope)
        .await
        .map_err(CliError::Generic)
}

//! HTTP transport tests: auth boundaries, per-method MCP endpoints,
//! ontology endpoints, and probes, driven through the router with oneshot
//! requests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use limbodancer::chat::ChatOrchestrator;
use limbodancer::config::Settings;
use limbodancer::mcp::McpEngine;
use limbodancer::ontology::types::{Definition, EntityDef, Governance};
use limbodancer::ontology::{InMemoryOntologyRepository, OntologyRepository, OntologyStore};
use limbodancer::resilience::ResilientExecutor;
use limbodancer::stores::graph::InMemoryGraphStore;
use limbodancer::stores::history::{HistoryStore, SqliteHistoryStore};
use limbodancer::stores::vector::InMemoryVectorIndex;
use limbodancer::tenancy::TenantScope;
use limbodancer::tools::{self, ToolDeps};
use limbodancer::web::auth::issue_token;
use limbodancer::web::{AppState, create_router};

async fn test_router() -> (Router, Arc<Settings>, ToolDeps) {
    let settings = Arc::new(Settings::default());
    let history = Arc::new(SqliteHistoryStore::in_memory().await.unwrap());

    let repo = Arc::new(InMemoryOntologyRepository::default());
    repo.upsert(
        &TenantScope::new("acme", "core", "main").unwrap(),
        Definition::Entity(EntityDef {
            local_name: "Task".into(),
            canonical_uri: "https://limbodancer.ai/ontology/Task".into(),
            parents: vec![],
            annotations: Default::default(),
            governance: Governance::default(),
        }),
    )
    .await
    .unwrap();

    let deps = ToolDeps {
        history: history.clone(),
        vector: Arc::new(InMemoryVectorIndex::new()),
        graph: Arc::new(InMemoryGraphStore::new()),
        ontology: Arc::new(OntologyStore::new(repo)),
    };
    let registry = tools::build_registry(&settings, deps.clone()).unwrap();
    let engine = Arc::new(McpEngine::new(
        registry,
        ResilientExecutor::from_settings(&settings),
    ));
    let orchestrator = Arc::new(ChatOrchestrator::new(&settings, history));

    let state = AppState::new(settings.clone(), engine, orchestrator, deps.clone());
    (create_router(state), settings, deps)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn bearer(settings: &Settings, tenant: &str) -> String {
    format!("Bearer {}", issue_token(&settings.jwt_secret, tenant).unwrap())
}

#[tokio::test]
async fn initialize_is_anonymous_and_returns_server_info() {
    let (router, _, _) = test_router().await;
    let response = router
        .oneshot(
            Request::post("/api/mcp/initialize")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["protocolVersion"], "2024-11-01");
    assert_eq!(body["serverInfo"]["name"], "limbodancer-mcp");
}

#[tokio::test]
async fn tools_listing_requires_bearer_auth() {
    let (router, settings, _) = test_router().await;

    let response = router
        .clone()
        .oneshot(Request::get("/api/mcp/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(
            Request::get("/api/mcp/tools")
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"history_get"));
    assert!(names.contains(&"memory_search"));
}

#[tokio::test]
async fn tool_call_body_is_the_arguments_object() {
    let (router, settings, deps) = test_router().await;
    deps.history
        .create_session("acme", "s1", None)
        .await
        .unwrap();

    let response = router
        .oneshot(
            Request::post("/api/mcp/tools/history_append")
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "sessionId": "s1", "sender": "user", "text": "via http" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let text: Value =
        serde_json::from_str(body["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text["sessionId"], "s1");
    assert!(body.get("isError").is_none());
}

#[tokio::test]
async fn schema_invalid_arguments_win_over_missing_bearer() {
    let (router, _, _) = test_router().await;

    // No Authorization header AND schema-invalid arguments: validation
    // runs before the scope check, so the caller sees schema-invalid, not
    // an auth failure.
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/mcp/tools/history_get")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "sessionId": "s", "limit": "ten" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isError"], true);
    let text: Value =
        serde_json::from_str(body["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text["errorCode"], "schema-invalid");

    // With valid arguments the remaining failure is the missing bearer,
    // which keeps its transport status.
    let response = router
        .oneshot(
            Request::post("/api/mcp/tools/history_get")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "sessionId": "s", "limit": 10 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["errorCode"], "tenant-unresolved");
}

#[tokio::test]
async fn unknown_tool_over_http_is_404() {
    let (router, settings, _) = test_router().await;
    let response = router
        .oneshot(
            Request::post("/api/mcp/tools/nope")
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_ready_probes_answer() {
    let (router, _, _) = test_router().await;
    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = router
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ontology_validate_enforces_tenant_agreement() {
    let (router, settings, _) = test_router().await;
    let uri = "/api/ontology/validate?tenant=acme&package=core&channel=main";

    let response = router
        .clone()
        .oneshot(
            Request::get(uri)
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["scope"], "acme::core::main");
    assert_eq!(body["isValid"], true);

    // A principal from another tenant naming acme's scope is rejected.
    let response = router
        .oneshot(
            Request::get(uri)
                .header(header::AUTHORIZATION, bearer(&settings, "rival"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["errorCode"], "scope-violation");
}

#[tokio::test]
async fn ontology_export_sets_content_type_per_format() {
    let (router, settings, _) = test_router().await;

    let response = router
        .clone()
        .oneshot(
            Request::get("/api/ontology/export?tenant=acme&package=core&channel=main&format=turtle")
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/turtle"
    );

    let response = router
        .oneshot(
            Request::get("/api/ontology/export?tenant=acme&package=core&channel=main&format=jsonld")
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/ld+json"
    );
    let body = body_json(response).await;
    assert!(body["@context"].is_object());
}

#[tokio::test]
async fn chat_session_roundtrip_over_http() {
    let (router, settings, _) = test_router().await;

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/chat/sessions")
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = body_json(response).await;
    let session_id = session["sessionId"].as_str().unwrap().to_string();

    let response = router
        .oneshot(
            Request::post(format!("/api/chat/sessions/{session_id}/messages"))
                .header(header::AUTHORIZATION, bearer(&settings, "acme"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "content": "hello" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["correlationId"].as_str().is_some());
}

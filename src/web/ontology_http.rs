// src/web/ontology_http.rs
// Per-scope ontology validation and export endpoints.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::error::ServerError;
use crate::ontology::export::{self, ExportFormat};
use crate::tenancy::TenantScope;

use super::auth::{ApiError, resolve_request_scope};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScopeParams {
    pub tenant: String,
    pub package: String,
    pub channel: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub tenant: String,
    pub package: String,
    pub channel: String,
    pub format: String,
}

/// Authorize the caller, then check the requested scope against the
/// principal's tenant. Naming a foreign tenant is a scope violation.
fn authorize_scope(
    state: &AppState,
    headers: &HeaderMap,
    tenant: &str,
    package: &str,
    channel: &str,
) -> Result<TenantScope, ServerError> {
    let principal = resolve_request_scope(&state.settings, headers)?;
    if principal.tenant_id != tenant {
        return Err(ServerError::ScopeViolation(format!(
            "request names tenant {tenant:?} but principal is {:?}",
            principal.tenant_id
        )));
    }
    TenantScope::new(tenant, package, channel)
}

/// GET/POST /api/ontology/validate
pub async fn validate_get(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_inner(state, headers, params).await
}

pub async fn validate_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<ScopeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_inner(state, headers, params).await
}

async fn validate_inner(
    state: AppState,
    headers: HeaderMap,
    params: ScopeParams,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scope = authorize_scope(
        &state,
        &headers,
        &params.tenant,
        &params.package,
        &params.channel,
    )?;

    let errors = state.deps.ontology.validate(&scope).await?;
    Ok(Json(json!({
        "scope": scope.canonical(),
        "isValid": errors.is_empty(),
        "errors": errors,
    })))
}

/// GET /api/ontology/export?tenant&package&channel&format=jsonld|turtle
pub async fn export(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let scope = authorize_scope(
        &state,
        &headers,
        &params.tenant,
        &params.package,
        &params.channel,
    )?;

    let Some(format) = ExportFormat::parse(&params.format) else {
        return Err(ServerError::SchemaInvalid(format!(
            "unknown export format {:?}; expected jsonld or turtle",
            params.format
        ))
        .into());
    };

    let catalog = state.deps.ontology.get_or_load(&scope).await?;
    let prefixes = state.deps.ontology.prefixes();
    let (body, content_type) = match format {
        ExportFormat::JsonLd => {
            let doc = export::to_jsonld(&catalog, prefixes).map_err(ApiError::from)?;
            (
                serde_json::to_string_pretty(&doc).unwrap_or_default(),
                format.content_type(),
            )
        }
        ExportFormat::Turtle => (export::to_turtle(&catalog, prefixes), format.content_type()),
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        body,
    )
        .into_response())
}

// src/web/auth.rs
// Bearer JWT validation and per-request scope resolution.

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{ErrorKind, ServerError};
use crate::tenancy::{ScopeInputs, TenantScope, resolve_scope};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    /// Canonical tenant claim.
    pub tenant_id: Option<String>,
    /// Legacy tenant claim, honored with a warning.
    pub tid: Option<String>,
    pub exp: usize,
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ServerError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| ServerError::TenantUnresolved(format!("invalid bearer token: {e}")))
}

/// Mint a short-lived HS256 token for a tenant. Test and local-dev helper;
/// production tokens come from the external identity provider.
pub fn issue_token(secret: &str, tenant_id: &str) -> Result<String, ServerError> {
    use jsonwebtoken::{EncodingKey, Header, encode};
    let claims = Claims {
        sub: Some("test-user".into()),
        tenant_id: Some(tenant_id.into()),
        tid: None,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServerError::Internal(format!("token signing failed: {e}")))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.trim().is_empty())
}

/// Resolve the request's scope from the bearer token and headers,
/// following the precedence rules in the tenancy module.
pub fn resolve_request_scope(
    settings: &Settings,
    headers: &HeaderMap,
) -> Result<TenantScope, ServerError> {
    let bearer = header_value(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer ").map(str::to_string));

    let (claim_tenant, claim_is_legacy) = match bearer {
        Some(token) => {
            let claims = verify_token(&settings.jwt_secret, &token)?;
            match (claims.tenant_id, claims.tid) {
                (Some(tenant), _) => (Some(tenant), false),
                (None, Some(tid)) => (Some(tid), true),
                (None, None) => (None, false),
            }
        }
        None => (None, false),
    };

    let inputs = ScopeInputs {
        claim_tenant,
        claim_is_legacy,
        header_tenant: header_value(headers, "x-tenant-id"),
        header_package: header_value(headers, "x-tenant-package"),
        header_channel: header_value(headers, "x-tenant-channel"),
        fixed_tenant: None,
        requested_tenant: None,
    };
    resolve_scope(settings, &inputs)
}

/// HTTP-facing error wrapper: maps error kinds to status codes and renders
/// the user-visible body.
pub struct ApiError(pub ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::SchemaInvalid => StatusCode::BAD_REQUEST,
            ErrorKind::TenantUnresolved => StatusCode::UNAUTHORIZED,
            ErrorKind::ScopeViolation | ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Overloaded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::CircuitOpen | ErrorKind::UpstreamError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::OntologyInvalid | ErrorKind::UnknownPrefix => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(self.0.body())).into_response()
    }
}

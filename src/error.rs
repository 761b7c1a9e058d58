// src/error.rs
// Standardized error types for LimboDancer

use serde::Serialize;
use thiserror::Error;

/// Wire-level error code, serialized as the `errorCode` field of every
/// user-visible error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    SchemaInvalid,
    TenantUnresolved,
    ScopeViolation,
    Forbidden,
    NotFound,
    Timeout,
    Overloaded,
    CircuitOpen,
    UpstreamError,
    OntologyInvalid,
    UnknownPrefix,
    EffectFailed,
    PreconditionFailed,
    Canceled,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaInvalid => "schema-invalid",
            ErrorKind::TenantUnresolved => "tenant-unresolved",
            ErrorKind::ScopeViolation => "scope-violation",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::CircuitOpen => "circuit-open",
            ErrorKind::UpstreamError => "upstream-error",
            ErrorKind::OntologyInvalid => "ontology-invalid",
            ErrorKind::UnknownPrefix => "unknown-prefix",
            ErrorKind::EffectFailed => "effect-failed",
            ErrorKind::PreconditionFailed => "precondition-failed",
            ErrorKind::Canceled => "canceled",
            ErrorKind::InternalError => "internal-error",
        }
    }
}

/// Main error type for the LimboDancer library
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid arguments: {0}")]
    SchemaInvalid(String),

    #[error("tenant could not be resolved: {0}")]
    TenantUnresolved(String),

    #[error("scope violation: {0}")]
    ScopeViolation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tool '{tool}' timed out after {after_ms}ms")]
    Timeout { tool: String, after_ms: u64 },

    #[error("server overloaded, retry after {retry_after_secs}s")]
    Overloaded { retry_after_secs: u64 },

    #[error("circuit open for tool '{tool}', retry after {retry_after_secs}s")]
    CircuitOpen { tool: String, retry_after_secs: u64 },

    #[error("upstream error: {message}")]
    Upstream { message: String, transient: bool },

    #[error("ontology invalid: {}", .0.join("; "))]
    OntologyInvalid(Vec<String>),

    #[error("unknown CURIE prefix: {0}")]
    UnknownPrefix(String),

    #[error("effect on '{predicate}' failed: {reason}")]
    EffectFailed { predicate: String, reason: String },

    #[error("precondition on '{predicate}' failed: {reason}")]
    PreconditionFailed { predicate: String, reason: String },

    #[error("canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Result using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::SchemaInvalid(_) => ErrorKind::SchemaInvalid,
            ServerError::TenantUnresolved(_) => ErrorKind::TenantUnresolved,
            ServerError::ScopeViolation(_) => ErrorKind::ScopeViolation,
            ServerError::Forbidden(_) => ErrorKind::Forbidden,
            ServerError::NotFound(_) => ErrorKind::NotFound,
            ServerError::Timeout { .. } => ErrorKind::Timeout,
            ServerError::Overloaded { .. } => ErrorKind::Overloaded,
            ServerError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ServerError::Upstream { .. } => ErrorKind::UpstreamError,
            ServerError::OntologyInvalid(_) => ErrorKind::OntologyInvalid,
            ServerError::UnknownPrefix(_) => ErrorKind::UnknownPrefix,
            ServerError::EffectFailed { .. } => ErrorKind::EffectFailed,
            ServerError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            ServerError::Canceled => ErrorKind::Canceled,
            ServerError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Whether the retry loop may attempt the call again. Circuit-open is
    /// terminal: it must not consume retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            ServerError::Upstream { transient, .. } => *transient,
            ServerError::Timeout { .. } | ServerError::Overloaded { .. } => true,
            _ => false,
        }
    }

    /// Advisory retry-after for resilience outcomes, in seconds.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ServerError::Overloaded { retry_after_secs }
            | ServerError::CircuitOpen {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            ServerError::Timeout { .. } => Some(1),
            _ => None,
        }
    }

    /// Build the user-visible error body. Cause chains from external stores
    /// are already reduced to a single redacted message; stack traces and
    /// credentials never reach this shape.
    pub fn body(&self) -> ErrorBody {
        let details = match self {
            ServerError::OntologyInvalid(errors) => Some(serde_json::json!({ "errors": errors })),
            ServerError::EffectFailed { predicate, reason }
            | ServerError::PreconditionFailed { predicate, reason } => {
                Some(serde_json::json!({ "predicate": predicate, "reason": reason }))
            }
            _ => None,
        };
        ErrorBody {
            error_code: self.kind(),
            message: self.to_string(),
            retry_after: self.retry_after(),
            details,
        }
    }
}

/// User-visible error shape: `{errorCode, message, retryAfter?, details?}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::SchemaInvalid(err.to_string())
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServerError::NotFound("row not found".into()),
            // Pool exhaustion and dropped connections are worth retrying;
            // constraint violations and syntax errors are not.
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => ServerError::Upstream {
                message: "history store unavailable".into(),
                transient: true,
            },
            other => ServerError::Upstream {
                message: other.to_string(),
                transient: false,
            },
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ServerError::Canceled
        } else {
            ServerError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_kebab_case() {
        let v = serde_json::to_value(ErrorKind::CircuitOpen).unwrap();
        assert_eq!(v, serde_json::json!("circuit-open"));
        assert_eq!(ErrorKind::SchemaInvalid.as_str(), "schema-invalid");
    }

    #[test]
    fn body_carries_retry_after_for_resilience_outcomes() {
        let err = ServerError::CircuitOpen {
            tool: "memory_search".into(),
            retry_after_secs: 30,
        };
        let body = err.body();
        assert_eq!(body.retry_after, Some(30));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["errorCode"], "circuit-open");
        assert_eq!(json["retryAfter"], 30);
    }

    #[test]
    fn circuit_open_is_not_transient() {
        let err = ServerError::CircuitOpen {
            tool: "t".into(),
            retry_after_secs: 1,
        };
        assert!(!err.is_transient());
        assert!(
            ServerError::Upstream {
                message: "503".into(),
                transient: true
            }
            .is_transient()
        );
    }
}

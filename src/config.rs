// src/config.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::warn;

/// Runtime settings loaded once at startup. Every tunable the server uses
/// lives here; nothing reads the environment after load.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind address for the HTTP transport (LIMBO_HTTP_ADDR)
    pub http_addr: String,
    /// Development mode: enables X-Tenant-Id header and default-tenant
    /// fallback (LIMBO_DEV_MODE)
    pub dev_mode: bool,
    /// Fallback tenant, honored only in dev mode (LIMBO_DEFAULT_TENANT)
    pub default_tenant: Option<String>,
    /// Default package when no header/flag overrides (LIMBO_DEFAULT_PACKAGE)
    pub default_package: String,
    /// Default channel when no header/flag overrides (LIMBO_DEFAULT_CHANNEL)
    pub default_channel: String,
    /// HS256 secret for bearer token validation (LIMBO_JWT_SECRET)
    pub jwt_secret: String,
    /// Sqlite connection string for the history store (LIMBO_DATABASE_URL)
    pub database_url: String,
    /// Qdrant endpoint for the vector index (LIMBO_QDRANT_URL)
    pub qdrant_url: String,
    /// Qdrant collection name (LIMBO_QDRANT_COLLECTION)
    pub qdrant_collection: String,
    /// Embedding dimension used by `vector init` (LIMBO_VECTOR_DIM)
    pub vector_dim: u64,

    // Tool pipeline
    /// Global concurrent tool execution bound (LIMBO_MAX_CONCURRENT_TOOLS)
    pub max_concurrent_tools: usize,
    /// How long tools/call waits for a permit before failing with
    /// `overloaded` (LIMBO_PERMIT_ACQUIRE_MS)
    pub permit_acquire_ms: u64,
    /// Default per-tool timeout (LIMBO_TOOL_TIMEOUT_MS)
    pub tool_timeout_ms: u64,
    /// Max retry attempts for retryable tools (LIMBO_RETRY_MAX_ATTEMPTS)
    pub retry_max_attempts: u32,
    /// Backoff base delay (LIMBO_RETRY_BASE_MS)
    pub retry_base_ms: u64,
    /// Backoff ceiling (LIMBO_RETRY_MAX_MS)
    pub retry_max_ms: u64,
    /// Jitter factor: delay is scaled by (1 + U(0, jitter))
    /// (LIMBO_RETRY_JITTER)
    pub retry_jitter: f64,
    /// Consecutive failures before the breaker opens
    /// (LIMBO_BREAKER_FAILURE_THRESHOLD)
    pub breaker_failure_threshold: u32,
    /// Window in which consecutive failures are counted
    /// (LIMBO_BREAKER_SAMPLING_MS)
    pub breaker_sampling_ms: u64,
    /// How long an open breaker rejects calls before a half-open probe
    /// (LIMBO_BREAKER_BREAK_MS)
    pub breaker_break_ms: u64,

    // Chat orchestrator
    /// Per-session event channel capacity (LIMBO_CHANNEL_CAPACITY)
    pub channel_capacity: usize,
    /// Orchestrator ping cadence in seconds (LIMBO_HEARTBEAT_SECS)
    pub heartbeat_secs: u64,
    /// SSE keep-alive cadence in seconds (LIMBO_SSE_KEEPALIVE_SECS)
    pub sse_keepalive_secs: u64,

    // Ontology governance gates
    pub publish_confidence: f64,
    pub publish_complexity: u32,
    pub publish_depth: u32,
    pub propose_confidence: f64,
    pub propose_complexity: u32,
    pub propose_depth: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8080".into(),
            dev_mode: false,
            default_tenant: None,
            default_package: "core".into(),
            default_channel: "main".into(),
            jwt_secret: "limbodancer-dev-secret-change-in-production".into(),
            database_url: "sqlite://limbodancer.db?mode=rwc".into(),
            qdrant_url: "http://127.0.0.1:6334".into(),
            qdrant_collection: "limbo_memory".into(),
            vector_dim: 1536,
            max_concurrent_tools: 32,
            permit_acquire_ms: 250,
            tool_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_ms: 100,
            retry_max_ms: 2_000,
            retry_jitter: 0.25,
            breaker_failure_threshold: 3,
            breaker_sampling_ms: 30_000,
            breaker_break_ms: 30_000,
            channel_capacity: 256,
            heartbeat_secs: 15,
            sse_keepalive_secs: 30,
            publish_confidence: 0.85,
            publish_complexity: 5,
            publish_depth: 4,
            propose_confidence: 0.5,
            propose_complexity: 9,
            propose_depth: 9,
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Settings::default();
        Settings {
            http_addr: read_var("LIMBO_HTTP_ADDR").unwrap_or(d.http_addr),
            dev_mode: parse_bool_env("LIMBO_DEV_MODE").unwrap_or(d.dev_mode),
            default_tenant: read_var("LIMBO_DEFAULT_TENANT"),
            default_package: read_var("LIMBO_DEFAULT_PACKAGE").unwrap_or(d.default_package),
            default_channel: read_var("LIMBO_DEFAULT_CHANNEL").unwrap_or(d.default_channel),
            jwt_secret: read_var("LIMBO_JWT_SECRET").unwrap_or(d.jwt_secret),
            database_url: read_var("LIMBO_DATABASE_URL").unwrap_or(d.database_url),
            qdrant_url: read_var("LIMBO_QDRANT_URL").unwrap_or(d.qdrant_url),
            qdrant_collection: read_var("LIMBO_QDRANT_COLLECTION").unwrap_or(d.qdrant_collection),
            vector_dim: parse_env("LIMBO_VECTOR_DIM").unwrap_or(d.vector_dim),
            max_concurrent_tools: parse_env("LIMBO_MAX_CONCURRENT_TOOLS")
                .unwrap_or(d.max_concurrent_tools),
            permit_acquire_ms: parse_env("LIMBO_PERMIT_ACQUIRE_MS").unwrap_or(d.permit_acquire_ms),
            tool_timeout_ms: parse_env("LIMBO_TOOL_TIMEOUT_MS").unwrap_or(d.tool_timeout_ms),
            retry_max_attempts: parse_env("LIMBO_RETRY_MAX_ATTEMPTS")
                .unwrap_or(d.retry_max_attempts),
            retry_base_ms: parse_env("LIMBO_RETRY_BASE_MS").unwrap_or(d.retry_base_ms),
            retry_max_ms: parse_env("LIMBO_RETRY_MAX_MS").unwrap_or(d.retry_max_ms),
            retry_jitter: parse_env("LIMBO_RETRY_JITTER").unwrap_or(d.retry_jitter),
            breaker_failure_threshold: parse_env("LIMBO_BREAKER_FAILURE_THRESHOLD")
                .unwrap_or(d.breaker_failure_threshold),
            breaker_sampling_ms: parse_env("LIMBO_BREAKER_SAMPLING_MS")
                .unwrap_or(d.breaker_sampling_ms),
            breaker_break_ms: parse_env("LIMBO_BREAKER_BREAK_MS").unwrap_or(d.breaker_break_ms),
            channel_capacity: parse_env("LIMBO_CHANNEL_CAPACITY").unwrap_or(d.channel_capacity),
            heartbeat_secs: parse_env("LIMBO_HEARTBEAT_SECS").unwrap_or(d.heartbeat_secs),
            sse_keepalive_secs: parse_env("LIMBO_SSE_KEEPALIVE_SECS")
                .unwrap_or(d.sse_keepalive_secs),
            publish_confidence: parse_env("LIMBO_PUBLISH_CONFIDENCE")
                .unwrap_or(d.publish_confidence),
            publish_complexity: parse_env("LIMBO_PUBLISH_COMPLEXITY")
                .unwrap_or(d.publish_complexity),
            publish_depth: parse_env("LIMBO_PUBLISH_DEPTH").unwrap_or(d.publish_depth),
            propose_confidence: parse_env("LIMBO_PROPOSE_CONFIDENCE")
                .unwrap_or(d.propose_confidence),
            propose_complexity: parse_env("LIMBO_PROPOSE_COMPLEXITY")
                .unwrap_or(d.propose_complexity),
            propose_depth: parse_env("LIMBO_PROPOSE_DEPTH").unwrap_or(d.propose_depth),
        }
    }
}

/// Read an env var, filtering empty values
fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a typed env var, warning on malformed values
fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = read_var(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Malformed env var, using default");
            None
        }
    }
}

/// Parse a boolean env var: 1/true/yes/on are truthy
fn parse_bool_env(name: &str) -> Option<bool> {
    let raw = read_var(name)?;
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(var = name, value = other, "Malformed boolean env var, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.channel_capacity, 256);
        assert_eq!(s.heartbeat_secs, 15);
        assert_eq!(s.publish_confidence, 0.85);
        assert!(!s.dev_mode);
    }
}

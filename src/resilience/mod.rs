// src/resilience/mod.rs
// Execution pipeline for tools/call: global concurrency bound, per-tool
// circuit breaker, timeout, and retry with jittered backoff. One span
// covers the whole pipeline.

pub mod backoff;
pub mod circuit_breaker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info_span, warn};

use crate::config::Settings;
use crate::error::{Result, ServerError};
use crate::metrics;
use crate::registry::{ToolCallContext, ToolRegistration};

pub use backoff::RetryPolicy;
pub use circuit_breaker::{Admission, CircuitBreaker};

/// Shared resilience state: one executor per server process.
pub struct ResilientExecutor {
    /// FIFO-fair global bound on concurrently executing tools.
    semaphore: Arc<Semaphore>,
    permit_acquire: Duration,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
}

impl ResilientExecutor {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent_tools)),
            permit_acquire: Duration::from_millis(settings.permit_acquire_ms),
            breaker: CircuitBreaker::new(
                settings.breaker_failure_threshold,
                Duration::from_millis(settings.breaker_sampling_ms),
                Duration::from_millis(settings.breaker_break_ms),
            ),
            policy: RetryPolicy::new(
                settings.retry_max_attempts,
                Duration::from_millis(settings.retry_base_ms),
                Duration::from_millis(settings.retry_max_ms),
                settings.retry_jitter,
            ),
        }
    }

    /// Run one tool call through the pipeline. The registration's own
    /// timeout applies per attempt; retries happen only for retryable tools
    /// on transient failures and preserve the correlation id.
    pub async fn execute(
        &self,
        registration: &ToolRegistration,
        ctx: &ToolCallContext,
        args: Value,
    ) -> Result<Value> {
        let span = info_span!(
            "tool_call",
            tool.name = %registration.name,
            tenant.id = %ctx.scope.tenant_id,
            correlation_id = %ctx.correlation_id,
            outcome = tracing::field::Empty,
            attempts = tracing::field::Empty,
        );
        let started = Instant::now();
        let result = self.execute_inner(registration, ctx, args).instrument(span.clone()).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => span.record("outcome", "ok"),
            Err(e) => span.record("outcome", e.kind().as_str()),
        };
        metrics::record_tool_execution(
            &registration.name,
            &ctx.scope.tenant_id,
            result.is_ok(),
            duration_ms,
        );
        result
    }

    async fn execute_inner(
        &self,
        registration: &ToolRegistration,
        ctx: &ToolCallContext,
        args: Value,
    ) -> Result<Value> {
        // Global concurrency bound. Waiters queue FIFO; when the permit
        // does not arrive within the small acquire budget the call is
        // rejected rather than parked unboundedly.
        let permit = match tokio::time::timeout(self.permit_acquire, self.semaphore.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ServerError::Canceled),
            Err(_) => {
                metrics::record_overloaded(&registration.name);
                return Err(ServerError::Overloaded { retry_after_secs: 1 });
            }
        };
        let _permit = permit;

        let max_attempts = if registration.retryable {
            self.policy.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            // The breaker check runs per attempt. A circuit-open result is
            // terminal and consumes no retry budget.
            match self.breaker.admit(&registration.name) {
                Admission::Allowed => {}
                Admission::Rejected { retry_after_secs } => {
                    metrics::record_circuit_open(&registration.name);
                    tracing::Span::current().record("attempts", attempt - 1);
                    return Err(ServerError::CircuitOpen {
                        tool: registration.name.clone(),
                        retry_after_secs,
                    });
                }
            }

            if ctx.cancel.is_cancelled() {
                return Err(ServerError::Canceled);
            }

            let outcome = tokio::select! {
                _ = ctx.cancel.cancelled() => Err(ServerError::Canceled),
                result = tokio::time::timeout(
                    registration.timeout,
                    registration.handler.execute(ctx, args.clone()),
                ) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ServerError::Timeout {
                        tool: registration.name.clone(),
                        after_ms: registration.timeout.as_millis() as u64,
                    }),
                },
            };

            match outcome {
                Ok(value) => {
                    self.breaker.record_success(&registration.name);
                    tracing::Span::current().record("attempts", attempt);
                    return Ok(value);
                }
                Err(err) => {
                    // Only dependency-health failures feed the breaker;
                    // domain results like not-found leave it untouched.
                    match err.kind() {
                        crate::error::ErrorKind::Timeout
                        | crate::error::ErrorKind::UpstreamError
                        | crate::error::ErrorKind::InternalError => {
                            self.breaker.record_failure(&registration.name)
                        }
                        crate::error::ErrorKind::Canceled => {}
                        _ => self.breaker.record_success(&registration.name),
                    }

                    let retryable = registration.retryable
                        && err.is_transient()
                        && attempt < max_attempts
                        && !ctx.cancel.is_cancelled();
                    if !retryable {
                        tracing::Span::current().record("attempts", attempt);
                        return Err(err);
                    }

                    let delay = self.policy.delay(attempt);
                    debug!(
                        tool = %registration.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off before retry"
                    );
                    // Backoff honors cancellation; retries never run
                    // concurrently for the same call.
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => {
                            warn!(tool = %registration.name, "Call canceled during backoff");
                            return Err(ServerError::Canceled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

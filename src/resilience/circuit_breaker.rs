// src/resilience/circuit_breaker.rs
// Per-tool circuit breaker — trips after consecutive failures within the
// sampling window and short-circuits calls while the dependency cools down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Circuit state for a single tool.
#[derive(Debug, Clone)]
enum State {
    /// Normal operation — tracking consecutive failures.
    Closed {
        consecutive: u32,
        first_failure: Option<Instant>,
    },
    /// Tripped — all calls are rejected until the break expires.
    Open { tripped_at: Instant },
    /// Break expired — exactly one probe call is allowed through.
    HalfOpen,
}

impl Default for State {
    fn default() -> Self {
        Self::Closed {
            consecutive: 0,
            first_failure: None,
        }
    }
}

/// Outcome of asking the breaker for permission to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Rejected; advisory seconds until the next probe window.
    Rejected { retry_after_secs: u64 },
}

/// Thread-safe breaker tracking per-tool health.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    sampling_window: Duration,
    break_duration: Duration,
    states: Arc<Mutex<HashMap<String, State>>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, sampling_window: Duration, break_duration: Duration) -> Self {
        Self {
            failure_threshold,
            sampling_window,
            break_duration,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ask whether a call to `tool` may proceed. An Open circuit whose
    /// break has elapsed transitions to HalfOpen and admits one probe.
    pub fn admit(&self, tool: &str) -> Admission {
        let Ok(mut states) = self.states.lock() else {
            return Admission::Allowed; // Poisoned mutex: fail open
        };
        let state = states.entry(tool.to_string()).or_default();

        match state {
            State::Closed { .. } => Admission::Allowed,
            State::Open { tripped_at } => {
                let elapsed = tripped_at.elapsed();
                if elapsed >= self.break_duration {
                    info!(tool, "Circuit half-open, allowing probe call");
                    *state = State::HalfOpen;
                    Admission::Allowed
                } else {
                    let remaining = self.break_duration - elapsed;
                    Admission::Rejected {
                        retry_after_secs: remaining.as_secs().max(1),
                    }
                }
            }
            // A probe is already in flight; block additional callers until
            // it resolves.
            State::HalfOpen => Admission::Rejected {
                retry_after_secs: self.break_duration.as_secs().max(1),
            },
        }
    }

    /// Record a healthy call — resets the circuit to Closed. A successful
    /// half-open probe closes the circuit immediately.
    pub fn record_success(&self, tool: &str) {
        let Ok(mut states) = self.states.lock() else {
            return;
        };
        let state = states.entry(tool.to_string()).or_default();
        let was_half_open = matches!(state, State::HalfOpen);
        *state = State::default();
        if was_half_open {
            info!(tool, "Circuit recovered (half-open probe succeeded)");
        }
    }

    /// Record a failed call — may trip the circuit.
    pub fn record_failure(&self, tool: &str) {
        let Ok(mut states) = self.states.lock() else {
            return;
        };
        let state = states.entry(tool.to_string()).or_default();
        let now = Instant::now();

        match state {
            State::Closed {
                consecutive,
                first_failure,
            } => {
                // Failures older than the sampling window start a new run.
                let window_expired = first_failure
                    .map(|t| now.duration_since(t) >= self.sampling_window)
                    .unwrap_or(false);
                if window_expired {
                    *consecutive = 0;
                    *first_failure = None;
                }
                *consecutive += 1;
                first_failure.get_or_insert(now);

                if *consecutive >= self.failure_threshold {
                    warn!(
                        tool,
                        failures = *consecutive,
                        "Circuit tripped — tool will be skipped for {}ms",
                        self.break_duration.as_millis()
                    );
                    *state = State::Open { tripped_at: now };
                }
            }
            State::HalfOpen => {
                warn!(tool, "Half-open probe failed — circuit re-tripped");
                *state = State::Open { tripped_at: now };
            }
            State::Open { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(30), Duration::from_millis(200))
    }

    #[test]
    fn new_tool_is_admitted() {
        assert_eq!(breaker().admit("history_get"), Admission::Allowed);
    }

    #[test]
    fn below_threshold_does_not_trip() {
        let cb = breaker();
        cb.record_failure("t");
        cb.record_failure("t");
        assert_eq!(cb.admit("t"), Admission::Allowed);
    }

    #[test]
    fn threshold_failures_trip_circuit() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure("t");
        }
        assert!(matches!(cb.admit("t"), Admission::Rejected { .. }));
    }

    #[test]
    fn success_resets_consecutive_count() {
        let cb = breaker();
        cb.record_failure("t");
        cb.record_failure("t");
        cb.record_success("t");
        cb.record_failure("t");
        assert_eq!(cb.admit("t"), Admission::Allowed);
    }

    #[test]
    fn tools_are_independent() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure("memory_search");
        }
        assert!(matches!(cb.admit("memory_search"), Admission::Rejected { .. }));
        assert_eq!(cb.admit("graph_query"), Admission::Allowed);
    }

    #[test]
    fn open_circuit_half_opens_after_break() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(30), Duration::from_millis(10));
        cb.record_failure("t");
        assert!(matches!(cb.admit("t"), Admission::Rejected { .. }));

        std::thread::sleep(Duration::from_millis(15));
        // Break elapsed: one probe allowed, further callers blocked.
        assert_eq!(cb.admit("t"), Admission::Allowed);
        assert!(matches!(cb.admit("t"), Admission::Rejected { .. }));

        cb.record_success("t");
        assert_eq!(cb.admit("t"), Admission::Allowed);
    }

    #[test]
    fn half_open_failure_retrips() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(30), Duration::from_millis(10));
        cb.record_failure("t");
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cb.admit("t"), Admission::Allowed);
        cb.record_failure("t");
        assert!(matches!(cb.admit("t"), Admission::Rejected { .. }));
    }
}

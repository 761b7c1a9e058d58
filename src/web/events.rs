// src/web/events.rs
// SSE event channel: chat events streamed as `event:<type>\ndata:<json>`
// frames, with periodic keep-alive pings.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::chat::ChatEvent;
use crate::metrics;

use super::auth::{ApiError, resolve_request_scope};
use super::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub session_id: Option<String>,
}

/// GET /api/mcp/events — bearer auth. With `sessionId` the stream follows
/// one session; without it, every session the tenant can see.
pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let scope = resolve_request_scope(&state.settings, &headers)?;

    let rx = match &query.session_id {
        Some(session_id) => {
            state
                .orchestrator
                .subscribe(&scope.tenant_id, session_id)
                .await
        }
        None => state.orchestrator.subscribe_all(),
    };

    let tenant_id = scope.tenant_id.clone();
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.settings.sse_keepalive_secs.max(1)))
        .event(Event::default().event("ping").data("{}"));

    let stream = event_stream(rx, tenant_id, query.session_id.is_some());

    Ok((
        [
            ("Cache-Control", "no-store"),
            ("X-Accel-Buffering", "no"),
        ],
        Sse::new(stream).keep_alive(keep_alive),
    ))
}

/// Gauge guard: counts the subscriber for as long as its stream lives,
/// including early disconnects that drop the stream mid-loop.
struct SubscriberGuard;

impl SubscriberGuard {
    fn attach() -> Self {
        metrics::subscriber_attached();
        Self
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        metrics::subscriber_detached();
    }
}

fn event_stream(
    mut rx: broadcast::Receiver<ChatEvent>,
    tenant_id: String,
    session_scoped: bool,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = SubscriberGuard::attach();
    async_stream::stream! {
        let _guard = guard;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    // The server-wide stream mixes tenants; only events
                    // tagged for the subscriber's tenant pass. Session
                    // streams are tenant-checked at subscribe time.
                    if !session_scoped && event.tenant_id != tenant_id {
                        continue;
                    }
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.event_type.as_str()).data(data));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Drop-oldest back-pressure: the subscriber fell behind
                    // and the ring discarded the oldest events.
                    debug!(tenant = %tenant_id, skipped, "SSE subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

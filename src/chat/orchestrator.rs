// src/chat/orchestrator.rs
// Per-session chat orchestration. Each session owns one bounded broadcast
// channel; producer tasks write token streams ending in exactly one
// terminal event per correlation; a heartbeat task pings while subscribers
// are attached. Sessions are keyed by (tenant, session), so cross-tenant
// access is impossible by construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{Result, ServerError};
use crate::stores::history::{HistoryStore, NewMessage};

use super::events::ChatEvent;

/// Turns a user message into the assistant reply and its token chunks.
/// The echo implementation is the placeholder producer; a real LLM client
/// replaces this seam without touching stream plumbing.
pub trait Tokenizer: Send + Sync {
    fn reply(&self, user_text: &str) -> String;
    fn split<'a>(&self, reply: &'a str) -> Vec<&'a str>;
}

/// Echoes the user message back in fixed-size chunks.
pub struct EchoTokenizer {
    pub chunk_size: usize,
}

impl Default for EchoTokenizer {
    fn default() -> Self {
        Self { chunk_size: 8 }
    }
}

impl Tokenizer for EchoTokenizer {
    fn reply(&self, user_text: &str) -> String {
        format!("You said: {user_text}")
    }

    fn split<'a>(&self, reply: &'a str) -> Vec<&'a str> {
        let size = self.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut rest = reply;
        while !rest.is_empty() {
            // Chunk on a char boundary at or below the target size.
            let mut cut = size.min(rest.len());
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            let (head, tail) = rest.split_at(cut);
            chunks.push(head);
            rest = tail;
        }
        chunks
    }
}

/// Session metadata. Lives until process restart or explicit deletion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

struct SessionState {
    session: Session,
    tx: broadcast::Sender<ChatEvent>,
    /// Cancellation token per in-flight correlation.
    in_flight: Mutex<HashMap<String, CancellationToken>>,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

type SessionKey = (String, String);

/// Owns all sessions. One global lock guards session create/destroy only;
/// per-session state is reached through the shared Arc.
pub struct ChatOrchestrator {
    history: Arc<dyn HistoryStore>,
    tokenizer: Arc<dyn Tokenizer>,
    channel_capacity: usize,
    heartbeat_interval: Duration,
    sessions: Mutex<HashMap<SessionKey, Arc<SessionState>>>,
    /// Server-wide fan-out mirroring every session's events, consumed by
    /// the unscoped SSE endpoint.
    global_tx: broadcast::Sender<ChatEvent>,
}

impl ChatOrchestrator {
    pub fn new(settings: &Settings, history: Arc<dyn HistoryStore>) -> Self {
        let (global_tx, _) = broadcast::channel(settings.channel_capacity.max(16));
        Self {
            history,
            tokenizer: Arc::new(EchoTokenizer::default()),
            channel_capacity: settings.channel_capacity.max(16),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_secs.max(1)),
            sessions: Mutex::new(HashMap::new()),
            global_tx,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// The history store this orchestrator appends to.
    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Create a session and its event channel; records it in the history
    /// store so history tools can see it.
    pub async fn create_session(
        &self,
        tenant_id: &str,
        system_prompt: Option<String>,
    ) -> Result<Session> {
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            created_at: Utc::now(),
            system_prompt,
        };
        self.history
            .create_session(
                tenant_id,
                &session.session_id,
                session.system_prompt.as_deref(),
            )
            .await?;

        let (tx, _) = broadcast::channel(self.channel_capacity);
        let heartbeat =
            self.spawn_heartbeat(tenant_id.to_string(), session.session_id.clone(), tx.clone());
        let state = Arc::new(SessionState {
            session: session.clone(),
            tx,
            in_flight: Mutex::new(HashMap::new()),
            heartbeat,
        });

        let key = (tenant_id.to_string(), session.session_id.clone());
        self.sessions.lock().await.insert(key, state);
        debug!(session_id = %session.session_id, tenant = tenant_id, "Session created");
        Ok(session)
    }

    pub async fn delete_session(&self, tenant_id: &str, session_id: &str) -> Result<()> {
        let key = (tenant_id.to_string(), session_id.to_string());
        match self.sessions.lock().await.remove(&key) {
            Some(_) => Ok(()),
            None => Err(ServerError::NotFound(format!("session {session_id:?}"))),
        }
    }

    pub async fn get_session(&self, tenant_id: &str, session_id: &str) -> Option<Session> {
        let key = (tenant_id.to_string(), session_id.to_string());
        self.sessions
            .lock()
            .await
            .get(&key)
            .map(|s| s.session.clone())
    }

    /// Subscribe to a session's event stream. Unknown sessions produce an
    /// empty stream (the channel closes immediately) rather than an error.
    pub async fn subscribe(&self, tenant_id: &str, session_id: &str) -> broadcast::Receiver<ChatEvent> {
        let key = (tenant_id.to_string(), session_id.to_string());
        match self.sessions.lock().await.get(&key) {
            Some(state) => state.tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Subscribe to every session's events (server-wide stream).
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChatEvent> {
        self.global_tx.subscribe()
    }

    /// Ingest a user message: append to history first, then spawn the
    /// producer task. Returns the correlation id tying the produced token
    /// stream to this message.
    pub async fn enqueue(
        &self,
        tenant_id: &str,
        session_id: &str,
        content: String,
    ) -> Result<String> {
        let key = (tenant_id.to_string(), session_id.to_string());
        let state = self
            .sessions
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("session {session_id:?}")))?;

        // User message lands in history before processing starts.
        self.history
            .append_message(NewMessage {
                tenant_id: tenant_id.to_string(),
                session_id: session_id.to_string(),
                sender: "user".into(),
                text: content.clone(),
                metadata: None,
                tool_calls: None,
            })
            .await?;

        let correlation_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        state
            .in_flight
            .lock()
            .await
            .insert(correlation_id.clone(), cancel.clone());

        let producer = ProducerTask {
            history: self.history.clone(),
            tokenizer: self.tokenizer.clone(),
            state: state.clone(),
            global_tx: self.global_tx.clone(),
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            correlation_id: correlation_id.clone(),
            content,
            cancel,
        };
        tokio::spawn(producer.run());

        Ok(correlation_id)
    }

    /// Administrative cancel: flips the producing task's token. The
    /// producer still writes its terminal `error {canceled}` event.
    pub async fn cancel(&self, tenant_id: &str, session_id: &str, correlation_id: &str) -> Result<()> {
        let key = (tenant_id.to_string(), session_id.to_string());
        let state = self
            .sessions
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("session {session_id:?}")))?;
        match state.in_flight.lock().await.get(correlation_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(ServerError::NotFound(format!(
                "correlation {correlation_id:?}"
            ))),
        }
    }

    fn spawn_heartbeat(
        &self,
        tenant_id: String,
        session_id: String,
        tx: broadcast::Sender<ChatEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let interval = self.heartbeat_interval;
        let global_tx = self.global_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately; skip it so pings start one
            // interval after creation.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.receiver_count() == 0 {
                    continue;
                }
                let ping = ChatEvent::ping(&tenant_id, &session_id);
                let _ = global_tx.send(ping.clone());
                if tx.send(ping).is_err() {
                    // All subscribers dropped between the check and the
                    // send; keep ticking for future subscribers.
                    continue;
                }
            }
        })
    }
}

/// One producer per accepted message. Emits token events, persists the
/// assistant message, then writes the terminal event. The terminal event
/// is written on every path, including cancellation and history failure.
struct ProducerTask {
    history: Arc<dyn HistoryStore>,
    tokenizer: Arc<dyn Tokenizer>,
    state: Arc<SessionState>,
    global_tx: broadcast::Sender<ChatEvent>,
    tenant_id: String,
    session_id: String,
    correlation_id: String,
    content: String,
    cancel: CancellationToken,
}

impl ProducerTask {
    fn emit(&self, event: ChatEvent) {
        // Sends are best-effort: with no subscribers attached the channel
        // reports an error, and lagging subscribers drop oldest events.
        let _ = self.global_tx.send(event.clone());
        let _ = self.state.tx.send(event);
    }

    async fn run(self) {
        let reply = self.tokenizer.reply(&self.content);

        let mut canceled = false;
        for chunk in self.tokenizer.split(&reply) {
            if self.cancel.is_cancelled() {
                canceled = true;
                break;
            }
            self.emit(ChatEvent::token(
                &self.tenant_id,
                &self.session_id,
                &self.correlation_id,
                chunk,
            ));
            // Yield between tokens so subscribers interleave with emission.
            tokio::task::yield_now().await;
        }

        let terminal = if canceled {
            ChatEvent::error(
                &self.tenant_id,
                &self.session_id,
                &self.correlation_id,
                "canceled",
                "canceled",
            )
        } else {
            // Assistant message is appended after the last token and
            // before the terminal event.
            match self
                .history
                .append_message(NewMessage {
                    tenant_id: self.tenant_id.clone(),
                    session_id: self.session_id.clone(),
                    sender: "assistant".into(),
                    text: reply.clone(),
                    metadata: None,
                    tool_calls: None,
                })
                .await
            {
                Ok(_) => ChatEvent::completed(
                    &self.tenant_id,
                    &self.session_id,
                    &self.correlation_id,
                    &reply,
                ),
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "Failed to persist assistant message");
                    ChatEvent::error(
                        &self.tenant_id,
                        &self.session_id,
                        &self.correlation_id,
                        e.kind().as_str(),
                        "failed to persist assistant message",
                    )
                }
            }
        };
        self.emit(terminal);

        self.state
            .in_flight
            .lock()
            .await
            .remove(&self.correlation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::events::ChatEventType;
    use crate::stores::history::SqliteHistoryStore;

    async fn orchestrator() -> ChatOrchestrator {
        let history = Arc::new(SqliteHistoryStore::in_memory().await.unwrap());
        ChatOrchestrator::new(&Settings::default(), history)
    }

    async fn collect_until_terminal(
        rx: &mut broadcast::Receiver<ChatEvent>,
        correlation_id: &str,
    ) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("stream timed out")
                .expect("stream closed early");
            if event.event_type == ChatEventType::Ping {
                continue;
            }
            let done = event.is_terminal()
                && event.correlation_id.as_deref() == Some(correlation_id);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn echo_stream_emits_tokens_then_completed() {
        let orch = orchestrator().await;
        let session = orch.create_session("acme", None).await.unwrap();
        let mut rx = orch.subscribe("acme", &session.session_id).await;

        let correlation = orch
            .enqueue("acme", &session.session_id, "hello".into())
            .await
            .unwrap();
        let events = collect_until_terminal(&mut rx, &correlation).await;

        let tokens: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == ChatEventType::Token)
            .map(|e| e.content.clone().unwrap())
            .collect();
        assert_eq!(tokens, vec!["You said", ": hello"]);

        let terminal = events.last().unwrap();
        assert_eq!(terminal.event_type, ChatEventType::MessageCompleted);
        assert_eq!(terminal.content.as_deref(), Some("You said: hello"));
    }

    #[tokio::test]
    async fn history_has_user_then_assistant() {
        let orch = orchestrator().await;
        let session = orch.create_session("acme", None).await.unwrap();
        let mut rx = orch.subscribe("acme", &session.session_id).await;
        let correlation = orch
            .enqueue("acme", &session.session_id, "hi".into())
            .await
            .unwrap();
        collect_until_terminal(&mut rx, &correlation).await;

        let messages = orch
            .history
            .list_messages("acme", &session.session_id, 10, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "user");
        assert_eq!(messages[1].sender, "assistant");
        assert_eq!(messages[1].text, "You said: hi");
    }

    #[tokio::test]
    async fn unknown_session_subscription_is_empty() {
        let orch = orchestrator().await;
        let mut rx = orch.subscribe("acme", "no-such-session").await;
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn enqueue_on_unknown_session_is_not_found() {
        let orch = orchestrator().await;
        let err = orch
            .enqueue("acme", "ghost", "hello".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn sessions_are_tenant_keyed() {
        let orch = orchestrator().await;
        let session = orch.create_session("acme", None).await.unwrap();
        // The same session id under another tenant does not exist.
        assert!(orch.get_session("rival", &session.session_id).await.is_none());
        let err = orch
            .enqueue("rival", &session.session_id, "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn parallel_enqueues_preserve_per_correlation_order() {
        let orch = orchestrator().await;
        let session = orch.create_session("acme", None).await.unwrap();
        let mut rx = orch.subscribe("acme", &session.session_id).await;

        let c1 = orch
            .enqueue("acme", &session.session_id, "first message".into())
            .await
            .unwrap();
        let c2 = orch
            .enqueue("acme", &session.session_id, "second message".into())
            .await
            .unwrap();

        // Drain both correlations; for each, every token precedes its
        // terminal event.
        let mut seen_terminal: HashMap<String, bool> = HashMap::new();
        let mut remaining = 2;
        while remaining > 0 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let Some(correlation) = event.correlation_id.clone() else {
                continue;
            };
            assert!(correlation == c1 || correlation == c2);
            let done = seen_terminal.entry(correlation).or_insert(false);
            assert!(!*done, "event after terminal for same correlation");
            if event.is_terminal() {
                *done = true;
                remaining -= 1;
            }
        }
    }
}

//! Chat stream integration: ordering, heartbeats, cancellation, and the
//! bounded-channel back-pressure policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use limbodancer::chat::{ChatEvent, ChatEventType, ChatOrchestrator};
use limbodancer::config::Settings;
use limbodancer::stores::history::{HistoryStore, SqliteHistoryStore};

async fn orchestrator_with(settings: Settings) -> ChatOrchestrator {
    let history = Arc::new(SqliteHistoryStore::in_memory().await.unwrap());
    ChatOrchestrator::new(&settings, history)
}

async fn next_event(rx: &mut broadcast::Receiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("stream timed out")
        .expect("stream closed")
}

#[tokio::test]
async fn echo_of_hello_streams_two_tokens_then_completed() {
    let orch = orchestrator_with(Settings::default()).await;
    let session = orch.create_session("acme", None).await.unwrap();
    let mut rx = orch.subscribe("acme", &session.session_id).await;

    orch.enqueue("acme", &session.session_id, "hello".into())
        .await
        .unwrap();

    // Exact frame sequence from the echo tokenizer's 8-char chunking.
    let first = next_event(&mut rx).await;
    assert_eq!(first.event_type, ChatEventType::Token);
    assert_eq!(first.content.as_deref(), Some("You said"));

    let second = next_event(&mut rx).await;
    assert_eq!(second.event_type, ChatEventType::Token);
    assert_eq!(second.content.as_deref(), Some(": hello"));

    let terminal = next_event(&mut rx).await;
    assert_eq!(terminal.event_type, ChatEventType::MessageCompleted);
    assert_eq!(terminal.content.as_deref(), Some("You said: hello"));
    assert_eq!(terminal.correlation_id, first.correlation_id);
}

#[tokio::test]
async fn heartbeat_pings_attached_subscribers() {
    let settings = Settings {
        heartbeat_secs: 1,
        ..Settings::default()
    };
    let orch = orchestrator_with(settings).await;
    let session = orch.create_session("acme", None).await.unwrap();
    let mut rx = orch.subscribe("acme", &session.session_id).await;

    let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no ping within heartbeat window")
        .unwrap();
    assert_eq!(event.event_type, ChatEventType::Ping);
    assert_eq!(event.session_id, session.session_id);
}

#[tokio::test]
async fn lagging_subscriber_drops_oldest_but_keeps_terminal() {
    let settings = Settings {
        channel_capacity: 16,
        ..Settings::default()
    };
    let orch = orchestrator_with(settings).await;
    let session = orch.create_session("acme", None).await.unwrap();
    let mut rx = orch.subscribe("acme", &session.session_id).await;

    // ~40 tokens plus the terminal: far more than the 16-slot ring.
    let long_message = "x".repeat(300);
    orch.enqueue("acme", &session.session_id, long_message)
        .await
        .unwrap();

    // Let the producer finish while the subscriber sleeps.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut lagged = false;
    let mut last = None;
    loop {
        match rx.try_recv() {
            Ok(event) => last = Some(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => lagged = true,
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }

    assert!(lagged, "subscriber should have lagged past the ring");
    // The newest event survives the drop-oldest policy, and the newest
    // event for a finished correlation is its terminal.
    let last = last.expect("no events received");
    assert_eq!(last.event_type, ChatEventType::MessageCompleted);
}

#[tokio::test]
async fn cancel_produces_terminal_canceled_error() {
    // Tokenizer with a huge reply keeps the producer busy long enough for
    // the cancel to land mid-stream.
    struct SlowEcho;
    impl limbodancer::chat::Tokenizer for SlowEcho {
        fn reply(&self, user_text: &str) -> String {
            format!("You said: {user_text}").repeat(5000)
        }
        fn split<'a>(&self, reply: &'a str) -> Vec<&'a str> {
            reply.as_bytes().chunks(8).map(|c| std::str::from_utf8(c).unwrap()).collect()
        }
    }

    let history = Arc::new(SqliteHistoryStore::in_memory().await.unwrap());
    let orch = ChatOrchestrator::new(&Settings::default(), history)
        .with_tokenizer(Arc::new(SlowEcho));
    let session = orch.create_session("acme", None).await.unwrap();
    let mut rx = orch.subscribe("acme", &session.session_id).await;

    let correlation = orch
        .enqueue("acme", &session.session_id, "stop me".into())
        .await
        .unwrap();
    orch.cancel("acme", &session.session_id, &correlation)
        .await
        .unwrap();

    // Drain until the terminal; it must be the canceled error.
    let terminal = loop {
        match rx.recv().await {
            Ok(event) if event.is_terminal() => break event,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("closed before terminal"),
        }
    };
    assert_eq!(terminal.event_type, ChatEventType::Error);
    assert_eq!(terminal.error_code.as_deref(), Some("canceled"));
    assert_eq!(terminal.correlation_id.as_deref(), Some(correlation.as_str()));
}

#[tokio::test]
async fn subscriber_disconnect_does_not_cancel_the_producer() {
    let orch = orchestrator_with(Settings::default()).await;
    let session = orch.create_session("acme", None).await.unwrap();

    let rx = orch.subscribe("acme", &session.session_id).await;
    orch.enqueue("acme", &session.session_id, "persist anyway".into())
        .await
        .unwrap();
    drop(rx);

    // The producer still runs to completion and persists the assistant
    // reply.
    let history = {
        let mut messages = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            messages = orch
                .history()
                .list_messages("acme", &session.session_id, 10, None)
                .await
                .unwrap();
            if messages.len() == 2 {
                break;
            }
        }
        messages
    };
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].sender, "assistant");
}

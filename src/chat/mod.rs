// src/chat/mod.rs
// Session streaming: bounded per-session event channels with heartbeats,
// ordered token delivery, and cancellation.

pub mod events;
pub mod orchestrator;

pub use events::{ChatEvent, ChatEventType};
pub use orchestrator::{ChatOrchestrator, EchoTokenizer, Session, Tokenizer};

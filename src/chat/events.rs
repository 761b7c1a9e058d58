// src/chat/events.rs
// Events flowing through a session's stream to SSE subscribers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatEventType {
    #[serde(rename = "token")]
    Token,
    #[serde(rename = "message.completed")]
    MessageCompleted,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "ping")]
    Ping,
}

impl ChatEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatEventType::Token => "token",
            ChatEventType::MessageCompleted => "message.completed",
            ChatEventType::Error => "error",
            ChatEventType::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub event_type: ChatEventType,
    /// Routing key for tenant filtering on fan-out; never serialized to
    /// subscribers.
    #[serde(skip)]
    pub tenant_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ChatEvent {
    pub fn token(tenant_id: &str, session_id: &str, correlation_id: &str, content: &str) -> Self {
        Self {
            event_type: ChatEventType::Token,
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            content: Some(content.to_string()),
            correlation_id: Some(correlation_id.to_string()),
            error_code: None,
            error_message: None,
        }
    }

    pub fn completed(
        tenant_id: &str,
        session_id: &str,
        correlation_id: &str,
        content: &str,
    ) -> Self {
        Self {
            event_type: ChatEventType::MessageCompleted,
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            content: Some(content.to_string()),
            correlation_id: Some(correlation_id.to_string()),
            error_code: None,
            error_message: None,
        }
    }

    pub fn error(
        tenant_id: &str,
        session_id: &str,
        correlation_id: &str,
        code: &str,
        message: &str,
    ) -> Self {
        Self {
            event_type: ChatEventType::Error,
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            content: None,
            correlation_id: Some(correlation_id.to_string()),
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
        }
    }

    pub fn ping(tenant_id: &str, session_id: &str) -> Self {
        Self {
            event_type: ChatEventType::Ping,
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            content: None,
            correlation_id: None,
            error_code: None,
            error_message: None,
        }
    }

    /// Terminal events end a correlation's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            ChatEventType::MessageCompleted | ChatEventType::Error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_with_dotted_name() {
        let event = ChatEvent::completed("t", "s", "c", "done");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message.completed");
        assert_eq!(json["sessionId"], "s");
        // The routing tenant never reaches subscribers.
        assert!(json.get("tenantId").is_none());
    }

    #[test]
    fn ping_omits_correlation() {
        let json = serde_json::to_value(ChatEvent::ping("t", "s")).unwrap();
        assert_eq!(json["type"], "ping");
        assert!(json.get("correlationId").is_none());
    }
}

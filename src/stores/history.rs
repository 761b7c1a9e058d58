// src/stores/history.rs
// Tenant-scoped chat history store backed by sqlite via sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// A message to append.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub tenant_id: String,
    pub session_id: String,
    pub sender: String,
    pub text: String,
    pub metadata: Option<serde_json::Value>,
    pub tool_calls: Option<serde_json::Value>,
}

/// A stored message as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// History persistence contract. All operations are tenant-scoped: a
/// session belongs to exactly one tenant and is invisible to every other.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create_session(
        &self,
        tenant_id: &str,
        session_id: &str,
        system_prompt: Option<&str>,
    ) -> Result<()>;

    async fn session_exists(&self, tenant_id: &str, session_id: &str) -> Result<bool>;

    /// Append a message; returns the stored id and timestamp.
    async fn append_message(&self, message: NewMessage) -> Result<StoredMessage>;

    /// Messages for a session in ascending timestamp order. `before`
    /// filters to messages strictly older than the cursor.
    async fn list_messages(
        &self,
        tenant_id: &str,
        session_id: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredMessage>>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> Result<()>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT NOT NULL,
    tenant_id     TEXT NOT NULL,
    system_prompt TEXT,
    created_at    TEXT NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY,
    tenant_id  TEXT NOT NULL,
    session_id TEXT NOT NULL,
    sender     TEXT NOT NULL,
    content    TEXT NOT NULL,
    metadata   TEXT,
    tool_calls TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session
    ON messages (tenant_id, session_id, created_at);
"#;

/// Sqlite-backed history store.
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Shared in-memory database, used by tests and `--stdio` smoke runs.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the schema. Idempotent; `db migrate` calls this.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage> {
        let metadata: Option<String> = row.get("metadata");
        let created_at: String = row.get("created_at");
        Ok(StoredMessage {
            id: row.get("id"),
            session_id: row.get("session_id"),
            sender: row.get("sender"),
            text: row.get("content"),
            timestamp: created_at
                .parse()
                .map_err(|e| ServerError::Internal(format!("bad timestamp in store: {e}")))?,
            metadata: metadata
                .map(|m| serde_json::from_str(&m))
                .transpose()
                .unwrap_or(None),
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn create_session(
        &self,
        tenant_id: &str,
        session_id: &str,
        system_prompt: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO sessions (id, tenant_id, system_prompt, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(tenant_id)
        .bind(system_prompt)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_exists(&self, tenant_id: &str, session_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM sessions WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn append_message(&self, message: NewMessage) -> Result<StoredMessage> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO messages (id, tenant_id, session_id, sender, content, metadata, tool_calls, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&id)
        .bind(&message.tenant_id)
        .bind(&message.session_id)
        .bind(&message.sender)
        .bind(&message.text)
        .bind(metadata_json)
        .bind(tool_calls_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(StoredMessage {
            id,
            session_id: message.session_id,
            sender: message.sender,
            text: message.text,
            timestamp: now,
            metadata: message.metadata,
        })
    }

    async fn list_messages(
        &self,
        tenant_id: &str,
        session_id: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredMessage>> {
        let rows = match before {
            Some(cursor) => {
                sqlx::query(
                    "SELECT id, session_id, sender, content, metadata, created_at
                     FROM messages
                     WHERE tenant_id = ?1 AND session_id = ?2 AND created_at < ?3
                     ORDER BY created_at ASC
                     LIMIT ?4",
                )
                .bind(tenant_id)
                .bind(session_id)
                .bind(cursor.to_rfc3339())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, session_id, sender, content, metadata, created_at
                     FROM messages
                     WHERE tenant_id = ?1 AND session_id = ?2
                     ORDER BY created_at ASC
                     LIMIT ?3",
                )
                .bind(tenant_id)
                .bind(session_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteHistoryStore {
        SqliteHistoryStore::in_memory().await.unwrap()
    }

    fn msg(tenant: &str, session: &str, text: &str) -> NewMessage {
        NewMessage {
            tenant_id: tenant.into(),
            session_id: session.into(),
            sender: "user".into(),
            text: text.into(),
            metadata: None,
            tool_calls: None,
        }
    }

    #[tokio::test]
    async fn append_then_list_returns_message_last() {
        let store = store().await;
        store.create_session("acme", "s1", None).await.unwrap();
        store.append_message(msg("acme", "s1", "first")).await.unwrap();
        let appended = store
            .append_message(msg("acme", "s1", "second"))
            .await
            .unwrap();

        let messages = store.list_messages("acme", "s1", 10, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.last().unwrap().id, appended.id);
        assert!(messages[0].timestamp <= messages[1].timestamp);
    }

    #[tokio::test]
    async fn foreign_tenant_sees_nothing() {
        let store = store().await;
        store.create_session("acme", "s1", None).await.unwrap();
        store.append_message(msg("acme", "s1", "secret")).await.unwrap();

        assert!(!store.session_exists("rival", "s1").await.unwrap());
        let messages = store.list_messages("rival", "s1", 10, None).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn before_cursor_filters_newer_messages() {
        let store = store().await;
        store.create_session("acme", "s1", None).await.unwrap();
        let first = store.append_message(msg("acme", "s1", "old")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append_message(msg("acme", "s1", "new")).await.unwrap();

        let cutoff = first.timestamp + chrono::Duration::milliseconds(1);
        let messages = store
            .list_messages("acme", "s1", 10, Some(cutoff))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "old");
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("history.db").display()
        );
        let store = SqliteHistoryStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        store.create_session("acme", "s1", None).await.unwrap();
        store.append_message(msg("acme", "s1", "durable")).await.unwrap();
        drop(store);

        let reopened = SqliteHistoryStore::connect(&url).await.unwrap();
        let messages = reopened.list_messages("acme", "s1", 10, None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "durable");
    }

    #[tokio::test]
    async fn metadata_round_trips() {
        let store = store().await;
        store.create_session("acme", "s1", None).await.unwrap();
        let mut message = msg("acme", "s1", "with meta");
        message.metadata = Some(serde_json::json!({ "origin": "test" }));
        store.append_message(message).await.unwrap();

        let messages = store.list_messages("acme", "s1", 10, None).await.unwrap();
        assert_eq!(
            messages[0].metadata,
            Some(serde_json::json!({ "origin": "test" }))
        );
    }
}

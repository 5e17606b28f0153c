use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info};

use super::models::{
    ChatSessionRecord, HistoryStats, MessageRole, NewMessage, StoredMessage,
};
use super::store::ChatHistoryStore;
use super::DbPool;
use crate::models::chat::{ResponseType, SourceRef, DEFAULT_USER_ID};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS tbl_chat_sessions (
        session_id      TEXT PRIMARY KEY,
        user_id         TEXT NOT NULL,
        total_messages  BIGINT NOT NULL DEFAULT 0,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS tbl_chat_messages (
        message_id      BIGSERIAL PRIMARY KEY,
        session_id      TEXT NOT NULL REFERENCES tbl_chat_sessions(session_id) ON DELETE CASCADE,
        role            TEXT NOT NULL,
        content         TEXT NOT NULL,
        sources         JSONB NOT NULL DEFAULT '[]'::jsonb,
        response_type   TEXT,
        processing_time TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON tbl_chat_messages (session_id, message_id)",
    "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON tbl_chat_sessions (user_id, updated_at DESC)",
];

#[derive(FromRow)]
struct MessageRow {
    role: String,
    content: String,
    sources: Json<Vec<SourceRef>>,
    response_type: Option<String>,
    processing_time: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            role: MessageRole::parse(&row.role),
            content: row.content,
            sources: row.sources.0,
            response_type: row.response_type.as_deref().and_then(parse_response_type),
            processing_time: row.processing_time,
            timestamp: row.created_at,
        }
    }
}

fn parse_response_type(value: &str) -> Option<ResponseType> {
    match value {
        "direct" => Some(ResponseType::Direct),
        "search" => Some(ResponseType::Search),
        _ => None,
    }
}

/// Escape LIKE wildcards so user text matches literally
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Postgres-backed chat history
pub struct PgChatHistoryStore {
    pool: DbPool,
}

impl PgChatHistoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(self.pool.get_pool()).await?;
        }
        info!("Chat history schema ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatHistoryStore for PgChatHistoryStore {
    async fn find_or_create_session(&self, session_id: &str, user_id: &str) -> Result<ChatSessionRecord> {
        let record = sqlx::query_as::<_, ChatSessionRecord>(
            r#"INSERT INTO tbl_chat_sessions (session_id, user_id)
               VALUES ($1, $2)
               ON CONFLICT (session_id) DO UPDATE SET session_id = EXCLUDED.session_id
               RETURNING session_id, user_id, total_messages, created_at, updated_at"#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(record)
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<StoredMessage> {
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query(
            r#"INSERT INTO tbl_chat_sessions (session_id, user_id)
               VALUES ($1, $2)
               ON CONFLICT (session_id) DO NOTHING"#,
        )
        .bind(session_id)
        .bind(DEFAULT_USER_ID)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, MessageRow>(
            r#"INSERT INTO tbl_chat_messages
                (session_id, role, content, sources, response_type, processing_time)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING role, content, sources, response_type, processing_time, created_at"#,
        )
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(message.bounded_content())
        .bind(Json(&message.sources))
        .bind(message.response_type.map(|t| t.as_str()))
        .bind(message.processing_time.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE tbl_chat_sessions
               SET total_messages = total_messages + 1, updated_at = NOW()
               WHERE session_id = $1"#,
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Stored {} message for session {}", message.role.as_str(), session_id);

        Ok(row.into())
    }

    async fn get_recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT role, content, sources, response_type, processing_time, created_at
               FROM (
                   SELECT message_id, role, content, sources, response_type, processing_time, created_at
                   FROM tbl_chat_messages
                   WHERE session_id = $1
                   ORDER BY message_id DESC
                   LIMIT $2
               ) recent
               ORDER BY message_id ASC"#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSessionRecord>> {
        let record = sqlx::query_as::<_, ChatSessionRecord>(
            r#"SELECT session_id, user_id, total_messages, created_at, updated_at
               FROM tbl_chat_sessions
               WHERE session_id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(record)
    }

    async fn list_user_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<ChatSessionRecord>> {
        let records = sqlx::query_as::<_, ChatSessionRecord>(
            r#"SELECT session_id, user_id, total_messages, created_at, updated_at
               FROM tbl_chat_sessions
               WHERE user_id = $1
               ORDER BY updated_at DESC
               LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(records)
    }

    async fn search_messages(&self, session_id: &str, text: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT role, content, sources, response_type, processing_time, created_at
               FROM (
                   SELECT message_id, role, content, sources, response_type, processing_time, created_at
                   FROM tbl_chat_messages
                   WHERE session_id = $1 AND content ILIKE $2
                   ORDER BY message_id DESC
                   LIMIT $3
               ) matched
               ORDER BY message_id ASC"#,
        )
        .bind(session_id)
        .bind(like_pattern(text))
        .bind(limit as i64)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tbl_chat_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_older_than(&self, age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(age)?;
        let result = sqlx::query("DELETE FROM tbl_chat_sessions WHERE updated_at < $1")
            .bind(cutoff)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<HistoryStats> {
        let (total_sessions, active_sessions): (i64, i64) = sqlx::query_as(
            r#"SELECT
                   COUNT(*),
                   COUNT(*) FILTER (WHERE updated_at > NOW() - INTERVAL '24 hours')
               FROM tbl_chat_sessions"#,
        )
        .fetch_one(self.pool.get_pool())
        .await?;

        let total_messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tbl_chat_messages")
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(HistoryStats {
            total_sessions,
            total_messages,
            active_sessions,
            timestamp: Utc::now(),
        })
    }
}

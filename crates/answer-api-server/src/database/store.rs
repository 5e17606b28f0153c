use anyhow::Result;
use std::time::Duration;

use super::models::{ChatSessionRecord, HistoryStats, NewMessage, StoredMessage};

/// Durable chat-history store; the source of truth for conversations.
///
/// Writes for one session are assumed to be serialized by the storage layer.
#[async_trait::async_trait]
pub trait ChatHistoryStore: Send + Sync {
    async fn find_or_create_session(&self, session_id: &str, user_id: &str) -> Result<ChatSessionRecord>;

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<StoredMessage>;

    /// Last `limit` messages in chronological order
    async fn get_recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSessionRecord>>;

    /// Sessions of a user, most recently updated first
    async fn list_user_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<ChatSessionRecord>>;

    /// Case-insensitive substring search, last `limit` matches in order
    async fn search_messages(&self, session_id: &str, text: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Delete sessions not updated within `age`; returns how many were removed
    async fn cleanup_older_than(&self, age: Duration) -> Result<u64>;

    async fn stats(&self) -> Result<HistoryStats>;
}

/// Store whose every call fails, for exercising degraded paths
#[cfg(test)]
pub(crate) struct UnavailableStore;

#[cfg(test)]
#[async_trait::async_trait]
impl ChatHistoryStore for UnavailableStore {
    async fn find_or_create_session(&self, _session_id: &str, _user_id: &str) -> Result<ChatSessionRecord> {
        anyhow::bail!("database unavailable")
    }

    async fn append_message(&self, _session_id: &str, _message: NewMessage) -> Result<StoredMessage> {
        anyhow::bail!("database unavailable")
    }

    async fn get_recent_messages(&self, _session_id: &str, _limit: usize) -> Result<Vec<StoredMessage>> {
        anyhow::bail!("database unavailable")
    }

    async fn get_session(&self, _session_id: &str) -> Result<Option<ChatSessionRecord>> {
        anyhow::bail!("database unavailable")
    }

    async fn list_user_sessions(&self, _user_id: &str, _limit: usize) -> Result<Vec<ChatSessionRecord>> {
        anyhow::bail!("database unavailable")
    }

    async fn search_messages(&self, _session_id: &str, _text: &str, _limit: usize) -> Result<Vec<StoredMessage>> {
        anyhow::bail!("database unavailable")
    }

    async fn delete_session(&self, _session_id: &str) -> Result<bool> {
        anyhow::bail!("database unavailable")
    }

    async fn cleanup_older_than(&self, _age: Duration) -> Result<u64> {
        anyhow::bail!("database unavailable")
    }

    async fn stats(&self) -> Result<HistoryStats> {
        anyhow::bail!("database unavailable")
    }
}

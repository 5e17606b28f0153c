use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::database::models::{
    ChatHistory, ChatSessionRecord, HistoryStats, NewMessage, SessionSummary, StoredMessage, TurnRecord,
};
use crate::database::ChatHistoryStore;
use crate::services::context_cache::{CacheStats, ContextCache};

/// Durable chat history fronted by the context cache
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn ChatHistoryStore>,
    cache: ContextCache,
}

impl HistoryService {
    pub fn new(store: Arc<dyn ChatHistoryStore>, cache: ContextCache) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn ensure_session(&self, session_id: &str, user_id: &str) -> Result<ChatSessionRecord> {
        if let Some(meta) = self.cache.get_session_meta(session_id) {
            return Ok(meta);
        }

        let record = self.store.find_or_create_session(session_id, user_id).await?;
        self.cache.set_session_meta(session_id, record.clone());
        Ok(record)
    }

    /// Persist one user/assistant exchange, then drop stale cached views
    pub async fn save_turn(&self, turn: &TurnRecord) -> Result<()> {
        self.ensure_session(&turn.session_id, &turn.user_id).await?;

        self.store
            .append_message(&turn.session_id, NewMessage::user(&turn.query))
            .await?;
        self.store
            .append_message(
                &turn.session_id,
                NewMessage::assistant(
                    &turn.answer,
                    turn.sources.clone(),
                    turn.response_type,
                    Some(turn.processing_time.clone()),
                ),
            )
            .await?;

        self.cache.invalidate_session(&turn.session_id);
        info!("Saved conversation for session: {}", turn.session_id);
        Ok(())
    }

    /// Last `limit` messages rendered as `Human:` / `Assistant:` lines
    pub async fn get_conversation_context(&self, session_id: &str, limit: usize) -> Result<String> {
        if let Some(context) = self.cache.get_context(session_id, limit) {
            debug!("Context cache hit for session {}", session_id);
            return Ok(context);
        }

        let messages = self.store.get_recent_messages(session_id, limit).await?;
        let context = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.speaker(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        self.cache.set_context(session_id, limit, context.clone());
        Ok(context)
    }

    pub async fn get_recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        if let Some(messages) = self.cache.get_messages(session_id, limit) {
            return Ok(messages);
        }

        let messages = self.store.get_recent_messages(session_id, limit).await?;
        self.cache.set_messages(session_id, limit, messages.clone());
        Ok(messages)
    }

    pub async fn get_chat_history(&self, session_id: &str, limit: usize) -> Result<ChatHistory> {
        let session = match self.cache.get_session_meta(session_id) {
            Some(meta) => Some(meta),
            None => self.store.get_session(session_id).await?,
        };

        let Some(session) = session else {
            return Ok(ChatHistory::empty(session_id));
        };
        self.cache.set_session_meta(session_id, session.clone());

        let messages = self.get_recent_messages(session_id, limit).await?;
        Ok(ChatHistory {
            session_id: session.session_id,
            user_id: Some(session.user_id),
            messages,
            total_messages: session.total_messages,
            created_at: Some(session.created_at),
            last_activity: Some(session.updated_at),
        })
    }

    pub async fn search_messages(&self, session_id: &str, text: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        self.store.search_messages(session_id, text, limit).await
    }

    pub async fn list_user_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        let sessions = self.store.list_user_sessions(user_id, limit).await?;
        Ok(sessions.into_iter().map(SessionSummary::from).collect())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = self.store.delete_session(session_id).await?;
        self.cache.invalidate_session(session_id);

        if deleted {
            info!("Deleted chat history for session: {}", session_id);
        }
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<HistoryStats> {
        self.store.stats().await
    }

    pub async fn cleanup_older_than(&self, age: Duration) -> Result<u64> {
        let removed = self.store.cleanup_older_than(age).await?;
        if removed > 0 {
            // cached views may reference removed sessions
            self.cache.clear();
            info!("Cleaned up {} old chat sessions", removed);
        }
        Ok(removed)
    }

    pub fn spawn_retention_sweeper(self, retention: Duration, every: Duration) -> JoinHandle<()> {
        info!(
            "Starting chat history retention sweep (retention: {:?}, interval: {:?})",
            retention, every
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.cleanup_older_than(retention).await {
                    Ok(_) => {}
                    Err(e) => error!("Chat history retention sweep failed: {:#}", e),
                }
            }
        })
    }

    /// Context for prompts; store failures degrade to an empty transcript
    pub async fn context_or_empty(&self, session_id: &str, limit: usize) -> String {
        match self.get_conversation_context(session_id, limit).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Could not load conversation history for {}: {:#}", session_id, e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryChatHistoryStore;
    use crate::models::chat::{ResponseType, SourceRef};

    fn service() -> HistoryService {
        let cache = ContextCache::new(Duration::from_secs(300), Duration::from_secs(600), 100);
        HistoryService::new(Arc::new(InMemoryChatHistoryStore::new()), cache)
    }

    fn turn(session_id: &str, query: &str, answer: &str) -> TurnRecord {
        TurnRecord {
            session_id: session_id.to_string(),
            user_id: "anonymous".to_string(),
            query: query.to_string(),
            answer: answer.to_string(),
            sources: vec![SourceRef { title: "T".into(), url: "https://t.test".into() }],
            response_type: ResponseType::Search,
            processing_time: "5ms (web search performed)".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_turn_invalidates_cached_context() {
        let service = service();
        assert_eq!(service.get_conversation_context("s1", 10).await.unwrap(), "");

        service.save_turn(&turn("s1", "q1", "a1")).await.unwrap();

        let context = service.get_conversation_context("s1", 10).await.unwrap();
        assert_eq!(context, "Human: q1\nAssistant: a1");
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order() {
        let service = service();
        let n = 6;
        for i in 0..n {
            service.save_turn(&turn("s1", &format!("q{i}"), &format!("a{i}"))).await.unwrap();
        }

        let messages = service.get_recent_messages("s1", 2 * n).await.unwrap();
        assert_eq!(messages.len(), 2 * n);
        for i in 0..n {
            assert_eq!(messages[2 * i].content, format!("q{i}"));
            assert_eq!(messages[2 * i + 1].content, format!("a{i}"));
        }
        assert_eq!(messages[1].response_type, Some(ResponseType::Search));
    }

    #[tokio::test]
    async fn test_chat_history_for_unknown_session_is_empty() {
        let service = service();
        let history = service.get_chat_history("nope", 50).await.unwrap();
        assert!(history.messages.is_empty());
        assert!(history.created_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_session_drops_cache() {
        let service = service();
        service.save_turn(&turn("s1", "q", "a")).await.unwrap();
        service.get_conversation_context("s1", 10).await.unwrap();

        assert!(service.delete_session("s1").await.unwrap());
        assert_eq!(service.get_conversation_context("s1", 10).await.unwrap(), "");
        assert!(!service.delete_session("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_sessions_and_stats() {
        let service = service();
        service.save_turn(&turn("s1", "q", "a")).await.unwrap();
        service.save_turn(&turn("s2", "q", "a")).await.unwrap();

        let sessions = service.list_user_sessions("anonymous", 20).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].total_messages, 2);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_messages, 4);
    }
}

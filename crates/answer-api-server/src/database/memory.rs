use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;

use super::models::{ChatSessionRecord, HistoryStats, NewMessage, StoredMessage};
use super::store::ChatHistoryStore;
use crate::models::chat::DEFAULT_USER_ID;

struct StoredSession {
    record: ChatSessionRecord,
    messages: Vec<StoredMessage>,
}

/// Process-local chat history, used when no database is configured
#[derive(Default)]
pub struct InMemoryChatHistoryStore {
    sessions: DashMap<String, StoredSession>,
}

impl InMemoryChatHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn last_n(messages: impl DoubleEndedIterator<Item = StoredMessage>, limit: usize) -> Vec<StoredMessage> {
    let mut tail: Vec<StoredMessage> = messages.rev().take(limit).collect();
    tail.reverse();
    tail
}

#[async_trait::async_trait]
impl ChatHistoryStore for InMemoryChatHistoryStore {
    async fn find_or_create_session(&self, session_id: &str, user_id: &str) -> Result<ChatSessionRecord> {
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| StoredSession {
                record: ChatSessionRecord::new(session_id, user_id),
                messages: Vec::new(),
            });

        Ok(entry.record.clone())
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<StoredMessage> {
        let now = Utc::now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| StoredSession {
                record: ChatSessionRecord::new(session_id, DEFAULT_USER_ID),
                messages: Vec::new(),
            });

        let stored = StoredMessage {
            role: message.role,
            content: message.bounded_content(),
            sources: message.sources,
            response_type: message.response_type,
            processing_time: message.processing_time,
            timestamp: now,
        };

        entry.messages.push(stored.clone());
        entry.record.total_messages += 1;
        entry.record.updated_at = now;

        Ok(stored)
    }

    async fn get_recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|entry| last_n(entry.messages.iter().cloned(), limit))
            .unwrap_or_default())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSessionRecord>> {
        Ok(self.sessions.get(session_id).map(|entry| entry.record.clone()))
    }

    async fn list_user_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<ChatSessionRecord>> {
        let mut records: Vec<ChatSessionRecord> = self
            .sessions
            .iter()
            .filter(|entry| entry.record.user_id == user_id)
            .map(|entry| entry.record.clone())
            .collect();

        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn search_messages(&self, session_id: &str, text: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let needle = text.to_lowercase();
        Ok(self
            .sessions
            .get(session_id)
            .map(|entry| {
                let matches: Vec<StoredMessage> = entry
                    .messages
                    .iter()
                    .filter(|m| m.content.to_lowercase().contains(&needle))
                    .cloned()
                    .collect();
                last_n(matches.into_iter(), limit)
            })
            .unwrap_or_default())
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.remove(session_id).is_some())
    }

    async fn cleanup_older_than(&self, age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(age)?;
        let start_len = self.sessions.len();
        self.sessions.retain(|_, session| session.record.updated_at > cutoff);
        Ok(start_len.saturating_sub(self.sessions.len()) as u64)
    }

    async fn stats(&self) -> Result<HistoryStats> {
        let active_cutoff = Utc::now() - chrono::Duration::hours(24);
        let mut total_messages = 0;
        let mut active_sessions = 0;

        for entry in self.sessions.iter() {
            total_messages += entry.messages.len() as i64;
            if entry.record.updated_at > active_cutoff {
                active_sessions += 1;
            }
        }

        Ok(HistoryStats {
            total_sessions: self.sessions.len() as i64,
            total_messages,
            active_sessions,
            timestamp: Utc::now(),
        })
    }
}

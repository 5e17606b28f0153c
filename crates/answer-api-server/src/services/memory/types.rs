use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub query: String,
    pub response: String,
}

/// Ordered transcript rendered as a single `history` blob for prompts.
///
/// Immutable once shared: appends produce a new buffer, rotation swaps in
/// an empty one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationBuffer {
    turns: Vec<Turn>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn with_turn(&self, query: &str, response: &str) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        turns.extend_from_slice(&self.turns);
        turns.push(Turn {
            query: query.to_string(),
            response: response.to_string(),
        });
        Self { turns }
    }

    pub fn history(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("Human: {}\nAI: {}", t.query, t.response))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-session state held by the memory store
#[derive(Debug, Clone)]
pub struct SessionMemory {
    pub buffer: Arc<ConversationBuffer>,
    /// Turns recorded since the last rotation
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl SessionMemory {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            buffer: Arc::new(ConversationBuffer::new()),
            message_count: 0,
            created_at: now,
            last_accessed: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_accessed > max_age
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub message_count: usize,
    pub last_accessed: DateTime<Utc>,
    pub has_memory: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub active_sessions: usize,
    pub sessions: Vec<SessionInfo>,
}

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{ConversationBuffer, MemoryStats, SessionInfo, SessionMemory};

/// Bounded conversational memory keyed by session id.
///
/// None of these operations fail: memory problems only degrade context.
pub trait SessionMemoryStore: Send + Sync {
    /// Snapshot of the session buffer, creating the session on miss
    fn get_or_create(&self, session_id: &str) -> Arc<ConversationBuffer>;

    /// Record a turn; rotates in the same step when the ceiling is crossed.
    /// Returns true when the append triggered a rotation.
    fn append(&self, session_id: &str, query: &str, answer: &str) -> bool;

    fn rotate_if_oversize(&self, session_id: &str) -> bool;

    /// Drop sessions idle for longer than the configured max age
    fn evict_stale(&self, now: DateTime<Utc>) -> usize;

    fn delete(&self, session_id: &str) -> bool;

    fn info(&self, session_id: &str) -> Option<SessionInfo>;

    fn stats(&self) -> MemoryStats;

    fn clear(&self);
}

#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, SessionMemory>>,
    max_memory_size: usize,
    max_age: chrono::Duration,
}

impl InMemorySessionStore {
    pub fn new(max_memory_size: usize, max_age: chrono::Duration) -> Self {
        info!(
            "Initializing session memory store (max_memory_size={}, max_age={}h)",
            max_memory_size,
            max_age.num_hours()
        );
        Self {
            sessions: Arc::new(DashMap::new()),
            max_memory_size,
            max_age,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn rotate_locked(&self, session_id: &str, memory: &mut SessionMemory) -> bool {
        if memory.message_count <= self.max_memory_size {
            return false;
        }

        memory.buffer = Arc::new(ConversationBuffer::new());
        memory.message_count = 0;
        info!("Reset memory for session {} due to size limit", session_id);
        true
    }
}

impl SessionMemoryStore for InMemorySessionStore {
    fn get_or_create(&self, session_id: &str) -> Arc<ConversationBuffer> {
        let now = Utc::now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!("Created new memory for session: {}", session_id);
                SessionMemory::new(now)
            });

        entry.touch(now);
        entry.buffer.clone()
    }

    fn append(&self, session_id: &str, query: &str, answer: &str) -> bool {
        let now = Utc::now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionMemory::new(now));

        let memory = entry.value_mut();
        memory.buffer = Arc::new(memory.buffer.with_turn(query, answer));
        memory.message_count += 1;
        memory.touch(now);

        debug!(
            "Appended turn to session {} (message_count={})",
            session_id, memory.message_count
        );

        self.rotate_locked(session_id, memory)
    }

    fn rotate_if_oversize(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => self.rotate_locked(session_id, entry.value_mut()),
            None => false,
        }
    }

    fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let start_len = self.sessions.len();
        self.sessions.retain(|session_id, memory| {
            let stale = memory.is_stale(now, self.max_age);
            if stale {
                info!("Cleaned up expired memory for session: {}", session_id);
            }
            !stale
        });

        start_len.saturating_sub(self.sessions.len())
    }

    fn delete(&self, session_id: &str) -> bool {
        let deleted = self.sessions.remove(session_id).is_some();
        if deleted {
            info!("Deleted session: {}", session_id);
        }
        deleted
    }

    fn info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|entry| SessionInfo {
            session_id: session_id.to_string(),
            message_count: entry.message_count,
            last_accessed: entry.last_accessed,
            has_memory: true,
        })
    }

    fn stats(&self) -> MemoryStats {
        let sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo {
                session_id: entry.key().clone(),
                message_count: entry.message_count,
                last_accessed: entry.last_accessed,
                has_memory: true,
            })
            .collect();

        MemoryStats {
            active_sessions: sessions.len(),
            sessions,
        }
    }

    fn clear(&self) {
        self.sessions.clear();
        info!("All memories cleared");
    }
}

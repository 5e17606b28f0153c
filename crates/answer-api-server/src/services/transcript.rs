use std::sync::Arc;
use tracing::{debug, info};

use crate::services::history_service::HistoryService;
use crate::services::memory::SessionMemoryStore;

/// Conversation transcript used as prompt context: the in-process buffer,
/// falling back to the durable history when the buffer is empty
#[derive(Clone)]
pub struct Transcript {
    memory: Arc<dyn SessionMemoryStore>,
    history: HistoryService,
    history_limit: usize,
}

impl Transcript {
    pub fn new(memory: Arc<dyn SessionMemoryStore>, history: HistoryService, history_limit: usize) -> Self {
        Self { memory, history, history_limit }
    }

    pub async fn load(&self, session_id: &str) -> String {
        let buffered = self.memory.get_or_create(session_id).history();
        if !buffered.is_empty() {
            return buffered;
        }

        let stored = self.history.context_or_empty(session_id, self.history_limit).await;
        if !stored.is_empty() {
            info!("Loaded conversation context from database for session: {}", session_id);
        }
        stored
    }

    /// Append a finished turn to the buffer, rotating when it grows too large
    pub fn record(&self, session_id: &str, query: &str, answer: &str) {
        if self.memory.append(session_id, query, answer) {
            debug!("Memory rotated for session {}", session_id);
        }
    }
}

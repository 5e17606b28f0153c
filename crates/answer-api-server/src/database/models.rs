use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::chat::{ResponseType, SourceRef};

/// Stored message content is capped at this many characters
pub const MAX_MESSAGE_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }

    /// Speaker label used when rendering context for prompts
    pub fn speaker(&self) -> &'static str {
        match self {
            MessageRole::User => "Human",
            MessageRole::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub total_messages: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSessionRecord {
    pub fn new(session_id: &str, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            total_messages: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub sources: Vec<SourceRef>,
    pub response_type: Option<ResponseType>,
    pub processing_time: Option<String>,
}

impl NewMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
            sources: Vec::new(),
            response_type: None,
            processing_time: None,
        }
    }

    pub fn assistant(
        content: &str,
        sources: Vec<SourceRef>,
        response_type: ResponseType,
        processing_time: Option<String>,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.to_string(),
            sources,
            response_type: Some(response_type),
            processing_time,
        }
    }

    /// Content cut to the storage limit
    pub fn bounded_content(&self) -> String {
        self.content.chars().take(MAX_MESSAGE_CHARS).collect()
    }
}

/// A full conversation turn queued for persistence
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub response_type: ResponseType,
    pub processing_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub session_id: String,
    pub user_id: Option<String>,
    pub messages: Vec<StoredMessage>,
    pub total_messages: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl ChatHistory {
    pub fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: None,
            messages: Vec::new(),
            total_messages: 0,
            created_at: None,
            last_activity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub total_messages: i64,
}

impl From<ChatSessionRecord> for SessionSummary {
    fn from(record: ChatSessionRecord) -> Self {
        Self {
            session_id: record.session_id,
            created_at: record.created_at,
            last_activity: record.updated_at,
            total_messages: record.total_messages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub active_sessions: i64,
    pub timestamp: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{SessionSummary, StoredMessage};

pub const DEFAULT_SESSION_ID: &str = "default";
pub const DEFAULT_USER_ID: &str = "anonymous";

// ===== LLM MESSAGES =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl QueryRequest {
    pub fn session_id(&self) -> String {
        resolve_session_id(self.session_id.as_deref())
    }

    pub fn user_id(&self) -> String {
        match self.user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => DEFAULT_USER_ID.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn resolve_session_id(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => DEFAULT_SESSION_ID.to_string(),
    }
}

// ===== DOMAIN =====

/// Summarized snippet of a fetched web document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceExcerpt {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// Citation metadata returned with answers and kept in chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

impl From<&SourceExcerpt> for SourceRef {
    fn from(excerpt: &SourceExcerpt) -> Self {
        Self { title: excerpt.title.clone(), url: excerpt.url.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnippet {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl From<&SourceExcerpt> for SourceSnippet {
    fn from(excerpt: &SourceExcerpt) -> Self {
        Self {
            title: excerpt.title.clone(),
            url: excerpt.url.clone(),
            snippet: excerpt.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Direct,
    Search,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Direct => "direct",
            ResponseType::Search => "search",
        }
    }

    pub fn processing_note(&self) -> &'static str {
        match self {
            ResponseType::Direct => "no web search needed",
            ResponseType::Search => "web search performed",
        }
    }
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub session_id: String,
    pub response_type: ResponseType,
    pub processing_time: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryErrorResponse {
    pub error: String,
    pub code: String,
    pub session_id: String,
    pub processing_time: String,
    pub timestamp: DateTime<Utc>,
}

/// Frames of the incremental event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    #[serde(rename_all = "camelCase")]
    Sources {
        sources: Vec<SourceSnippet>,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    FinalAnswer {
        answer: String,
        sources: Vec<SourceRef>,
        session_id: String,
        response_type: ResponseType,
        processing_time: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        error: String,
        code: String,
        session_id: String,
        processing_time: String,
        timestamp: DateTime<Utc>,
    },
}

impl StreamFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamFrame::Sources { .. } => "sources",
            StreamFrame::FinalAnswer { .. } => "final_answer",
            StreamFrame::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub message_count: usize,
    pub last_accessed: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// `{success, data, timestamp}` envelope used by the history endpoints
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { success: true, data, timestamp: Utc::now() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSessionsData {
    pub user_id: String,
    pub total_sessions: usize,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearchData {
    pub session_id: String,
    pub search_query: String,
    pub total_results: usize,
    pub results: Vec<StoredMessage>,
}

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::database::models::{ChatHistory, HistoryStats};
use crate::models::chat::{DataResponse, MessageResponse, MessageSearchData, UserSessionsData, DEFAULT_USER_ID};
use crate::state::AppState;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MessageSearchQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsQuery {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

/// GET /chat-history/{session_id}
pub async fn get_chat_history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<DataResponse<ChatHistory>>, ApiError> {
    let history = state
        .history
        .get_chat_history(&session_id, params.limit.unwrap_or(50))
        .await?;

    Ok(Json(DataResponse::new(history)))
}

/// DELETE /chat-history/{session_id}
pub async fn delete_chat_history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state.history.delete_session(&session_id).await?;
    state.memory.delete(&session_id);

    if !deleted {
        return Err(ApiError::NotFound(format!("Session {} not found", session_id)));
    }
    info!("Deleted chat history for session {}", session_id);

    Ok(Json(MessageResponse {
        message: format!("Chat history for session {} deleted successfully", session_id),
        timestamp: Utc::now(),
    }))
}

/// GET /chat-history/{session_id}/search?q=
pub async fn search_messages_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<MessageSearchQuery>,
) -> Result<Json<DataResponse<MessageSearchData>>, ApiError> {
    let search_query = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Search query is required".to_string()))?;

    let results = state
        .history
        .search_messages(&session_id, &search_query, params.limit.unwrap_or(10))
        .await?;

    Ok(Json(DataResponse::new(MessageSearchData {
        session_id,
        search_query,
        total_results: results.len(),
        results,
    })))
}

/// GET /sessions?userId=
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    Query(params): Query<SessionsQuery>,
) -> Result<Json<DataResponse<UserSessionsData>>, ApiError> {
    let user_id = params
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

    let sessions = state
        .history
        .list_user_sessions(&user_id, params.limit.unwrap_or(20))
        .await?;

    Ok(Json(DataResponse::new(UserSessionsData {
        user_id,
        total_sessions: sessions.len(),
        sessions,
    })))
}

/// GET /chat-stats
pub async fn chat_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<HistoryStats>>, ApiError> {
    let stats = state.history.stats().await?;
    Ok(Json(DataResponse::new(stats)))
}

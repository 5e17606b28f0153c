use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use tracing::info;

use crate::models::chat::{resolve_session_id, ClearSessionRequest, MessageResponse, SessionInfoResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /clear-session
pub async fn clear_session_handler(
    State(state): State<AppState>,
    Json(request): Json<ClearSessionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session_id = resolve_session_id(request.session_id.as_deref());

    if !state.memory.delete(&session_id) {
        return Err(ApiError::NotFound(format!("Session {} not found", session_id)));
    }
    state.history.cache().invalidate_session(&session_id);
    info!("Cleared session: {}", session_id);

    Ok(Json(MessageResponse {
        message: format!("Session {} cleared successfully", session_id),
        timestamp: Utc::now(),
    }))
}

/// GET /session/{session_id}
pub async fn session_info_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let info = state
        .memory
        .info(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))?;

    Ok(Json(SessionInfoResponse {
        session_id: info.session_id,
        message_count: info.message_count,
        last_accessed: info.last_accessed,
        timestamp: Utc::now(),
    }))
}

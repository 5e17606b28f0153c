use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::models::chat::{QueryErrorResponse, QueryRequest, StreamFrame};
use crate::services::orchestrator::{error_frame, AnswerOrchestrator, AnswerRequest};
use crate::utils::error::AnswerError;

fn query_error(err: &AnswerError, session_id: String, started: Instant) -> Response {
    match err {
        AnswerError::Validation(msg) => warn!("Rejected query for session {}: {}", session_id, msg),
        AnswerError::InappropriateContent => warn!("Content policy rejection for session {}", session_id),
        other => error!(
            "Query failed for session {} (retryable: {}): {}",
            session_id,
            other.is_retryable(),
            other
        ),
    }

    let body = QueryErrorResponse {
        error: err.public_message(),
        code: err.code().to_string(),
        session_id,
        processing_time: format!("{}ms", started.elapsed().as_millis()),
        timestamp: Utc::now(),
    };

    (err.status_code(), Json(body)).into_response()
}

fn sse_event(frame: &StreamFrame) -> Event {
    Event::default()
        .event(frame.event_name())
        .data(serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string()))
}

// query text is only logged once routing has cleared it
fn log_request(kind: &str, request: &AnswerRequest) {
    info!(
        "{} request: session={}, user={}, query_chars={}",
        kind,
        request.session_id,
        request.user_id,
        request.query.chars().count()
    );
}

/// POST /search
pub async fn search_handler(
    State(orchestrator): State<Arc<AnswerOrchestrator>>,
    Json(payload): Json<QueryRequest>,
) -> Response {
    let started = Instant::now();
    let session_id = payload.session_id();

    let request = match AnswerRequest::new(payload.query.as_deref(), session_id.clone(), payload.user_id()) {
        Ok(request) => request,
        Err(e) => return query_error(&e, session_id, started),
    };
    log_request("Search", &request);

    match orchestrator.answer(request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.into_response(session_id))).into_response(),
        Err(e) => query_error(&e, session_id, started),
    }
}

/// POST /search-stream
///
/// The first event is awaited before any header goes out, so failures up to
/// that point are plain HTTP errors; later failures become `error` frames.
pub async fn search_stream_handler(
    State(orchestrator): State<Arc<AnswerOrchestrator>>,
    Json(payload): Json<QueryRequest>,
) -> Response {
    let started = Instant::now();
    let session_id = payload.session_id();

    let request = match AnswerRequest::new(payload.query.as_deref(), session_id.clone(), payload.user_id()) {
        Ok(request) => request,
        Err(e) => return query_error(&e, session_id, started),
    };
    log_request("Stream", &request);

    let mut events = orchestrator.answer_stream(request);

    let first = match events.next().await {
        Some(Ok(event)) => event,
        Some(Err(e)) => return query_error(&e, session_id, started),
        None => {
            let err = AnswerError::Llm("no answer produced".to_string());
            return query_error(&err, session_id, started);
        }
    };

    let frames = stream::once(async move { Ok(first) })
        .chain(events)
        .map(move |item| {
            let frame = match item {
                Ok(event) => event.into_frame(&session_id),
                Err(e) => {
                    warn!("Stream failed after start for session {}: {}", session_id, e);
                    error_frame(&e, &session_id, started.elapsed().as_millis())
                }
            };
            Ok::<Event, Infallible>(sse_event(&frame))
        });

    Sse::new(frames).keep_alive(KeepAlive::default()).into_response()
}

pub mod config;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub use state::AppState;

/// Request bodies carry a single query; anything larger is rejected early.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let answer_routes = Router::new()
        .route("/search", post(handlers::search::search_handler))
        .route("/search-stream", post(handlers::search::search_stream_handler))
        .route("/clear-session", post(handlers::session::clear_session_handler))
        .route("/session/{session_id}", get(handlers::session::session_info_handler));

    let history_routes = Router::new()
        .route(
            "/chat-history/{session_id}",
            get(handlers::history::get_chat_history_handler)
                .delete(handlers::history::delete_chat_history_handler),
        )
        .route(
            "/chat-history/{session_id}/search",
            get(handlers::history::search_messages_handler),
        )
        .route("/sessions", get(handlers::history::list_sessions_handler))
        .route("/chat-stats", get(handlers::history::chat_stats_handler));

    Router::new()
        .merge(health_routes)
        .merge(answer_routes)
        .merge(history_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CatchPanicLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

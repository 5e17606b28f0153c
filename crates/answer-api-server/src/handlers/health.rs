use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::context_cache::CacheStats;
use crate::services::memory::MemoryStats;
use crate::state::AppState;
use crate::utils::system::MemoryUsage;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    uptime_seconds: u64,
    memory_stats: MemoryStats,
    cache_stats: CacheStats,
    system_memory: MemoryUsage,
    timestamp: DateTime<Utc>,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            environment: state.settings.server.environment.clone(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            memory_stats: state.memory.stats(),
            cache_stats: state.history.cache_stats(),
            system_memory: state.system.memory_usage(),
            timestamp: Utc::now(),
        }),
    )
}

/// Ready once the history store answers
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match state.history.stats().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("Readiness check failed: {:#}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use answer_api_server::config::Settings;
use answer_api_server::database::{ChatHistoryStore, DbPool, InMemoryChatHistoryStore, PgChatHistoryStore};
use answer_api_server::logging::init_logger;
use answer_api_server::services::memory::spawn_memory_sweeper;
use answer_api_server::services::{ExaSearchClient, LlmService};
use answer_api_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logger(&settings.logging)?;
    info!("🚀 Starting Answer API Server...");
    info!("✅ Configuration loaded (environment: {})", settings.server.environment);

    // History store
    let mut db_pool: Option<DbPool> = None;
    let store: Arc<dyn ChatHistoryStore> = if settings.database.enabled {
        let pool = DbPool::connect(&settings.database).await?;
        let repository = PgChatHistoryStore::new(pool.clone());
        repository.ensure_schema().await?;
        info!("✅ Database connection established");
        db_pool = Some(pool);
        Arc::new(repository)
    } else {
        warn!("Database disabled, chat history is kept in process memory only");
        Arc::new(InMemoryChatHistoryStore::new())
    };

    // Upstream providers
    let llm = Arc::new(LlmService::new(settings.llm.clone())?);
    let search = Arc::new(ExaSearchClient::new(settings.search.clone())?);
    info!("✅ LLM model: {}", settings.llm.model);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let memory_every = Duration::from_secs(settings.memory.cleanup_interval_minutes * 60);
    let purge_every = Duration::from_secs(settings.cache.check_period_seconds);
    let retention = Duration::from_secs(settings.database.retention_days.max(0) as u64 * 24 * 3600);
    let retention_every = Duration::from_secs(settings.database.cleanup_interval_hours * 3600);

    let state = AppState::build(settings, llm, search, store);

    // Background maintenance
    let sweeper = spawn_memory_sweeper(state.memory.clone(), memory_every);
    let purger = state.history.cache().clone().spawn_purger(purge_every);
    let retention_sweeper = state.history.clone().spawn_retention_sweeper(retention, retention_every);

    let memory = state.memory.clone();
    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    purger.abort();
    retention_sweeper.abort();
    memory.clear();
    if let Some(pool) = db_pool {
        pool.close().await;
    }

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

use axum::extract::FromRef;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::database::ChatHistoryStore;
use crate::services::memory::{InMemorySessionStore, SessionMemoryStore};
use crate::services::{
    AnswerOrchestrator, AnswerSynthesizer, ContextCache, HistoryService, HistoryWriter, KnowledgeRouter,
    LlmProvider, SearchProvider, Transcript, WebSearchPipeline,
};
use crate::utils::SystemMonitor;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<AnswerOrchestrator>,
    pub memory: Arc<dyn SessionMemoryStore>,
    pub history: HistoryService,
    pub system: SystemMonitor,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every service around the given providers and history store.
    /// Must be called inside a tokio runtime (starts the history workers).
    pub fn build(
        settings: Settings,
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        store: Arc<dyn ChatHistoryStore>,
    ) -> Self {
        let memory: Arc<dyn SessionMemoryStore> = Arc::new(InMemorySessionStore::new(
            settings.memory.max_memory_size,
            chrono::Duration::hours(settings.memory.max_age_hours),
        ));

        let cache = ContextCache::new(
            Duration::from_secs(settings.cache.ttl_seconds),
            Duration::from_secs(settings.cache.meta_ttl_seconds),
            settings.cache.max_entries,
        );
        let history = HistoryService::new(store, cache);
        let writer = HistoryWriter::new(history.clone(), &settings.history);

        let transcript = Transcript::new(memory.clone(), history.clone(), settings.router.history_limit);
        let router = KnowledgeRouter::new(
            llm.clone(),
            transcript.clone(),
            settings.router.clone(),
            settings.llm.timeout(),
        );
        let pipeline = WebSearchPipeline::new(search, settings.search.clone());
        let synthesizer = AnswerSynthesizer::new(llm, transcript, settings.llm.timeout());

        Self {
            settings: Arc::new(settings),
            orchestrator: Arc::new(AnswerOrchestrator::new(router, pipeline, synthesizer, writer)),
            memory,
            history,
            system: SystemMonitor::new(),
            started_at: Instant::now(),
        }
    }
}

impl FromRef<AppState> for Arc<AnswerOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<AppState> for Arc<dyn SessionMemoryStore> {
    fn from_ref(state: &AppState) -> Self {
        state.memory.clone()
    }
}

impl FromRef<AppState> for HistoryService {
    fn from_ref(state: &AppState) -> Self {
        state.history.clone()
    }
}

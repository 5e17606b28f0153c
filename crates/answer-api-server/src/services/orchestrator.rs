use async_stream::stream;
use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::database::models::TurnRecord;
use crate::models::chat::{
    QueryResponse, ResponseType, SourceExcerpt, SourceRef, SourceSnippet, StreamFrame,
};
use crate::services::history_writer::HistoryWriter;
use crate::services::router::{KnowledgeRouter, RoutingVerdict};
use crate::services::search::WebSearchPipeline;
use crate::services::synthesizer::AnswerSynthesizer;
use crate::utils::error::AnswerError;
use crate::utils::text::validate_query;

/// A validated query bound to its session
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub query: String,
    pub session_id: String,
    pub user_id: String,
    started: Instant,
}

impl AnswerRequest {
    pub fn new(raw_query: Option<&str>, session_id: String, user_id: String) -> Result<Self, AnswerError> {
        Ok(Self {
            query: validate_query(raw_query)?,
            session_id,
            user_id,
            started: Instant::now(),
        })
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub response_type: ResponseType,
    pub processing_time: String,
}

impl AnswerOutcome {
    fn new(answer: String, sources: Vec<SourceRef>, response_type: ResponseType, elapsed_ms: u128) -> Self {
        Self {
            answer,
            sources,
            response_type,
            processing_time: format!("{}ms ({})", elapsed_ms, response_type.processing_note()),
        }
    }

    pub fn into_response(self, session_id: String) -> QueryResponse {
        QueryResponse {
            answer: self.answer,
            sources: self.sources,
            session_id,
            response_type: self.response_type,
            processing_time: self.processing_time,
            timestamp: Utc::now(),
        }
    }
}

/// Observable progress of one request
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    SourcesReady(Vec<SourceSnippet>),
    Done(AnswerOutcome),
}

impl AnswerEvent {
    pub fn into_frame(self, session_id: &str) -> StreamFrame {
        match self {
            AnswerEvent::SourcesReady(sources) => StreamFrame::Sources {
                sources,
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
            },
            AnswerEvent::Done(outcome) => StreamFrame::FinalAnswer {
                answer: outcome.answer,
                sources: outcome.sources,
                session_id: session_id.to_string(),
                response_type: outcome.response_type,
                processing_time: outcome.processing_time,
                timestamp: Utc::now(),
            },
        }
    }
}

pub fn error_frame(err: &AnswerError, session_id: &str, elapsed_ms: u128) -> StreamFrame {
    StreamFrame::Error {
        error: err.public_message(),
        code: err.code().to_string(),
        session_id: session_id.to_string(),
        processing_time: format!("{}ms", elapsed_ms),
        timestamp: Utc::now(),
    }
}

/// Events end after `Done` or the first `Err`
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<AnswerEvent, AnswerError>> + Send>>;

/// Sequences router, search pipeline and synthesizer for one query.
///
/// Both transports consume the same event stream: the synchronous one only
/// keeps the terminal event, the streaming one forwards every event.
#[derive(Clone)]
pub struct AnswerOrchestrator {
    router: KnowledgeRouter,
    search: WebSearchPipeline,
    synthesizer: AnswerSynthesizer,
    writer: HistoryWriter,
}

impl AnswerOrchestrator {
    pub fn new(
        router: KnowledgeRouter,
        search: WebSearchPipeline,
        synthesizer: AnswerSynthesizer,
        writer: HistoryWriter,
    ) -> Self {
        Self { router, search, synthesizer, writer }
    }

    pub fn answer_stream(&self, request: AnswerRequest) -> AnswerStream {
        let this = self.clone();

        Box::pin(stream! {
            let verdict = this.router.classify(&request.query, &request.session_id).await;

            match verdict {
                RoutingVerdict::Inappropriate => {
                    yield Err(AnswerError::InappropriateContent);
                }
                RoutingVerdict::DirectAnswer(answer) => {
                    let outcome = AnswerOutcome::new(answer, Vec::new(), ResponseType::Direct, request.elapsed_ms());
                    this.persist(&request, &outcome.answer, &outcome.sources, outcome.response_type, &outcome.processing_time);
                    info!("Direct answer completed in {}", outcome.processing_time);
                    yield Ok(AnswerEvent::Done(outcome));
                }
                RoutingVerdict::SearchNeeded { policy_checked, .. } => {
                    match this.search.search(&request.query).await {
                        Err(e) => {
                            warn!("Search stage failed for session {}: {}", request.session_id, e);
                            yield Err(e);
                        }
                        Ok(excerpts) => {
                            let sources: Vec<SourceRef> = excerpts.iter().map(SourceRef::from).collect();
                            yield Ok(AnswerEvent::SourcesReady(excerpts.iter().map(SourceSnippet::from).collect()));

                            match this.synthesize(&request, &excerpts, !policy_checked).await {
                                Ok(answer) => {
                                    let outcome = AnswerOutcome::new(answer, sources, ResponseType::Search, request.elapsed_ms());
                                    this.persist(&request, &outcome.answer, &outcome.sources, outcome.response_type, &outcome.processing_time);
                                    info!("Search answer completed in {}", outcome.processing_time);
                                    yield Ok(AnswerEvent::Done(outcome));
                                }
                                Err(e) => {
                                    if e != AnswerError::InappropriateContent {
                                        let processing_time = format!("{}ms", request.elapsed_ms());
                                        this.persist(&request, &e.public_message(), &sources, ResponseType::Search, &processing_time);
                                    }
                                    yield Err(e);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Buffered sink over the same event stream
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerOutcome, AnswerError> {
        let mut events = self.answer_stream(request);

        while let Some(event) = events.next().await {
            match event? {
                AnswerEvent::SourcesReady(_) => continue,
                AnswerEvent::Done(outcome) => return Ok(outcome),
            }
        }

        error!("Answer stream ended without a terminal event");
        Err(AnswerError::Llm("no answer produced".to_string()))
    }

    async fn synthesize(
        &self,
        request: &AnswerRequest,
        excerpts: &[SourceExcerpt],
        enforce_policy: bool,
    ) -> Result<String, AnswerError> {
        self.synthesizer
            .synthesize(&request.query, &request.session_id, excerpts, enforce_policy)
            .await
    }

    fn persist(
        &self,
        request: &AnswerRequest,
        answer: &str,
        sources: &[SourceRef],
        response_type: ResponseType,
        processing_time: &str,
    ) {
        self.writer.enqueue(TurnRecord {
            session_id: request.session_id.clone(),
            user_id: request.user_id.clone(),
            query: request.query.clone(),
            answer: answer.to_string(),
            sources: sources.to_vec(),
            response_type,
            processing_time: processing_time.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HistoryConfig, RouterConfig, SearchConfig};
    use crate::database::{ChatHistoryStore, InMemoryChatHistoryStore, UnavailableStore};
    use crate::services::context_cache::ContextCache;
    use crate::services::history_service::HistoryService;
    use crate::services::llm_service::MockLlmProvider;
    use crate::services::memory::{InMemorySessionStore, SessionMemoryStore};
    use crate::services::search::{DocumentContent, MockSearchProvider, SearchHit};
    use crate::services::transcript::Transcript;
    use std::sync::Arc;
    use std::time::Duration;

    const ARTICLE: &str = "The committee published its final report on Tuesday afternoon. \
        Analysts expect the findings to shape policy for the next decade.";

    struct Harness {
        orchestrator: AnswerOrchestrator,
        memory: Arc<InMemorySessionStore>,
        store: Arc<InMemoryChatHistoryStore>,
    }

    fn harness(llm: MockLlmProvider, search: MockSearchProvider) -> Harness {
        let store = Arc::new(InMemoryChatHistoryStore::new());
        let (orchestrator, memory) = build(llm, search, store.clone());
        Harness { orchestrator, memory, store }
    }

    fn build(
        llm: MockLlmProvider,
        search: MockSearchProvider,
        store: Arc<dyn ChatHistoryStore>,
    ) -> (AnswerOrchestrator, Arc<InMemorySessionStore>) {
        let cache = ContextCache::new(Duration::from_secs(300), Duration::from_secs(600), 100);
        let history = HistoryService::new(store, cache);
        let memory = Arc::new(InMemorySessionStore::new(250, chrono::Duration::hours(24)));
        let transcript = Transcript::new(memory.clone(), history.clone(), 10);
        let llm: Arc<MockLlmProvider> = Arc::new(llm);

        let router = KnowledgeRouter::new(
            llm.clone(),
            transcript.clone(),
            RouterConfig { recency_prefilter: false, recency_keywords: vec![], history_limit: 10 },
            Duration::from_secs(1),
        );
        let pipeline = WebSearchPipeline::new(
            Arc::new(search),
            SearchConfig {
                base_url: "http://unused".into(),
                api_key: "k".into(),
                num_results: 4,
                use_autoprompt: true,
                timeout_seconds: 1,
                min_content_chars: 50,
                max_content_chars: 1000,
                max_sentences: 3,
            },
        );
        let synthesizer = AnswerSynthesizer::new(llm, transcript, Duration::from_secs(1));
        let writer = HistoryWriter::new(history, &HistoryConfig { queue_capacity: 16, worker_count: 1 });

        (AnswerOrchestrator::new(router, pipeline, synthesizer, writer), memory)
    }

    fn request(query: &str) -> AnswerRequest {
        AnswerRequest::new(Some(query), "s1".into(), "anonymous".into()).unwrap()
    }

    fn search_ok() -> MockSearchProvider {
        let mut search = MockSearchProvider::new();
        search.expect_search().returning(|_, _| {
            Ok(vec![SearchHit { id: "a".into(), url: "https://a.test".into(), title: None }])
        });
        search.expect_fetch_contents().returning(|_| {
            Ok(vec![DocumentContent {
                id: "a".into(),
                url: "https://a.test".into(),
                title: Some("Report".into()),
                text: Some(ARTICLE.into()),
            }])
        });
        search
    }

    async fn wait_for_messages(store: &InMemoryChatHistoryStore, expected: usize) -> usize {
        for _ in 0..50 {
            let count = store.get_recent_messages("s1", 100).await.unwrap().len();
            if count >= expected {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.get_recent_messages("s1", 100).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_direct_answer_emits_only_final_event() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Ok("DIRECT_ANSWER: It is Tuesday.".into()));
        let mut search = MockSearchProvider::new();
        search.expect_search().never();
        let h = harness(llm, search);

        let events: Vec<_> = h.orchestrator.answer_stream(request("What's today's date?")).collect().await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(AnswerEvent::Done(outcome)) => {
                assert_eq!(outcome.response_type, ResponseType::Direct);
                assert!(outcome.sources.is_empty());
                assert!(outcome.processing_time.ends_with("(no web search needed)"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(wait_for_messages(&h.store, 2).await, 2);
    }

    #[tokio::test]
    async fn test_search_path_emits_sources_before_final_answer() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|m| m[0].content.contains("determine if you can answer"))
            .returning(|_| Ok("SEARCH_NEEDED: current events".into()));
        llm.expect_generate()
            .withf(|m| m[0].content.contains("[1] Report:"))
            .returning(|_| Ok("The report was published on Tuesday.".into()));
        let h = harness(llm, search_ok());

        let events: Vec<_> = h.orchestrator.answer_stream(request("latest report news?")).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(AnswerEvent::SourcesReady(s)) if s.len() == 1));
        match &events[1] {
            Ok(AnswerEvent::Done(outcome)) => {
                assert_eq!(outcome.response_type, ResponseType::Search);
                assert_eq!(outcome.sources[0].url, "https://a.test");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.memory.info("s1").unwrap().message_count, 1);
    }

    #[tokio::test]
    async fn test_zero_results_fails_without_memory_append() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Ok("SEARCH_NEEDED: current events".into()));
        let mut search = MockSearchProvider::new();
        search.expect_search().returning(|_, _| Ok(vec![]));
        let h = harness(llm, search);

        let err = h.orchestrator.answer(request("latest news about X?")).await.unwrap_err();

        assert_eq!(err, AnswerError::NoSearchResults);
        assert_eq!(h.memory.info("s1").unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_inappropriate_is_rejected() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Ok("INAPPROPRIATE: Cannot process this request".into()));
        let h = harness(llm, MockSearchProvider::new());

        let err = h.orchestrator.answer(request("something bad")).await.unwrap_err();
        assert_eq!(err, AnswerError::InappropriateContent);
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failure_after_sources_is_persisted() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|m| m[0].content.contains("determine if you can answer"))
            .returning(|_| Ok("SEARCH_NEEDED: current".into()));
        llm.expect_generate()
            .returning(|_| Err(anyhow::anyhow!("model overloaded")));
        let h = harness(llm, search_ok());

        let events: Vec<_> = h.orchestrator.answer_stream(request("latest report?")).collect().await;

        assert!(matches!(events[0], Ok(AnswerEvent::SourcesReady(_))));
        assert!(matches!(events[1], Err(AnswerError::Llm(_))));
        assert_eq!(wait_for_messages(&h.store, 2).await, 2);

        let stored = h.store.get_recent_messages("s1", 10).await.unwrap();
        assert_eq!(stored[1].sources.len(), 1);
    }

    #[test]
    fn test_request_validation_boundary() {
        let ok = "a".repeat(5000);
        assert!(AnswerRequest::new(Some(&ok), "s".into(), "u".into()).is_ok());

        let too_long = "a".repeat(5001);
        let err = AnswerRequest::new(Some(&too_long), "s".into(), "u".into()).unwrap_err();
        assert!(matches!(err, AnswerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_store_outage_does_not_affect_delivered_answer() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Ok("DIRECT_ANSWER: It is Tuesday.".into()));
        let mut search = MockSearchProvider::new();
        search.expect_search().never();
        let (orchestrator, memory) = build(llm, search, Arc::new(UnavailableStore));

        let outcome = orchestrator.answer(request("What's today's date?")).await.unwrap();

        assert_eq!(outcome.answer, "It is Tuesday.");
        assert_eq!(outcome.response_type, ResponseType::Direct);
        assert_eq!(memory.info("s1").unwrap().message_count, 1);
    }
}

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::models::chat::ChatMessage;
use crate::services::llm_service::LlmProvider;
use crate::services::prompts::{
    classification_prompt, DIRECT_ANSWER_PREFIX, INAPPROPRIATE_PREFIX, SEARCH_NEEDED_PREFIX,
};
use crate::services::transcript::Transcript;
use crate::utils::deadline::{race_with_timeout, DeadlineError};
use crate::utils::text::log_preview;

pub const REASON_UNCLEAR: &str = "unclear response";
pub const REASON_TIMEOUT: &str = "assessment timeout";
pub const REASON_ERROR: &str = "assessment error";
pub const REASON_RECENCY: &str = "recency keyword";
const REASON_DEFAULT: &str = "search needed";

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingVerdict {
    DirectAnswer(String),
    /// `policy_checked` is false when no model classification happened, so
    /// the content-policy check still has to run downstream
    SearchNeeded { reason: String, policy_checked: bool },
    Inappropriate,
}

impl RoutingVerdict {
    fn search(reason: &str, policy_checked: bool) -> Self {
        RoutingVerdict::SearchNeeded { reason: reason.to_string(), policy_checked }
    }
}

/// Three-way prefix contract; anything else falls back to search
pub fn parse_verdict(response: &str) -> RoutingVerdict {
    let response = response.trim_start();

    if response.starts_with(INAPPROPRIATE_PREFIX) {
        return RoutingVerdict::Inappropriate;
    }

    if let Some(answer) = response.strip_prefix(DIRECT_ANSWER_PREFIX) {
        let answer = answer.trim();
        if answer.is_empty() {
            return RoutingVerdict::search(REASON_UNCLEAR, true);
        }
        return RoutingVerdict::DirectAnswer(answer.to_string());
    }

    if let Some(reason) = response.strip_prefix(SEARCH_NEEDED_PREFIX) {
        let reason = reason.trim();
        let reason = if reason.is_empty() { REASON_DEFAULT } else { reason };
        return RoutingVerdict::search(reason, true);
    }

    RoutingVerdict::search(REASON_UNCLEAR, true)
}

/// Decides whether a query can be answered from model knowledge
#[derive(Clone)]
pub struct KnowledgeRouter {
    llm: Arc<dyn LlmProvider>,
    transcript: Transcript,
    config: RouterConfig,
    timeout: Duration,
}

impl KnowledgeRouter {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        transcript: Transcript,
        config: RouterConfig,
        timeout: Duration,
    ) -> Self {
        Self { llm, transcript, config, timeout }
    }

    fn has_recency_keyword(&self, query: &str) -> bool {
        let lowered = query.to_lowercase();
        self.config
            .recency_keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
    }

    pub async fn classify(&self, query: &str, session_id: &str) -> RoutingVerdict {
        if self.config.recency_prefilter && self.has_recency_keyword(query) {
            debug!("Recency keyword found, skipping assessment");
            return RoutingVerdict::search(REASON_RECENCY, false);
        }

        let history = self.transcript.load(session_id).await;
        let prompt = classification_prompt(Local::now(), &history, query);
        let messages = vec![ChatMessage::user(prompt)];

        let llm = self.llm.clone();
        let outcome = race_with_timeout("Assessment", self.timeout, async move {
            llm.generate(&messages).await
        })
        .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Error in direct answer assessment: {:#}", e);
                return RoutingVerdict::search(REASON_ERROR, false);
            }
            Err(DeadlineError::Elapsed(_)) => {
                warn!("Assessment timeout, defaulting to search");
                return RoutingVerdict::search(REASON_TIMEOUT, false);
            }
            Err(e) => {
                warn!("Error in direct answer assessment: {}", e);
                return RoutingVerdict::search(REASON_ERROR, false);
            }
        };

        let verdict = parse_verdict(&response);
        match &verdict {
            RoutingVerdict::DirectAnswer(answer) => {
                info!("Direct answer for: \"{}\"", log_preview(query));
                self.transcript.record(session_id, query, answer);
            }
            RoutingVerdict::SearchNeeded { reason, .. } => {
                info!("Search needed for: \"{}\" ({})", log_preview(query), reason);
            }
            RoutingVerdict::Inappropriate => {
                warn!("Content policy rejection for session {}", session_id);
            }
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RECENCY_KEYWORDS;
    use crate::database::InMemoryChatHistoryStore;
    use crate::services::context_cache::ContextCache;
    use crate::services::history_service::HistoryService;
    use crate::services::llm_service::MockLlmProvider;
    use crate::services::memory::{InMemorySessionStore, SessionMemoryStore};

    struct Fixture {
        memory: Arc<InMemorySessionStore>,
        transcript: Transcript,
    }

    fn fixture() -> Fixture {
        let cache = ContextCache::new(Duration::from_secs(300), Duration::from_secs(600), 100);
        let history = HistoryService::new(Arc::new(InMemoryChatHistoryStore::new()), cache);
        let memory = Arc::new(InMemorySessionStore::new(250, chrono::Duration::hours(24)));
        let transcript = Transcript::new(memory.clone(), history, 10);
        Fixture { memory, transcript }
    }

    fn router_config(prefilter: bool) -> RouterConfig {
        RouterConfig {
            recency_prefilter: prefilter,
            recency_keywords: DEFAULT_RECENCY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            history_limit: 10,
        }
    }

    fn router(llm: MockLlmProvider, fixture: &Fixture, prefilter: bool) -> KnowledgeRouter {
        KnowledgeRouter::new(
            Arc::new(llm),
            fixture.transcript.clone(),
            router_config(prefilter),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_parse_verdict_prefixes() {
        assert_eq!(
            parse_verdict("DIRECT_ANSWER: Today is Monday."),
            RoutingVerdict::DirectAnswer("Today is Monday.".into())
        );
        assert_eq!(
            parse_verdict("  SEARCH_NEEDED: recent event"),
            RoutingVerdict::SearchNeeded { reason: "recent event".into(), policy_checked: true }
        );
        assert_eq!(
            parse_verdict("SEARCH_NEEDED:"),
            RoutingVerdict::SearchNeeded { reason: REASON_DEFAULT.into(), policy_checked: true }
        );
        assert_eq!(
            parse_verdict("INAPPROPRIATE: Cannot process this request"),
            RoutingVerdict::Inappropriate
        );
    }

    #[test]
    fn test_unrecognized_shape_never_becomes_direct_answer() {
        for response in ["Sure! Today is Monday.", "direct_answer: lowercase", "DIRECT_ANSWER:   ", ""] {
            assert_eq!(
                parse_verdict(response),
                RoutingVerdict::SearchNeeded { reason: REASON_UNCLEAR.into(), policy_checked: true },
                "response: {response:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_direct_answer_is_recorded_in_memory() {
        let fixture = fixture();
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|messages| messages[0].content.contains("Current question: What's today's date?"))
            .times(1)
            .returning(|_| Ok("DIRECT_ANSWER: It is Monday.".to_string()));

        let verdict = router(llm, &fixture, false).classify("What's today's date?", "s1").await;

        assert_eq!(verdict, RoutingVerdict::DirectAnswer("It is Monday.".into()));
        assert_eq!(fixture.memory.info("s1").unwrap().message_count, 1);
    }

    #[tokio::test]
    async fn test_search_needed_does_not_touch_memory_count() {
        let fixture = fixture();
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Ok("SEARCH_NEEDED: needs current info".to_string()));

        let verdict = router(llm, &fixture, false).classify("latest news", "s1").await;

        assert!(matches!(verdict, RoutingVerdict::SearchNeeded { policy_checked: true, .. }));
        assert_eq!(fixture.memory.info("s1").unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_model_failure_defaults_to_search() {
        let fixture = fixture();
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Err(anyhow::anyhow!("503 from upstream")));

        let verdict = router(llm, &fixture, false).classify("hello", "s1").await;
        assert_eq!(
            verdict,
            RoutingVerdict::SearchNeeded { reason: REASON_ERROR.into(), policy_checked: false }
        );
    }

    #[tokio::test]
    async fn test_recency_prefilter_never_returns_direct_answer() {
        let fixture = fixture();
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().never();
        let router = router(llm, &fixture, true);

        for query in ["What's the LATEST news about Rust?", "weather today", "breaking story"] {
            let verdict = router.classify(query, "s1").await;
            assert_eq!(
                verdict,
                RoutingVerdict::SearchNeeded { reason: REASON_RECENCY.into(), policy_checked: false }
            );
        }
    }

    struct SlowLlm;

    #[async_trait::async_trait]
    impl LlmProvider for SlowLlm {
        async fn generate(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("DIRECT_ANSWER: too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_assessment_timeout_is_search_needed() {
        let fixture = fixture();
        let router = KnowledgeRouter::new(
            Arc::new(SlowLlm),
            fixture.transcript.clone(),
            router_config(false),
            Duration::from_millis(50),
        );

        let verdict = router.classify("hello", "s1").await;
        assert_eq!(
            verdict,
            RoutingVerdict::SearchNeeded { reason: REASON_TIMEOUT.into(), policy_checked: false }
        );
        assert_eq!(fixture.memory.info("s1").unwrap().message_count, 0);
    }
}

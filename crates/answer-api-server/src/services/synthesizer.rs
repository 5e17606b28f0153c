use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::models::chat::{ChatMessage, SourceExcerpt};
use crate::services::llm_service::LlmProvider;
use crate::services::prompts::{synthesis_prompt, INAPPROPRIATE_PREFIX};
use crate::services::transcript::Transcript;
use crate::utils::deadline::{race_with_timeout, DeadlineError};
use crate::utils::error::AnswerError;

/// Produces the final grounded answer from search excerpts
#[derive(Clone)]
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmProvider>,
    transcript: Transcript,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, transcript: Transcript, timeout: Duration) -> Self {
        Self { llm, transcript, timeout }
    }

    /// With `enforce_policy` the model may still refuse with `INAPPROPRIATE:`
    pub async fn synthesize(
        &self,
        query: &str,
        session_id: &str,
        excerpts: &[SourceExcerpt],
        enforce_policy: bool,
    ) -> Result<String, AnswerError> {
        let history = self.transcript.load(session_id).await;
        let prompt = synthesis_prompt(Local::now(), &history, excerpts, query, enforce_policy);
        let messages = vec![ChatMessage::user(prompt)];

        let llm = self.llm.clone();
        let response = race_with_timeout("Synthesis", self.timeout, async move {
            llm.generate(&messages).await
        })
        .await
        .map_err(|e| match e {
            DeadlineError::Elapsed(_) => {
                warn!("Model response timeout for session {}", session_id);
                AnswerError::UpstreamTimeout { stage: "Synthesis" }
            }
            DeadlineError::TaskFailed(_, msg) => AnswerError::Llm(msg),
        })?
        .map_err(|e| {
            error!("Search-based answer error: {:#}", e);
            AnswerError::Llm(e.to_string())
        })?;

        let answer = response.trim().to_string();
        if enforce_policy && answer.starts_with(INAPPROPRIATE_PREFIX) {
            warn!("Content policy rejection during synthesis for session {}", session_id);
            return Err(AnswerError::InappropriateContent);
        }
        if answer.is_empty() {
            return Err(AnswerError::Llm("empty completion".to_string()));
        }

        self.transcript.record(session_id, query, &answer);
        info!("Synthesized answer from {} sources", excerpts.len());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryChatHistoryStore;
    use crate::services::context_cache::ContextCache;
    use crate::services::history_service::HistoryService;
    use crate::services::llm_service::MockLlmProvider;
    use crate::services::memory::{InMemorySessionStore, SessionMemoryStore};

    fn setup(llm: MockLlmProvider, max_memory: usize) -> (AnswerSynthesizer, Arc<InMemorySessionStore>) {
        let cache = ContextCache::new(Duration::from_secs(300), Duration::from_secs(600), 100);
        let history = HistoryService::new(Arc::new(InMemoryChatHistoryStore::new()), cache);
        let memory = Arc::new(InMemorySessionStore::new(max_memory, chrono::Duration::hours(24)));
        let transcript = Transcript::new(memory.clone(), history, 10);
        (AnswerSynthesizer::new(Arc::new(llm), transcript, Duration::from_secs(1)), memory)
    }

    fn excerpts() -> Vec<SourceExcerpt> {
        vec![SourceExcerpt {
            url: "https://news.test".into(),
            title: "News".into(),
            text: "Something happened today in the world of Rust.".into(),
        }]
    }

    #[tokio::test]
    async fn test_answer_is_grounded_and_recorded() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|messages| messages[0].content.contains("[1] News: Something happened"))
            .times(1)
            .returning(|_| Ok("  Rust shipped a release.  ".to_string()));
        let (synth, memory) = setup(llm, 250);

        let answer = synth.synthesize("what happened?", "s1", &excerpts(), false).await.unwrap();

        assert_eq!(answer, "Rust shipped a release.");
        assert_eq!(memory.info("s1").unwrap().message_count, 1);
    }

    #[tokio::test]
    async fn test_model_failure_is_hard_failure() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().returning(|_| Err(anyhow::anyhow!("boom")));
        let (synth, memory) = setup(llm, 250);

        let err = synth.synthesize("q", "s1", &excerpts(), false).await.unwrap_err();

        assert!(matches!(err, AnswerError::Llm(_)));
        assert_eq!(memory.info("s1").unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_policy_enforced_only_when_requested() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Ok("INAPPROPRIATE: Cannot process this request".to_string()));
        let (synth, _) = setup(llm, 250);

        let err = synth.synthesize("q", "s1", &excerpts(), true).await.unwrap_err();
        assert_eq!(err, AnswerError::InappropriateContent);
    }

    #[tokio::test]
    async fn test_rotation_applies_to_synthesized_turns() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().returning(|_| Ok("answer".to_string()));
        let (synth, memory) = setup(llm, 1);

        synth.synthesize("q1", "s1", &excerpts(), false).await.unwrap();
        synth.synthesize("q2", "s1", &excerpts(), false).await.unwrap();

        assert_eq!(memory.info("s1").unwrap().message_count, 0);
    }

    struct SlowLlm;

    #[async_trait::async_trait]
    impl LlmProvider for SlowLlm {
        async fn generate(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_model_timeout_is_hard_failure() {
        let cache = ContextCache::new(Duration::from_secs(300), Duration::from_secs(600), 100);
        let history = HistoryService::new(Arc::new(InMemoryChatHistoryStore::new()), cache);
        let memory = Arc::new(InMemorySessionStore::new(250, chrono::Duration::hours(24)));
        let transcript = Transcript::new(memory.clone(), history, 10);
        let synth = AnswerSynthesizer::new(Arc::new(SlowLlm), transcript, Duration::from_millis(50));

        let err = synth.synthesize("q", "s1", &excerpts(), false).await.unwrap_err();

        assert_eq!(err, AnswerError::UpstreamTimeout { stage: "Synthesis" });
        assert_eq!(err.code(), "UPSTREAM_TIMEOUT");
        assert_eq!(memory.info("s1").unwrap().message_count, 0);
    }
}

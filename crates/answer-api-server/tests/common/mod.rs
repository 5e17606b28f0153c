#![allow(dead_code)]

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use answer_api_server::config::Settings;
use answer_api_server::database::{ChatHistoryStore, InMemoryChatHistoryStore};
use answer_api_server::models::chat::ChatMessage;
use answer_api_server::services::search::{DocumentContent, SearchHit};
use answer_api_server::services::{LlmProvider, SearchProvider};
use answer_api_server::{build_router, AppState};

const CLASSIFICATION_MARKER: &str = "Analyze the following question";

/// Model double: one canned reply for classification, one for synthesis
pub struct ScriptedLlm {
    classification: String,
    synthesis: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(classification: &str, synthesis: &str) -> Self {
        Self {
            classification: classification.to_string(),
            synthesis: Some(synthesis.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Classifies normally, then errors on every synthesis call
    pub fn failing_synthesis(classification: &str) -> Self {
        Self {
            classification: classification.to_string(),
            synthesis: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        let is_classification = prompt.contains(CLASSIFICATION_MARKER);
        self.prompts.lock().push(prompt);

        if is_classification {
            return Ok(self.classification.clone());
        }
        match &self.synthesis {
            Some(reply) => Ok(reply.clone()),
            None => anyhow::bail!("model unavailable"),
        }
    }
}

/// Search double serving a fixed set of documents
pub struct StaticSearch {
    documents: Vec<DocumentContent>,
    calls: Mutex<usize>,
}

impl StaticSearch {
    pub fn empty() -> Self {
        Self { documents: Vec::new(), calls: Mutex::new(0) }
    }

    pub fn with_documents(docs: &[(&str, &str, &str)]) -> Self {
        let documents = docs
            .iter()
            .enumerate()
            .map(|(i, (url, title, text))| DocumentContent {
                id: format!("doc-{}", i),
                url: url.to_string(),
                title: Some(title.to_string()),
                text: Some(text.to_string()),
            })
            .collect();
        Self { documents, calls: Mutex::new(0) }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait::async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, _query: &str, num_results: usize) -> Result<Vec<SearchHit>> {
        *self.calls.lock() += 1;
        Ok(self
            .documents
            .iter()
            .take(num_results)
            .map(|d| SearchHit { id: d.id.clone(), url: d.url.clone(), title: d.title.clone() })
            .collect())
    }

    async fn fetch_contents(&self, ids: &[String]) -> Result<Vec<DocumentContent>> {
        Ok(self.documents.iter().filter(|d| ids.contains(&d.id)).cloned().collect())
    }
}

pub fn test_settings() -> Settings {
    Settings::builder()
        .unwrap()
        .set_override("llm.api_key", "test-llm-key")
        .unwrap()
        .set_override("search.api_key", "test-search-key")
        .unwrap()
        .set_override("llm.timeout_seconds", 2)
        .unwrap()
        .set_override("search.timeout_seconds", 2)
        .unwrap()
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub llm: Arc<ScriptedLlm>,
    pub search: Arc<StaticSearch>,
    pub store: Arc<InMemoryChatHistoryStore>,
}

impl TestApp {
    pub fn new(llm: ScriptedLlm, search: StaticSearch) -> Self {
        let llm = Arc::new(llm);
        let search = Arc::new(search);
        let store = Arc::new(InMemoryChatHistoryStore::new());

        let state = AppState::build(test_settings(), llm.clone(), search.clone(), store.clone());
        let router = build_router(state.clone());

        Self { router, state, llm, search, store }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, text) = self.send(request).await;
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, text) = self.send(request).await;
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    pub async fn delete_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap();
        let (status, text) = self.send(request).await;
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    /// History is written off the request path; wait for it to land
    pub async fn wait_for_messages(&self, session_id: &str, expected: usize) {
        for _ in 0..100 {
            let messages = self.store.get_recent_messages(session_id, 100).await.unwrap();
            if messages.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("history for {} never reached {} messages", session_id, expected);
    }
}

pub fn long_text(topic: &str) -> String {
    format!(
        "{} shipped a major update this week with many improvements. \
         Developers praised the faster compile times in early benchmarks. \
         The release also includes new tooling for large workspaces.",
        topic
    )
}

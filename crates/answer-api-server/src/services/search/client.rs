use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SearchConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentContent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Ranked web search plus full-content retrieval
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>>;

    async fn fetch_contents(&self, ids: &[String]) -> Result<Vec<DocumentContent>>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: usize,
    use_autoprompt: bool,
}

#[derive(Serialize)]
struct ContentsRequest<'a> {
    ids: &'a [String],
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ResultsEnvelope<T> {
    #[serde(default)]
    results: Vec<T>,
}

/// Exa search API client
#[derive(Clone)]
pub struct ExaSearchClient {
    client: Client,
    config: SearchConfig,
}

impl ExaSearchClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout() * 2)
            .build()
            .context("Failed to create search HTTP client")?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<Vec<T>>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned + Send,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call search API /{}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search API error on /{}: {} - {}", path, status, body);
        }

        let envelope: ResultsEnvelope<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse search API /{} response", path))?;

        Ok(envelope.results)
    }
}

#[async_trait::async_trait]
impl SearchProvider for ExaSearchClient {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>> {
        let request = SearchRequest {
            query,
            num_results,
            use_autoprompt: self.config.use_autoprompt,
        };

        let hits: Vec<SearchHit> = self.post("search", &request).await?;
        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn fetch_contents(&self, ids: &[String]) -> Result<Vec<DocumentContent>> {
        let documents: Vec<DocumentContent> = self.post("contents", &ContentsRequest { ids }).await?;
        debug!("Fetched content for {} of {} documents", documents.len(), ids.len());
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> SearchConfig {
        SearchConfig {
            base_url,
            api_key: "exa-key".to_string(),
            num_results: 4,
            use_autoprompt: true,
            timeout_seconds: 5,
            min_content_chars: 50,
            max_content_chars: 1000,
            max_sentences: 3,
        }
    }

    #[tokio::test]
    async fn test_search_posts_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer exa-key"))
            .and(body_json(json!({"query": "rust news", "num_results": 4, "use_autoprompt": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "a", "url": "https://a.test", "title": "A"},
                    {"id": "b", "url": "https://b.test"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ExaSearchClient::new(config(server.uri())).unwrap();
        let hits = client.search("rust news", 4).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title.as_deref(), Some("A"));
        assert!(hits[1].title.is_none());
    }

    #[tokio::test]
    async fn test_fetch_contents_posts_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contents"))
            .and(body_json(json!({"ids": ["a"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "a", "url": "https://a.test", "title": "A", "text": "body"}]
            })))
            .mount(&server)
            .await;

        let client = ExaSearchClient::new(config(server.uri())).unwrap();
        let docs = client.fetch_contents(&["a".to_string()]).await.unwrap();

        assert_eq!(docs[0].text.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn test_missing_results_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = ExaSearchClient::new(config(server.uri())).unwrap();
        assert!(client.search("q", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = ExaSearchClient::new(config(server.uri())).unwrap();
        let err = client.search("q", 4).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}

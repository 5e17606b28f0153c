use std::sync::Arc;
use tracing::{info, warn};

use super::client::{DocumentContent, SearchProvider};
use crate::config::SearchConfig;
use crate::models::chat::SourceExcerpt;
use crate::utils::deadline::{race_with_timeout, DeadlineError};
use crate::utils::error::AnswerError;
use crate::utils::text::{extract_key_sentences, log_preview, truncate_content};

const UNTITLED: &str = "Untitled";

/// Turns a query into summarized source excerpts
#[derive(Clone)]
pub struct WebSearchPipeline {
    provider: Arc<dyn SearchProvider>,
    config: SearchConfig,
}

impl WebSearchPipeline {
    pub fn new(provider: Arc<dyn SearchProvider>, config: SearchConfig) -> Self {
        Self { provider, config }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SourceExcerpt>, AnswerError> {
        info!("Performing web search for: \"{}\"", log_preview(query));

        let provider = self.provider.clone();
        let owned_query = query.to_string();
        let num_results = self.config.num_results;
        let hits = race_with_timeout("Search", self.config.timeout(), async move {
            provider.search(&owned_query, num_results).await
        })
        .await
        .map_err(|e| deadline_to_error(e, "Search"))?
        .map_err(|e| {
            warn!("Web search error: {:#}", e);
            AnswerError::Search(e.to_string())
        })?;

        if hits.is_empty() {
            warn!("Search returned no results");
            return Err(AnswerError::NoSearchResults);
        }

        let ids: Vec<String> = hits.into_iter().map(|hit| hit.id).collect();
        let provider = self.provider.clone();
        let documents = race_with_timeout("Content fetch", self.config.timeout(), async move {
            provider.fetch_contents(&ids).await
        })
        .await
        .map_err(|e| deadline_to_error(e, "Content fetch"))?
        .map_err(|e| {
            warn!("Content fetch error: {:#}", e);
            AnswerError::Search(e.to_string())
        })?;

        let excerpts = self.summarize(documents);
        if excerpts.is_empty() {
            warn!("No usable content found in search results");
            return Err(AnswerError::NoUsableContent);
        }

        info!("Web search produced {} source excerpts", excerpts.len());
        Ok(excerpts)
    }

    fn summarize(&self, documents: Vec<DocumentContent>) -> Vec<SourceExcerpt> {
        documents
            .into_iter()
            .filter_map(|doc| {
                let text = doc.text?;
                if text.chars().count() <= self.config.min_content_chars {
                    return None;
                }

                let truncated = truncate_content(&text, self.config.max_content_chars);
                let mut summary = extract_key_sentences(&truncated, self.config.max_sentences);
                if summary.is_empty() {
                    summary = truncated;
                }

                Some(SourceExcerpt {
                    url: doc.url,
                    title: doc
                        .title
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| UNTITLED.to_string()),
                    text: summary,
                })
            })
            .collect()
    }
}

fn deadline_to_error(err: DeadlineError, stage: &'static str) -> AnswerError {
    match err {
        DeadlineError::Elapsed(_) => {
            warn!("{} timeout", stage);
            AnswerError::UpstreamTimeout { stage }
        }
        DeadlineError::TaskFailed(_, msg) => AnswerError::Search(msg),
    }
}

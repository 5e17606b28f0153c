//! Web search pipeline
//!
//! Two provider calls per query (ranked search, then content fetch), each
//! bounded by the search timeout, followed by local filtering and
//! summarization into source excerpts.

mod client;
mod pipeline;

pub use client::{DocumentContent, ExaSearchClient, SearchHit, SearchProvider};
pub use pipeline::WebSearchPipeline;

#[cfg(test)]
pub use client::MockSearchProvider;

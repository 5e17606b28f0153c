pub mod context_cache;
pub mod history_service;
pub mod history_writer;
pub mod llm_service;
pub mod memory;
pub mod orchestrator;
pub mod prompts;
pub mod router;
pub mod search;
pub mod synthesizer;
pub mod transcript;

pub use context_cache::ContextCache;
pub use history_service::HistoryService;
pub use history_writer::HistoryWriter;
pub use llm_service::{LlmProvider, LlmService};
pub use orchestrator::{AnswerOrchestrator, AnswerRequest};
pub use router::KnowledgeRouter;
pub use search::{ExaSearchClient, SearchProvider, WebSearchPipeline};
pub use synthesizer::AnswerSynthesizer;
pub use transcript::Transcript;

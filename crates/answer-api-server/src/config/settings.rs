use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub memory: MemoryConfig,
    pub cache: CacheConfig,
    pub router: RouterConfig,
    pub database: DatabaseConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

/// OpenAI-compatible chat completion endpoint (Groq by default)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_seconds: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: String,
    pub num_results: usize,
    pub use_autoprompt: bool,
    pub timeout_seconds: u64,
    /// Documents whose raw text is not longer than this are dropped
    pub min_content_chars: usize,
    pub max_content_chars: usize,
    pub max_sentences: usize,
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    pub max_memory_size: usize,
    pub max_age_hours: i64,
    pub cleanup_interval_minutes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub meta_ttl_seconds: u64,
    pub max_entries: usize,
    pub check_period_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouterConfig {
    pub recency_prefilter: bool,
    pub recency_keywords: Vec<String>,
    pub history_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
    pub retention_days: i64,
    pub cleanup_interval_hours: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub format: String,
    #[serde(default)]
    pub directory: Option<String>,
}

pub const DEFAULT_RECENCY_KEYWORDS: &[&str] = &[
    "latest",
    "today",
    "current",
    "currently",
    "recent",
    "recently",
    "news",
    "this week",
    "right now",
    "breaking",
];

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/settings").required(false))
            // Example: APP__LLM__API_KEY=gsk_...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("router.recency_keywords")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Builder pre-populated with every default, without any source attached
    pub fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let keywords: Vec<String> = DEFAULT_RECENCY_KEYWORDS.iter().map(|s| s.to_string()).collect();

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3001)?
            .set_default("server.environment", "development")?
            .set_default("llm.base_url", "https://api.groq.com/openai/v1")?
            .set_default("llm.api_key", "")?
            .set_default("llm.model", "llama-3.3-70b-versatile")?
            .set_default("llm.temperature", 0.7)?
            .set_default("llm.max_tokens", 1200)?
            .set_default("llm.timeout_seconds", 15)?
            .set_default("search.base_url", "https://api.exa.ai")?
            .set_default("search.api_key", "")?
            .set_default("search.num_results", 4)?
            .set_default("search.use_autoprompt", true)?
            .set_default("search.timeout_seconds", 15)?
            .set_default("search.min_content_chars", 50)?
            .set_default("search.max_content_chars", 1000)?
            .set_default("search.max_sentences", 3)?
            .set_default("memory.max_memory_size", 250)?
            .set_default("memory.max_age_hours", 24)?
            .set_default("memory.cleanup_interval_minutes", 60)?
            .set_default("cache.ttl_seconds", 300)?
            .set_default("cache.meta_ttl_seconds", 600)?
            .set_default("cache.max_entries", 1000)?
            .set_default("cache.check_period_seconds", 60)?
            .set_default("router.recency_prefilter", false)?
            .set_default("router.recency_keywords", keywords)?
            .set_default("router.history_limit", 10)?
            .set_default("database.enabled", false)?
            .set_default("database.url", "postgres://localhost/answer_gateway")?
            .set_default("database.pool_max_size", 10)?
            .set_default("database.pool_timeout_seconds", 5)?
            .set_default("database.retention_days", 30)?
            .set_default("database.cleanup_interval_hours", 24)?
            .set_default("history.queue_capacity", 1024)?
            .set_default("history.worker_count", 1)?
            .set_default("logging.format", "pretty")?;

        Ok(builder)
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            anyhow::bail!("Missing LLM api key (APP__LLM__API_KEY)");
        }

        if self.search.api_key.trim().is_empty() {
            anyhow::bail!("Missing search api key (APP__SEARCH__API_KEY)");
        }

        if self.memory.max_memory_size == 0 {
            anyhow::bail!("memory.max_memory_size must be greater than zero");
        }

        if self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be greater than zero");
        }

        if self.memory.cleanup_interval_minutes == 0
            || self.cache.check_period_seconds == 0
            || self.database.cleanup_interval_hours == 0
        {
            anyhow::bail!("maintenance intervals must be greater than zero");
        }

        if self.llm.timeout_seconds == 0 || self.search.timeout_seconds == 0 {
            anyhow::bail!("llm.timeout_seconds and search.timeout_seconds must be greater than zero");
        }

        Ok(())
    }
}

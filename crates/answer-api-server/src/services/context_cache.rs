use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::database::models::{ChatSessionRecord, StoredMessage};

/// Cache key namespaces; every key references exactly one session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Context { session_id: String, limit: usize },
    Messages { session_id: String, limit: usize },
    Meta { session_id: String },
}

impl CacheKey {
    pub fn session_id(&self) -> &str {
        match self {
            CacheKey::Context { session_id, .. }
            | CacheKey::Messages { session_id, .. }
            | CacheKey::Meta { session_id } => session_id,
        }
    }
}

#[derive(Debug, Clone)]
enum CachedValue {
    Context(String),
    Messages(Vec<StoredMessage>),
    Meta(ChatSessionRecord),
}

struct Entry {
    value: CachedValue,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Short-TTL cache of conversation context, recent messages and session
/// metadata. Misses and evictions are never errors.
#[derive(Clone)]
pub struct ContextCache {
    entries: Arc<DashMap<CacheKey, Entry>>,
    metrics: Arc<CacheMetrics>,
    ttl: Duration,
    meta_ttl: Duration,
    max_entries: usize,
}

impl ContextCache {
    pub fn new(ttl: Duration, meta_ttl: Duration, max_entries: usize) -> Self {
        info!(
            "Initializing context cache (ttl={:?}, meta_ttl={:?}, max_entries={})",
            ttl, meta_ttl, max_entries
        );
        Self {
            entries: Arc::new(DashMap::new()),
            metrics: Arc::new(CacheMetrics::default()),
            ttl,
            meta_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn get_context(&self, session_id: &str, limit: usize) -> Option<String> {
        let key = CacheKey::Context { session_id: session_id.to_string(), limit };
        match self.get(&key)? {
            CachedValue::Context(context) => Some(context),
            _ => None,
        }
    }

    pub fn set_context(&self, session_id: &str, limit: usize, context: String) {
        let key = CacheKey::Context { session_id: session_id.to_string(), limit };
        self.set(key, CachedValue::Context(context), self.ttl);
    }

    pub fn get_messages(&self, session_id: &str, limit: usize) -> Option<Vec<StoredMessage>> {
        let key = CacheKey::Messages { session_id: session_id.to_string(), limit };
        match self.get(&key)? {
            CachedValue::Messages(messages) => Some(messages),
            _ => None,
        }
    }

    pub fn set_messages(&self, session_id: &str, limit: usize, messages: Vec<StoredMessage>) {
        let key = CacheKey::Messages { session_id: session_id.to_string(), limit };
        self.set(key, CachedValue::Messages(messages), self.ttl);
    }

    pub fn get_session_meta(&self, session_id: &str) -> Option<ChatSessionRecord> {
        let key = CacheKey::Meta { session_id: session_id.to_string() };
        match self.get(&key)? {
            CachedValue::Meta(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn set_session_meta(&self, session_id: &str, meta: ChatSessionRecord) {
        let key = CacheKey::Meta { session_id: session_id.to_string() };
        self.set(key, CachedValue::Meta(meta), self.meta_ttl);
    }

    /// Remove every entry that references `session_id`, in all namespaces
    pub fn invalidate_session(&self, session_id: &str) -> usize {
        let start_len = self.entries.len();
        self.entries.retain(|key, _| key.session_id() != session_id);
        let removed = start_len.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!("Invalidated {} cache entries for session {}", removed, session_id);
        }
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let start_len = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        start_len.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            keys: self.entries.len(),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let now = Instant::now();
        let Some(entry) = self.entries.get(key) else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.is_expired(now) {
            drop(entry); // release read lock
            self.entries.remove(key);
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    fn set(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        if !self.entries.contains_key(&key) {
            self.make_room();
        }

        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Keep the entry count under capacity: expired entries first, then
    /// whichever live entry expires soonest
    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }

        self.purge_expired();

        while self.entries.len() >= self.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());

            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                    self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    pub fn spawn_purger(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
            }
        })
    }
}

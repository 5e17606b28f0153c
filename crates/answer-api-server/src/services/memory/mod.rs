//! Session memory module
//!
//! Bounded per-session conversation buffers:
//! - Lazy creation on first access
//! - Hard rotation once `max_memory_size` turns are exceeded
//! - Background sweep of idle sessions

mod store;
pub mod types;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

pub use store::{InMemorySessionStore, SessionMemoryStore};
pub use types::{ConversationBuffer, MemoryStats, SessionInfo, SessionMemory, Turn};

/// Periodically evict idle sessions, independent of request traffic
pub fn spawn_memory_sweeper(store: Arc<dyn SessionMemoryStore>, every: Duration) -> JoinHandle<()> {
    info!("Starting session memory sweeper (interval: {:?})", every);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = store.evict_stale(Utc::now());
            if evicted > 0 {
                info!("Evicted {} idle sessions from memory", evicted);
            }
        }
    })
}

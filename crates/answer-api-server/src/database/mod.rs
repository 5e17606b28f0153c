pub mod memory;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use memory::InMemoryChatHistoryStore;
pub use models::*;
pub use pool::DbPool;
pub use repository::PgChatHistoryStore;
pub use store::ChatHistoryStore;

#[cfg(test)]
pub(crate) use store::UnavailableStore;

pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod orchestrator;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use client::{AnswerService, HttpAnswerClient};
pub use config::Config;
pub use error::{ServiceError, StoreError};
pub use exchange::Exchange;
pub use orchestrator::{QueryOrchestrator, QueryState, Rejected, Settled, Submission};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{ConversationStore, Mutation, Persistence, CONVERSATIONS_KEY};

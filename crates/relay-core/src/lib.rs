pub mod backend;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod models;
pub mod pool;
pub mod retry;
pub mod testutil;
pub mod traits;

pub use backend::ResilientBackend;
pub use cache::ResponseCache;
pub use chat::ChatService;
pub use error::AppError;
pub use fetch::BoundedFetcher;
pub use loader::BulkLoader;
pub use models::{ChatRequest, ChatResponse, Document, SourceRef, compute_fingerprint};
pub use pool::{PoolConfig, WorkerPool};
pub use retry::RetryPolicy;
pub use traits::{ChatBackend, DocumentStore, Fetcher};

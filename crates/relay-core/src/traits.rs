use std::future::Future;

use crate::error::AppError;
use crate::models::{ChatRequest, ChatResponse, Document};

/// Fetches raw document content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Downstream ingestion store.
///
/// The store owns its schema; Relay only needs to know how many items it
/// currently holds (for the idempotent startup check) and how to hand it one
/// fetched document.
pub trait DocumentStore: Send + Sync + Clone {
    /// Current number of ingested items.
    fn count(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Ingest a single fetched document.
    fn ingest(&self, document: &Document) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Remote AI chat backend.
pub trait ChatBackend: Send + Sync + Clone {
    /// Issue one request/response call. Implementations apply their own
    /// per-call timeout; retry lives in [`ResilientBackend`](crate::backend::ResilientBackend).
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, AppError>> + Send;

    /// Single best-effort liveness probe with a short timeout. Never retried.
    fn health(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A no-op DocumentStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullStore;

impl DocumentStore for NullStore {
    async fn count(&self) -> Result<u64, AppError> {
        Ok(0)
    }

    async fn ingest(&self, _document: &Document) -> Result<(), AppError> {
        Ok(())
    }
}

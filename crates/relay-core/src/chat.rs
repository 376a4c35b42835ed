//! Cache-aside chat service: cache lookup → on miss, resilient backend call
//! → cache populate → response.
//!
//! The fingerprint is derived here, outside the cache, from the normalized
//! query plus the conversation scope. There is deliberately no single-flight
//! guard: two callers missing on the same fingerprint at the same time may
//! both reach the backend.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::ResilientBackend;
use crate::cache::{CacheStats, ResponseCache};
use crate::error::AppError;
use crate::models::{ChatRequest, ChatResponse};
use crate::retry::RetryPolicy;
use crate::traits::ChatBackend;

#[derive(Clone)]
pub struct ChatService<B: ChatBackend> {
    backend: ResilientBackend<B>,
    cache: ResponseCache<ChatResponse>,
    response_ttl: Duration,
}

impl<B: ChatBackend> ChatService<B> {
    pub fn new(
        backend: B,
        retry: RetryPolicy,
        cache_capacity: u64,
        response_ttl: Duration,
    ) -> Self {
        Self {
            backend: ResilientBackend::new(backend, retry),
            cache: ResponseCache::new(cache_capacity),
            response_ttl,
        }
    }

    /// Answer a request, short-circuiting repeated identical requests.
    pub async fn ask(
        &self,
        cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AppError> {
        let fingerprint = request.fingerprint();

        if let Some(hit) = self.cache.get(&fingerprint).await {
            tracing::debug!(fingerprint = %&fingerprint[..8], "response cache hit");
            return Ok(hit);
        }

        let response = self.backend.call(cancel, request).await?;
        self.cache
            .put(&fingerprint, response.clone(), self.response_ttl)
            .await;
        Ok(response)
    }

    /// Startup-time advisory probe. A failing backend is logged and ignored;
    /// the backend may recover before the first real request arrives, so the
    /// service fails per-request rather than refusing to boot.
    pub async fn startup_probe(&self) {
        if let Err(e) = self.backend.health_check().await {
            tracing::warn!(error = %e, "backend unhealthy at startup, continuing anyway");
        }
    }

    /// Advisory health probe for the surrounding service's health endpoint.
    pub async fn health_check(&self) -> Result<(), AppError> {
        self.backend.health_check().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBackend;

    fn service(backend: MockBackend) -> ChatService<MockBackend> {
        ChatService::new(
            backend,
            RetryPolicy::none(),
            100,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache() {
        let backend = MockBackend::answering("42");
        let chat = service(backend.clone());
        let cancel = CancellationToken::new();
        let request = ChatRequest::new("meaning of life?");

        let first = chat.ask(&cancel, &request).await.unwrap();
        let second = chat.ask(&cancel, &request).await.unwrap();

        assert_eq!(first.answer, "42");
        assert_eq!(second.answer, "42");
        assert_eq!(backend.calls(), 1, "second request must not reach the backend");
        assert_eq!(chat.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn conversation_scope_separates_cache_entries() {
        let backend = MockBackend::answering("scoped");
        let chat = service(backend.clone());
        let cancel = CancellationToken::new();

        let a = ChatRequest::new("same question").with_conversation("conv-a");
        let b = ChatRequest::new("same question").with_conversation("conv-b");

        chat.ask(&cancel, &a).await.unwrap();
        chat.ask(&cancel, &b).await.unwrap();

        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn backend_failure_is_not_cached() {
        let backend = MockBackend::scripted(vec![
            Err(AppError::Backend {
                status: 400,
                message: "bad request".into(),
            }),
            Ok(ChatResponse {
                answer: "second try".into(),
                usage: Default::default(),
            }),
        ]);
        let chat = service(backend.clone());
        let cancel = CancellationToken::new();
        let request = ChatRequest::new("flaky?");

        assert!(chat.ask(&cancel, &request).await.is_err());
        let response = chat.ask(&cancel, &request).await.unwrap();
        assert_eq!(response.answer, "second try");
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn startup_probe_swallows_failures() {
        let backend =
            MockBackend::answering("ok").with_health_error(AppError::Network("down".into()));
        let chat = service(backend.clone());

        // Must not panic or propagate; the probe is advisory.
        chat.startup_probe().await;
        assert_eq!(backend.health_calls(), 1);
    }
}

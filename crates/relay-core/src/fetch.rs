//! Bounded concurrent fetching with per-item outcomes.
//!
//! `fetch_all` never lets more than K network calls run at once, independent
//! of how many sources were requested, and always returns one result per
//! input source, index-aligned. One item's failure never short-circuits the
//! rest.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::AppError;
use crate::models::SourceRef;
use crate::retry::RetryPolicy;
use crate::traits::Fetcher;

/// The outcome of fetching one source: its content, or a classified fault.
#[derive(Debug)]
pub struct FetchResult {
    pub source: SourceRef,
    pub outcome: Result<String, AppError>,
}

/// Wraps any [`Fetcher`] with a hard concurrency ceiling and a bounded
/// per-item retry on transient faults. A retry budget exhausted on a
/// transient fault surfaces as [`AppError::BackendUnavailable`] with the
/// final fault preserved; permanent faults pass through unchanged.
#[derive(Clone)]
pub struct BoundedFetcher<F: Fetcher> {
    inner: F,
    slots: Arc<Semaphore>,
    limit: usize,
    retry: RetryPolicy,
}

impl<F: Fetcher> BoundedFetcher<F> {
    pub fn new(inner: F, limit: usize, retry: RetryPolicy) -> Result<Self, AppError> {
        if limit == 0 {
            return Err(AppError::Config("fetch concurrency must be at least 1".into()));
        }
        Ok(Self {
            inner,
            slots: Arc::new(Semaphore::new(limit)),
            limit,
            retry,
        })
    }

    /// The concurrency ceiling K.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fetch every source, at most `limit` in flight at once.
    ///
    /// Each source is syntactically validated before it consumes a slot;
    /// validation failures resolve without a network call. Cancellation stops
    /// not-yet-started fetches immediately (no slot consumed) while in-flight
    /// fetches resolve to their own outcome once their per-call timeout or
    /// retry cycle ends.
    pub async fn fetch_all(
        &self,
        cancel: &CancellationToken,
        sources: &[SourceRef],
    ) -> Vec<FetchResult> {
        let fetches = sources.iter().map(|source| {
            let slots = Arc::clone(&self.slots);
            async move {
                if let Err(e) = validate_source(&source.url) {
                    return FetchResult {
                        source: source.clone(),
                        outcome: Err(e),
                    };
                }

                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return FetchResult {
                            source: source.clone(),
                            outcome: Err(AppError::Canceled),
                        };
                    }
                    permit = slots.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => {
                            return FetchResult {
                                source: source.clone(),
                                outcome: Err(AppError::Canceled),
                            };
                        }
                    },
                };

                let outcome = self.fetch_with_retry(&source.url, cancel).await;
                drop(permit);
                FetchResult {
                    source: source.clone(),
                    outcome,
                }
            }
        });

        // join_all preserves input order, keeping results index-aligned.
        futures::future::join_all(fetches).await
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.fetch(url).await {
                Ok(content) => return Ok(content),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let wait = self.retry.delay_for_attempt(attempt);
                    tracing::debug!(
                        %url,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "transient fetch fault, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(AppError::Canceled),
                        () = tokio::time::sleep(wait) => {}
                    }
                }
                // A transient fault that exhausted the budget; same surfacing
                // rule as the chat backend, with the last fault preserved.
                Err(e) if e.is_transient() => {
                    return Err(AppError::BackendUnavailable {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Syntactic source validation: http/https scheme and a host, nothing else.
/// Runs before a concurrency slot is taken and never touches the network.
pub fn validate_source(url: &str) -> Result<(), AppError> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::Validation(format!("invalid URL '{url}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::Validation(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    if parsed.host_str().is_none() {
        return Err(AppError::Validation(format!("URL '{url}' has no host")));
    }

    Ok(())
}

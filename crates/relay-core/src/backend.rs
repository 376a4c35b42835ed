//! Retry wrapper for the remote chat backend.
//!
//! Wraps any [`ChatBackend`] with a bounded, conditionally-applied retry
//! policy: transient faults (no response, 5xx) are retried with a backoff
//! wait; client faults return immediately. Exhausting the attempt budget
//! surfaces [`AppError::BackendUnavailable`].

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{ChatRequest, ChatResponse};
use crate::retry::RetryPolicy;
use crate::traits::ChatBackend;

#[derive(Clone)]
pub struct ResilientBackend<B: ChatBackend> {
    inner: B,
    retry: RetryPolicy,
}

impl<B: ChatBackend> ResilientBackend<B> {
    pub fn new(inner: B, retry: RetryPolicy) -> Self {
        Self { inner, retry }
    }

    /// Issue a completion call with bounded retries on transient faults.
    ///
    /// Cancellation is checked before each attempt and during backoff waits;
    /// an attempt already in flight is bounded only by the inner client's
    /// per-call timeout.
    pub async fn call(
        &self,
        cancel: &CancellationToken,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AppError> {
        let mut attempt = 0u32;
        let mut last_error: Option<AppError> = None;

        while attempt < self.retry.max_attempts {
            if cancel.is_cancelled() {
                return Err(AppError::Canceled);
            }
            attempt += 1;

            match self.inner.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt, error = %e, "transient backend fault");
                    let retry_next = attempt < self.retry.max_attempts;
                    last_error = Some(e);
                    if retry_next {
                        let wait = self.retry.delay_for_attempt(attempt);
                        tokio::select! {
                            () = cancel.cancelled() => return Err(AppError::Canceled),
                            () = tokio::time::sleep(wait) => {}
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::BackendUnavailable {
            attempts: attempt,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// Single best-effort liveness probe; advisory only, never retried.
    /// A failure here is logged and must not prevent the service from starting.
    pub async fn health_check(&self) -> Result<(), AppError> {
        match self.inner.health().await {
            Ok(()) => {
                tracing::debug!("backend health probe ok");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "backend health probe failed");
                Err(e)
            }
        }
    }
}

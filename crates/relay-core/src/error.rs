use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for Relay.
///
/// Every fault crossing a component boundary is one of these variants;
/// classification happens where the underlying cause is observed (transport
/// layer, pool boundary, validation) and is carried as a typed value from
/// then on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input, e.g. a bad URL scheme. Surfaced immediately, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network/connection failure before any response was received.
    #[error("network error: {0}")]
    Network(String),

    /// A call exceeded its per-call timeout.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend answered with a non-success HTTP status.
    ///
    /// `status >= 500` is a transient server fault; anything else is a
    /// client fault and is never retried.
    #[error("backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// Retries against the backend were exhausted.
    #[error("backend unavailable after {attempts} attempts: {last_error}")]
    BackendUnavailable { attempts: u32, last_error: String },

    /// A pool-run task failed or panicked. Recovered at the worker boundary.
    #[error("task failed: {0}")]
    Task(String),

    /// The operation was aborted by caller cancellation or deadline.
    #[error("operation canceled")]
    Canceled,

    /// Submission rejected because the pool is shut down.
    #[error("worker pool is shut down")]
    PoolClosed,

    /// Submission rejected because the task queue is full.
    #[error("task queue is full (capacity {0})")]
    QueueFull(usize),

    /// Downstream ingestion store failure.
    #[error("store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Returns true if this fault is transient and worth retrying.
    ///
    /// Transient: no response received (network error, timeout) or a 5xx
    /// status. Client faults, validation faults, and cancellations are
    /// terminal by definition.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Timeout(_) => true,
            AppError::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the operation was canceled rather than failed.
    pub fn is_canceled(&self) -> bool {
        matches!(self, AppError::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_faults() {
        assert!(AppError::Network("connection reset".into()).is_transient());
        assert!(AppError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(
            AppError::Backend {
                status: 503,
                message: "overloaded".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn client_faults_are_permanent() {
        assert!(
            !AppError::Backend {
                status: 404,
                message: "not found".into(),
            }
            .is_transient()
        );
        // 429 is a non-5xx status: a client fault, not retried.
        assert!(
            !AppError::Backend {
                status: 429,
                message: "rate limited".into(),
            }
            .is_transient()
        );
        assert!(!AppError::Validation("bad scheme".into()).is_transient());
        assert!(!AppError::Canceled.is_transient());
        assert!(!AppError::QueueFull(64).is_transient());
    }

    #[test]
    fn canceled_is_distinguished() {
        assert!(AppError::Canceled.is_canceled());
        assert!(!AppError::Network("reset".into()).is_canceled());
    }
}

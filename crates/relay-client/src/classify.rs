//! Transport-fault classification.
//!
//! Every underlying HTTP failure maps to exactly one `AppError` kind here,
//! so the retry predicate sees one consistent classification regardless of
//! which client produced the fault.

use std::time::Duration;

use relay_core::AppError;

/// Classify a request that produced no usable response.
pub(crate) fn classify_transport(error: reqwest::Error, timeout: Duration) -> AppError {
    if error.is_timeout() {
        AppError::Timeout(timeout)
    } else if error.is_connect() {
        AppError::Network(format!("connection failed: {error}"))
    } else {
        AppError::Network(error.to_string())
    }
}

/// Classify a non-success HTTP status. Transiency (5xx vs. the rest) is
/// decided by `AppError::is_transient`, keeping the rule in one place.
pub(crate) fn classify_status(status: u16, message: String) -> AppError {
    AppError::Backend { status, message }
}

use std::time::Duration;

use relay_core::error::AppError;
use relay_core::traits::Fetcher;
use reqwest::Client;

use crate::classify::{classify_status, classify_transport};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP document fetcher using reqwest.
///
/// Downloads raw document content with a fixed per-call timeout. Syntactic
/// URL validation and the concurrency bound live in
/// [`BoundedFetcher`](relay_core::fetch::BoundedFetcher), which wraps this.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Relay/0.2 (document ingester)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Network(e.to_string()))?;

        Ok(Self { client, timeout })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(
                status.as_u16(),
                format!("HTTP {} for {}", status.as_u16(), url),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("failed to read response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_timeout() {
        let fetcher = ReqwestFetcher::new().unwrap();
        assert_eq!(fetcher.timeout, DEFAULT_FETCH_TIMEOUT);
    }

    #[test]
    fn builds_with_custom_timeout() {
        let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(fetcher.timeout, Duration::from_secs(5));
    }
}

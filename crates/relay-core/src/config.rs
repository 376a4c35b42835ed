use std::time::Duration;

use crate::error::AppError;
use crate::pool::PoolConfig;
use crate::retry::RetryPolicy;

/// Settings for the bounded concurrent fetcher.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Hard cap on simultaneously in-flight fetches.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Per-call HTTP timeout applied by the fetcher implementation.
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Settings for the remote chat backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-call timeout for completion requests.
    pub timeout: Duration,
    /// Short timeout for the advisory health probe.
    pub health_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Settings for the response cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: u64,
    pub response_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            response_ttl: Duration::from_secs(300),
        }
    }
}

/// Top-level Relay configuration.
///
/// Each section feeds one component at the composition root:
///
/// - `pool` → [`WorkerPool::new`](crate::pool::WorkerPool::new)
/// - `fetch.concurrency` + `fetch.retry` →
///   [`BoundedFetcher::new`](crate::fetch::BoundedFetcher::new); `fetch.timeout`
///   is the per-call HTTP timeout for the [`Fetcher`](crate::traits::Fetcher)
///   implementation (`ReqwestFetcher::with_timeout` in `relay-client`)
/// - `backend` → the [`ChatBackend`](crate::traits::ChatBackend) implementation
///   (`HttpChatBackend::new` in `relay-client`); `backend.retry` plus
///   `cache.capacity` and `cache.response_ttl` →
///   [`ChatService::new`](crate::chat::ChatService::new)
#[derive(Debug, Clone)]
pub struct Config {
    pub pool: PoolConfig,
    pub fetch: FetchSettings,
    pub backend: BackendSettings,
    pub cache: CacheSettings,
}

impl Config {
    /// Read configuration from environment variables.
    ///
    /// - `RELAY_BACKEND_URL` (required)
    /// - `RELAY_BACKEND_API_KEY` (required)
    /// - `RELAY_BACKEND_MODEL` (optional, defaults to `gpt-4o-mini`)
    /// - `RELAY_BACKEND_TIMEOUT_SECS` (optional, defaults to 60)
    /// - `RELAY_FETCH_CONCURRENCY` (optional, defaults to 4)
    /// - `RELAY_POOL_MIN_WORKERS` / `RELAY_POOL_MAX_WORKERS` (optional, 2/8)
    /// - `RELAY_CACHE_TTL_SECS` (optional, defaults to 300)
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = std::env::var("RELAY_BACKEND_URL").map_err(|_| {
            AppError::Config("RELAY_BACKEND_URL not set. Required for backend calls.".into())
        })?;
        let api_key = std::env::var("RELAY_BACKEND_API_KEY").map_err(|_| {
            AppError::Config("RELAY_BACKEND_API_KEY not set. Required for backend calls.".into())
        })?;
        let model =
            std::env::var("RELAY_BACKEND_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let backend_timeout = env_parse("RELAY_BACKEND_TIMEOUT_SECS", 60u64)?;
        let concurrency = env_parse("RELAY_FETCH_CONCURRENCY", 4usize)?;
        let min_workers = env_parse("RELAY_POOL_MIN_WORKERS", 2usize)?;
        let max_workers = env_parse("RELAY_POOL_MAX_WORKERS", 8usize)?;
        let cache_ttl = env_parse("RELAY_CACHE_TTL_SECS", 300u64)?;

        if concurrency == 0 {
            return Err(AppError::Config(
                "RELAY_FETCH_CONCURRENCY must be at least 1".into(),
            ));
        }

        let pool = PoolConfig::new(min_workers, max_workers)?;

        Ok(Self {
            pool,
            fetch: FetchSettings {
                concurrency,
                ..FetchSettings::default()
            },
            backend: BackendSettings {
                base_url,
                api_key,
                model,
                timeout: Duration::from_secs(backend_timeout),
                health_timeout: Duration::from_secs(5),
                retry: RetryPolicy::default(),
            },
            cache: CacheSettings {
                response_ttl: Duration::from_secs(cache_ttl),
                ..CacheSettings::default()
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| {
            AppError::Config(format!(
                "Invalid {name} '{raw}': must be a positive integer"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let fetch = FetchSettings::default();
        assert_eq!(fetch.concurrency, 4);
        assert_eq!(fetch.timeout, Duration::from_secs(30));

        let cache = CacheSettings::default();
        assert_eq!(cache.response_ttl, Duration::from_secs(300));
    }
}

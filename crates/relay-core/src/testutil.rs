//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` or atomics for interior mutability, allowing assertions
//! on recorded calls. The fetcher mock additionally tracks in-flight
//! concurrency so tests can verify the K-bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::models::{ChatRequest, ChatResponse, Document, Usage};
use crate::traits::{ChatBackend, DocumentStore, Fetcher};

/// Rebuild an `AppError` value for scripted mocks that hand the same fault
/// out more than once.
pub fn clone_err(error: &AppError) -> AppError {
    match error {
        AppError::Validation(s) => AppError::Validation(s.clone()),
        AppError::Network(s) => AppError::Network(s.clone()),
        AppError::Timeout(d) => AppError::Timeout(*d),
        AppError::Backend { status, message } => AppError::Backend {
            status: *status,
            message: message.clone(),
        },
        AppError::BackendUnavailable {
            attempts,
            last_error,
        } => AppError::BackendUnavailable {
            attempts: *attempts,
            last_error: last_error.clone(),
        },
        AppError::Task(s) => AppError::Task(s.clone()),
        AppError::Canceled => AppError::Canceled,
        AppError::PoolClosed => AppError::PoolClosed,
        AppError::QueueFull(n) => AppError::QueueFull(*n),
        AppError::Store(s) => AppError::Store(s.clone()),
        AppError::Serialization(e) => AppError::Task(format!("serialization error: {e}")),
        AppError::Config(s) => AppError::Config(s.clone()),
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with per-URL scripted responses and concurrency tracking.
#[derive(Clone)]
pub struct MockFetcher {
    default_body: String,
    latency: Duration,
    /// Per-URL response queues; each call pops the first element. Exhausted
    /// or absent queues fall back to `default_body`.
    scripts: Arc<Mutex<HashMap<String, Vec<Result<String, AppError>>>>>,
    /// URLs that fail every call (e.g. to exhaust a retry budget).
    failing: Arc<Mutex<HashMap<String, AppError>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn ok(body: &str) -> Self {
        Self {
            default_body: body.to_string(),
            latency: Duration::ZERO,
            scripts: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A queue of responses for one URL; each call pops the first element.
    pub fn scripted(url: &str, responses: Vec<Result<String, AppError>>) -> Self {
        let fetcher = Self::ok("default body");
        fetcher
            .scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        fetcher
    }

    /// Make one URL fail on every call with the given fault.
    pub fn failing_url(self, url: &str, error: AppError) -> Self {
        self.failing.lock().unwrap().insert(url.to_string(), error);
        self
    }

    /// Sleep this long inside each fetch, so concurrency is observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The highest number of simultaneously in-flight fetches observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(url) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => match self.failing.lock().unwrap().get(url) {
                    Some(e) => Err(clone_err(e)),
                    None => Ok(self.default_body.clone()),
                },
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Mock document store recording every ingested document.
#[derive(Clone)]
pub struct MockStore {
    count: Arc<AtomicU64>,
    ingested: Arc<Mutex<Vec<Document>>>,
    fail_urls: Arc<Mutex<HashMap<String, AppError>>>,
}

impl MockStore {
    /// Empty store — the startup check sees zero items.
    pub fn empty() -> Self {
        Self::with_count(0)
    }

    /// Store that already reports `count` items.
    pub fn with_count(count: u64) -> Self {
        Self {
            count: Arc::new(AtomicU64::new(count)),
            ingested: Arc::new(Mutex::new(Vec::new())),
            fail_urls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make ingestion of one source fail on every call.
    pub fn failing_ingest(self, url: &str, error: AppError) -> Self {
        self.fail_urls.lock().unwrap().insert(url.to_string(), error);
        self
    }

    pub fn ingested(&self) -> Vec<Document> {
        self.ingested.lock().unwrap().clone()
    }
}

impl DocumentStore for MockStore {
    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.count.load(Ordering::SeqCst))
    }

    async fn ingest(&self, document: &Document) -> Result<(), AppError> {
        if let Some(e) = self.fail_urls.lock().unwrap().get(&document.source.url) {
            return Err(clone_err(e));
        }
        self.ingested.lock().unwrap().push(document.clone());
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

/// Mock chat backend with a scripted response queue.
#[derive(Clone)]
pub struct MockBackend {
    /// Queue of responses; each call pops the first element. Exhausted
    /// queues fall back to the default answer.
    responses: Arc<Mutex<Vec<Result<ChatResponse, AppError>>>>,
    default_answer: String,
    calls: Arc<AtomicUsize>,
    health_error: Arc<Mutex<Option<AppError>>>,
    health_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Backend that answers every request with the same text.
    pub fn answering(answer: &str) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_answer: answer.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            health_error: Arc::new(Mutex::new(None)),
            health_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn scripted(responses: Vec<Result<ChatResponse, AppError>>) -> Self {
        let backend = Self::answering("default answer");
        *backend.responses.lock().unwrap() = responses;
        backend
    }

    pub fn with_health_error(self, error: AppError) -> Self {
        *self.health_error.lock().unwrap() = Some(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }
}

impl ChatBackend for MockBackend {
    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(ChatResponse {
                answer: self.default_answer.clone(),
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                },
            })
        } else {
            responses.remove(0)
        }
    }

    async fn health(&self) -> Result<(), AppError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.health_error.lock().unwrap() {
            Some(e) => Err(clone_err(e)),
            None => Ok(()),
        }
    }
}

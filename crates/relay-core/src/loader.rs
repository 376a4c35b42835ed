//! Startup bulk loader: idempotent batch ingestion of the reference source
//! list.
//!
//! Batches run strictly sequentially — every item of batch N resolves before
//! batch N+1 starts — while items within a batch run in parallel through the
//! bounded fetcher. Fetched documents are ingested through the worker pool.
//! One item's failure never removes or blocks another item.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::fetch::{BoundedFetcher, FetchResult};
use crate::models::{Document, LoadFailure, LoadReport, SourceRef};
use crate::pool::WorkerPool;
use crate::traits::{DocumentStore, Fetcher};

#[derive(Clone)]
pub struct BulkLoader<F: Fetcher, S: DocumentStore> {
    fetcher: BoundedFetcher<F>,
    store: S,
    pool: WorkerPool,
    sources: Vec<SourceRef>,
    ingest_timeout: Duration,
}

// `S: 'static` because each ingest is boxed and handed to the pool, which
// may outlive this call frame.
impl<F: Fetcher, S: DocumentStore + 'static> BulkLoader<F, S> {
    pub fn new(
        fetcher: BoundedFetcher<F>,
        store: S,
        pool: WorkerPool,
        sources: Vec<SourceRef>,
    ) -> Self {
        Self {
            fetcher,
            store,
            pool,
            sources,
            ingest_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_ingest_timeout(mut self, timeout: Duration) -> Self {
        self.ingest_timeout = timeout;
        self
    }

    /// Idempotent startup ingestion: if the store already holds items, log
    /// the decision and skip entirely — zero network calls issued.
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<LoadReport, AppError> {
        let existing = self.store.count().await?;
        if existing > 0 {
            tracing::info!(existing, "store already populated, skipping bulk load");
            let now = Utc::now();
            return Ok(LoadReport {
                run_id: Uuid::new_v4(),
                started_at: now,
                finished_at: now,
                skipped: true,
                total: 0,
                processed: 0,
                failures: Vec::new(),
            });
        }
        self.run(cancel).await
    }

    /// Unconditional full pass over the source list, ignoring the
    /// already-loaded check. An explicit operator action, never triggered
    /// automatically.
    pub async fn reload_all(&self, cancel: &CancellationToken) -> Result<LoadReport, AppError> {
        tracing::info!("manual reload requested, ignoring already-loaded check");
        self.run(cancel).await
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<LoadReport, AppError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let batch_size = self.fetcher.limit();
        let total = self.sources.len();

        tracing::info!(%run_id, total, batch_size, "bulk load starting");

        let mut processed = 0usize;
        let mut failures: Vec<LoadFailure> = Vec::new();

        for (batch_index, batch) in self.sources.chunks(batch_size).enumerate() {
            tracing::debug!(%run_id, batch_index, items = batch.len(), "processing batch");
            let results = self.fetcher.fetch_all(cancel, batch).await;

            // Ingest this batch's successes in parallel through the pool;
            // the next batch starts only after every item here resolves.
            let mut ingests = Vec::new();
            for result in results {
                let FetchResult { source, outcome } = result;
                match outcome {
                    Ok(content) => {
                        let document = Document {
                            source: source.clone(),
                            content,
                        };
                        let store = self.store.clone();
                        let pool = self.pool.clone();
                        let timeout = self.ingest_timeout;
                        ingests.push(async move {
                            let outcome = pool
                                .submit_with_deadline(timeout, async move {
                                    store.ingest(&document).await
                                })
                                .await;
                            (source, outcome)
                        });
                    }
                    Err(e) => {
                        tracing::warn!(url = %source.url, error = %e, "source failed");
                        failures.push(LoadFailure {
                            source,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            for (source, outcome) in futures::future::join_all(ingests).await {
                match outcome {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        tracing::warn!(url = %source.url, error = %e, "ingestion failed");
                        failures.push(LoadFailure {
                            source,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let report = LoadReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            skipped: false,
            total,
            processed,
            failures,
        };
        tracing::info!(
            %run_id,
            processed = report.processed,
            failed = report.failed(),
            "bulk load finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::retry::RetryPolicy;
    use crate::testutil::{MockFetcher, MockStore};

    fn source_list(n: usize) -> Vec<SourceRef> {
        (0..n)
            .map(|i| SourceRef::new(format!("https://docs.example.com/{i}")))
            .collect()
    }

    fn loader(
        mock: MockFetcher,
        store: MockStore,
        concurrency: usize,
        sources: Vec<SourceRef>,
    ) -> BulkLoader<MockFetcher, MockStore> {
        let fetcher = BoundedFetcher::new(mock, concurrency, RetryPolicy::none()).unwrap();
        let pool = WorkerPool::new(PoolConfig::new(2, 4).unwrap()).unwrap();
        BulkLoader::new(fetcher, store, pool, sources)
    }

    #[tokio::test]
    async fn initialize_skips_populated_store() {
        let mock = MockFetcher::ok("doc");
        let store = MockStore::with_count(42);
        let loader = loader(mock.clone(), store, 3, source_list(10));

        let report = loader.initialize(&CancellationToken::new()).await.unwrap();

        assert!(report.skipped);
        assert_eq!(mock.calls(), 0, "no network fetches when already loaded");
    }

    #[tokio::test]
    async fn initialize_loads_empty_store() {
        let mock = MockFetcher::ok("doc");
        let store = MockStore::empty();
        let loader = loader(mock, store.clone(), 3, source_list(7));

        let report = loader.initialize(&CancellationToken::new()).await.unwrap();

        assert!(!report.skipped);
        assert_eq!(report.total, 7);
        assert_eq!(report.processed, 7);
        assert!(report.failures.is_empty());
        assert_eq!(store.ingested().len(), 7);
    }

    #[tokio::test]
    async fn one_failure_never_blocks_the_rest() {
        let mock = MockFetcher::ok("doc").failing_url(
            "https://docs.example.com/1",
            AppError::Backend {
                status: 404,
                message: "not found".into(),
            },
        );
        let store = MockStore::empty();
        let loader = loader(mock, store.clone(), 2, source_list(6));

        let report = loader.reload_all(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.processed, 5);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].source.url, "https://docs.example.com/1");
        assert_eq!(report.processed + report.failed(), report.total);
        assert_eq!(store.ingested().len(), 5);
    }

    #[tokio::test]
    async fn ingest_failures_are_reported_per_source() {
        let mock = MockFetcher::ok("doc");
        let store = MockStore::empty()
            .failing_ingest("https://docs.example.com/2", AppError::Store("disk full".into()));
        let loader = loader(mock, store.clone(), 3, source_list(4));

        let report = loader.reload_all(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].source.url, "https://docs.example.com/2");
        assert!(report.failures[0].reason.contains("disk full"));
    }

    #[tokio::test]
    async fn ingestion_runs_through_the_worker_pool() {
        let mock = MockFetcher::ok("doc");
        let store = MockStore::empty();
        let fetcher = BoundedFetcher::new(mock, 2, RetryPolicy::none()).unwrap();
        let pool = WorkerPool::new(PoolConfig::new(1, 2).unwrap()).unwrap();
        let loader = BulkLoader::new(fetcher, store.clone(), pool.clone(), source_list(5));

        loader.initialize(&CancellationToken::new()).await.unwrap();

        assert_eq!(pool.stats().succeeded, 5, "each ingest is one pool task");
        assert_eq!(store.ingested().len(), 5);
        pool.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn reload_ignores_already_loaded_check() {
        let mock = MockFetcher::ok("doc");
        let store = MockStore::with_count(42);
        let loader = loader(mock.clone(), store, 2, source_list(4));

        let report = loader.reload_all(&CancellationToken::new()).await.unwrap();

        assert!(!report.skipped);
        assert_eq!(report.total, 4);
        assert_eq!(mock.calls(), 4);
    }
}

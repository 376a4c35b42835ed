//! Elastic bounded worker pool for background tasks.
//!
//! A pool owns between `min_workers` and `max_workers` Tokio tasks that pull
//! work from a bounded internal queue. Workers scale up when submissions find
//! nobody idle, and scale back down to `min_workers` after `idle_timeout`.
//! Cancellation is non-preemptive: a task that has started always runs to
//! completion, and shutdown drains queued work before stopping workers.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::AppError;

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send>>;

struct QueuedTask {
    future: TaskFuture,
    /// Present for `submit_with_deadline`; the worker reports the outcome here.
    done: Option<oneshot::Sender<Result<(), AppError>>>,
}

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Maximum queued (not yet started) tasks; overflow is rejected with
    /// [`AppError::QueueFull`].
    pub queue_capacity: usize,
    /// How long a surplus worker waits for work before retiring.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 8,
            queue_capacity: 256,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    pub fn new(min_workers: usize, max_workers: usize) -> Result<Self, AppError> {
        if min_workers == 0 {
            return Err(AppError::Config("pool needs at least one worker".into()));
        }
        if max_workers < min_workers {
            return Err(AppError::Config(format!(
                "max_workers ({max_workers}) must be >= min_workers ({min_workers})"
            )));
        }
        Ok(Self {
            min_workers,
            max_workers,
            ..Self::default()
        })
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Point-in-time snapshot of pool counters.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Live workers (running or idle).
    pub workers: usize,
    pub idle: usize,
    pub running: usize,
    pub queued: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
}

struct PoolInner {
    config: PoolConfig,
    queue: Mutex<VecDeque<QueuedTask>>,
    notify: Notify,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_worker_id: AtomicUsize,
    workers: AtomicUsize,
    idle: AtomicUsize,
    running: AtomicUsize,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl PoolInner {
    /// Acquires the queue lock, recovering from poison if necessary.
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<QueuedTask>> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovered from poisoned pool queue mutex");
            poisoned.into_inner()
        })
    }

    /// Reserve a worker slot if below `max_workers`.
    fn try_add_worker(&self) -> bool {
        let prev = self.workers.fetch_add(1, Ordering::SeqCst);
        if prev >= self.config.max_workers {
            self.workers.fetch_sub(1, Ordering::SeqCst);
            false
        } else {
            true
        }
    }

    /// Release a worker slot unless that would drop below `min_workers`.
    fn try_retire(&self) -> bool {
        let prev = self.workers.fetch_sub(1, Ordering::SeqCst);
        if prev > self.config.min_workers {
            true
        } else {
            self.workers.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    fn spawn_worker(inner: Arc<PoolInner>) {
        let worker_id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let tracker = inner.tracker.clone();
        tracker.spawn(worker_loop(inner, worker_id));
    }

    async fn run_task(&self, task: QueuedTask) {
        self.running.fetch_add(1, Ordering::SeqCst);
        let result = AssertUnwindSafe(task.future).catch_unwind().await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        let outcome = match result {
            Ok(Ok(())) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "pool task failed");
                Err(e)
            }
            Err(panic) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let msg = panic_message(panic);
                tracing::error!(message = %msg, "pool task panicked");
                Err(AppError::Task(msg))
            }
        };

        if let Some(done) = task.done {
            // The caller may have given up on its deadline already.
            let _ = done.send(outcome);
        }
    }
}

async fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    tracing::debug!(worker_id, "pool worker started");
    loop {
        let task = inner.lock_queue().pop_front();
        match task {
            Some(task) => inner.run_task(task).await,
            None => {
                if inner.shutdown.is_cancelled() {
                    break;
                }
                inner.idle.fetch_add(1, Ordering::SeqCst);
                let timed_out = tokio::select! {
                    () = inner.notify.notified() => false,
                    () = inner.shutdown.cancelled() => false,
                    () = tokio::time::sleep(inner.config.idle_timeout) => true,
                };
                inner.idle.fetch_sub(1, Ordering::SeqCst);
                if timed_out && inner.try_retire() {
                    tracing::debug!(worker_id, "idle worker retiring");
                    return;
                }
            }
        }
    }
    inner.workers.fetch_sub(1, Ordering::SeqCst);
    tracing::debug!(worker_id, "pool worker stopped");
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Handle to an elastic bounded worker pool.
///
/// Cheap to clone; all clones share the same workers and counters. Must be
/// created inside a Tokio runtime, owned by the service's startup/shutdown
/// lifecycle, and passed to every component that submits work.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self, AppError> {
        if config.min_workers == 0 || config.max_workers < config.min_workers {
            return Err(AppError::Config(format!(
                "invalid pool bounds: min {} max {}",
                config.min_workers, config.max_workers
            )));
        }
        if config.queue_capacity == 0 {
            return Err(AppError::Config("queue_capacity must be at least 1".into()));
        }

        let min_workers = config.min_workers;
        let inner = Arc::new(PoolInner {
            config,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_worker_id: AtomicUsize::new(0),
            workers: AtomicUsize::new(min_workers),
            idle: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        for _ in 0..min_workers {
            PoolInner::spawn_worker(Arc::clone(&inner));
        }

        Ok(Self { inner })
    }

    /// Enqueue fire-and-forget work. Failures and panics are recovered at the
    /// worker boundary, logged, and counted; they never reach the caller.
    pub fn submit<F>(&self, task: F) -> Result<(), AppError>
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.enqueue(QueuedTask {
            future: Box::pin(task),
            done: None,
        })
    }

    /// Enqueue work and block the caller until the task finishes or the
    /// deadline elapses. The task itself is **not** interrupted on timeout;
    /// it keeps running and is still counted when it resolves.
    pub async fn submit_with_deadline<F>(
        &self,
        deadline: Duration,
        task: F,
    ) -> Result<(), AppError>
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(QueuedTask {
            future: Box::pin(task),
            done: Some(tx),
        })?;

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AppError::Task("task result channel closed".into())),
            Err(_) => Err(AppError::Timeout(deadline)),
        }
    }

    /// Point-in-time snapshot of live and cumulative counters.
    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        PoolStats {
            workers: inner.workers.load(Ordering::SeqCst),
            idle: inner.idle.load(Ordering::SeqCst),
            running: inner.running.load(Ordering::SeqCst),
            queued: inner.lock_queue().len(),
            submitted: inner.submitted.load(Ordering::Relaxed),
            succeeded: inner.succeeded.load(Ordering::Relaxed),
            failed: inner.failed.load(Ordering::Relaxed),
            rejected: inner.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting submissions, drain queued and running tasks, then stop
    /// workers. Waits up to `grace`; a drain that exceeds it returns
    /// [`AppError::Timeout`] with workers still finishing in the background.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), AppError> {
        let inner = &self.inner;
        tracing::info!(queued = inner.lock_queue().len(), "worker pool draining");
        inner.shutdown.cancel();
        inner.notify.notify_waiters();
        inner.tracker.close();

        let drained = tokio::time::timeout(grace, inner.tracker.wait()).await;

        // Tasks that slipped into the queue during the cancel race never
        // started; resolve their callers instead of leaving them hanging.
        let stranded: Vec<QueuedTask> = inner.lock_queue().drain(..).collect();
        for task in stranded {
            inner.failed.fetch_add(1, Ordering::Relaxed);
            if let Some(done) = task.done {
                let _ = done.send(Err(AppError::PoolClosed));
            }
        }

        match drained {
            Ok(()) => {
                tracing::info!("worker pool stopped");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "pool drain exceeded grace period");
                Err(AppError::Timeout(grace))
            }
        }
    }

    fn enqueue(&self, task: QueuedTask) -> Result<(), AppError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(AppError::PoolClosed);
        }

        {
            let mut queue = inner.lock_queue();
            if queue.len() >= inner.config.queue_capacity {
                inner.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(AppError::QueueFull(inner.config.queue_capacity));
            }
            queue.push_back(task);
        }
        inner.submitted.fetch_add(1, Ordering::Relaxed);
        inner.notify.notify_one();

        // Everyone is busy: grow toward max_workers.
        if inner.idle.load(Ordering::SeqCst) == 0 && inner.try_add_worker() {
            PoolInner::spawn_worker(Arc::clone(inner));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool(min: usize, max: usize) -> WorkerPool {
        WorkerPool::new(
            PoolConfig::new(min, max)
                .unwrap()
                .with_idle_timeout(Duration::from_millis(50)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        assert!(PoolConfig::new(0, 4).is_err());
        assert!(PoolConfig::new(4, 2).is_err());
        assert!(WorkerPool::new(PoolConfig::default().with_queue_capacity(0)).is_err());
    }

    #[tokio::test]
    async fn never_exceeds_max_workers() {
        let pool = small_pool(2, 3);
        let current = Arc::new(AtomicUsize::new(0));
        let observed_max = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let current = Arc::clone(&current);
            let observed_max = Arc::clone(&observed_max);
            pool.submit(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                observed_max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        pool.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(observed_max.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.stats().succeeded, 20);
    }

    #[tokio::test]
    async fn shutdown_drains_then_rejects() {
        let pool = small_pool(1, 2);
        for _ in 0..5 {
            pool.submit(async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(())
            })
            .unwrap();
        }

        pool.shutdown(Duration::from_secs(5)).await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.succeeded + stats.failed, 5, "no task unaccounted for");
        assert_eq!(stats.succeeded, 5);

        let err = pool.submit(async { Ok(()) }).unwrap_err();
        assert!(matches!(err, AppError::PoolClosed));
    }

    #[tokio::test]
    async fn panic_is_recovered_and_counted() {
        let pool = small_pool(1, 1);

        pool.submit(async { panic!("boom") }).unwrap();
        pool.submit_with_deadline(Duration::from_secs(2), async { Ok(()) })
            .await
            .unwrap();

        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn deadline_is_not_preemptive() {
        let pool = small_pool(1, 1);
        let finished = Arc::new(AtomicUsize::new(0));

        let marker = Arc::clone(&finished);
        let err = pool
            .submit_with_deadline(Duration::from_millis(30), async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                marker.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));

        // The task keeps running past the caller's deadline.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn deadline_returns_task_error() {
        let pool = small_pool(1, 1);
        let err = pool
            .submit_with_deadline(Duration::from_secs(2), async {
                Err(AppError::Store("duplicate key".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn full_queue_rejects_submission() {
        let pool = WorkerPool::new(
            PoolConfig::new(1, 1).unwrap().with_queue_capacity(1),
        )
        .unwrap();

        // Occupy the single worker.
        pool.submit(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One slot in the queue, then overflow.
        pool.submit(async { Ok(()) }).unwrap();
        let err = pool.submit(async { Ok(()) }).unwrap_err();
        assert!(matches!(err, AppError::QueueFull(1)));
        assert_eq!(pool.stats().rejected, 1);

        pool.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn surplus_workers_retire_after_idle_timeout() {
        let pool = small_pool(1, 4);
        for _ in 0..8 {
            pool.submit(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            })
            .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        let stats = pool.stats();
        assert_eq!(stats.workers, 1, "pool should shrink back to min_workers");
        assert_eq!(stats.succeeded, 8);

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
    }
}

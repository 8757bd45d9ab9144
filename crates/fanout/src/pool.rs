//! Worker pool for task execution
//!
//! Bounds the number of in-flight remote calls and amortizes per-worker
//! client setup across many tasks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        TaskQueue (Mutex<VecDeque<TaskDescriptor>>)  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │         │ pop            │ pop             │ pop             │
//! │         ▼                ▼                 ▼                 │
//! │  ┌────────────┐   ┌────────────┐    ┌────────────┐          │
//! │  │  Worker 1  │   │  Worker 2  │ .. │  Worker N  │          │
//! │  │ for_worker │   │ for_worker │    │ for_worker │          │
//! │  │  executor  │   │  executor  │    │  executor  │          │
//! │  └────────────┘   └────────────┘    └────────────┘          │
//! │   recycled after max_tasks_per_worker, replaced while       │
//! │   tasks remain                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::client::{ChatClient, ClientError};
use crate::executor::{panic_message, RetryExecutor};
use crate::task::{TaskDescriptor, TaskFailure, TaskResult};

/// Default number of tasks a worker runs before it is replaced
pub const DEFAULT_MAX_TASKS_PER_WORKER: usize = 100;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers (`None`: available parallelism of the host)
    pub pool_size: Option<usize>,

    /// Tasks a worker processes before it is torn down and replaced
    /// (`None` or `Some(0)`: workers live until the queue is drained)
    pub max_tasks_per_worker: Option<usize>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            max_tasks_per_worker: Some(DEFAULT_MAX_TASKS_PER_WORKER),
        }
    }
}

impl WorkerPoolConfig {
    /// Set the number of workers; values below 1 fall back to the host's parallelism
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = (size >= 1).then_some(size);
        self
    }

    /// Set the recycling threshold; 0 disables recycling
    pub fn with_max_tasks_per_worker(mut self, max: usize) -> Self {
        self.max_tasks_per_worker = (max >= 1).then_some(max);
        self
    }

    /// Recycling threshold, with 0 treated as disabled
    pub fn effective_max_tasks_per_worker(&self) -> Option<usize> {
        self.max_tasks_per_worker.filter(|&max| max >= 1)
    }

    /// Number of workers to run
    pub fn effective_pool_size(&self) -> usize {
        match self.pool_size {
            Some(size) if size >= 1 => size,
            _ => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// Queue was empty
    Drained,
    /// Reached `max_tasks_per_worker`
    Recycled,
}

/// What a worker hands back when it stops
struct WorkerReport {
    worker_id: String,
    processed: usize,
    exit: WorkerExit,
}

type TaskQueue = Mutex<VecDeque<TaskDescriptor>>;

/// Results are streamed out as each task finishes, so a worker that dies
/// mid-batch does not take its completed results with it
type ResultSender<T> = mpsc::UnboundedSender<TaskResult<T>>;

/// Bounded pool of workers sharing one client handle
///
/// # Example
///
/// ```ignore
/// use fanout::{WorkerPool, WorkerPoolConfig};
///
/// let config = WorkerPoolConfig::default()
///     .with_pool_size(8)
///     .with_max_tasks_per_worker(50);
///
/// let pool = WorkerPool::new(client, config);
/// let results = pool.run(tasks).await;
/// ```
pub struct WorkerPool<C: ChatClient> {
    client: C,
    config: WorkerPoolConfig,
}

impl<C: ChatClient> WorkerPool<C> {
    pub fn new(client: C, config: WorkerPoolConfig) -> Self {
        Self { client, config }
    }

    /// Run every task and return one result per task, in completion order
    ///
    /// Returns only after all tasks produced a result.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn run(&self, tasks: Vec<TaskDescriptor>) -> Vec<TaskResult<C::Response>> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let expected: Vec<usize> = tasks.iter().map(|t| t.index).collect();
        let pool_size = self.config.effective_pool_size().min(tasks.len());
        let max_tasks = self.config.effective_max_tasks_per_worker();
        let queue: Arc<TaskQueue> = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let (sender, mut receiver) = mpsc::unbounded_channel();

        info!(
            pool_size,
            max_tasks_per_worker = ?max_tasks,
            "Starting worker pool"
        );

        let mut workers = JoinSet::new();
        for _ in 0..pool_size {
            self.spawn_worker(&mut workers, &queue, &sender, max_tasks);
        }

        let mut spawned = pool_size;
        let mut lost_workers = 0usize;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => {
                    debug!(
                        worker_id = %report.worker_id,
                        processed = report.processed,
                        exit = ?report.exit,
                        "Worker stopped"
                    );

                    if report.exit == WorkerExit::Recycled && !queue.lock().is_empty() {
                        self.spawn_worker(&mut workers, &queue, &sender, max_tasks);
                        spawned += 1;
                    }
                }
                Err(e) => {
                    lost_workers += 1;
                    error!(error = %e, "Worker terminated abnormally");
                }
            }
        }

        // Every worker has stopped, so every sender clone is gone once ours is
        drop(sender);
        let mut results = Vec::with_capacity(expected.len());
        while let Some(result) = receiver.recv().await {
            results.push(result);
        }

        if lost_workers > 0 {
            let abandoned: Vec<TaskDescriptor> = queue.lock().drain(..).collect();
            warn!(
                lost_workers,
                abandoned = abandoned.len(),
                "Reporting unfinished tasks as lost"
            );
            account_for_lost(&mut results, &expected);
        }

        info!(
            results = results.len(),
            workers_spawned = spawned,
            "Worker pool finished"
        );

        results
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<WorkerReport>,
        queue: &Arc<TaskQueue>,
        results: &ResultSender<C::Response>,
        max_tasks: Option<usize>,
    ) {
        let worker_id = format!("worker-{}", Uuid::now_v7());
        let span = tracing::debug_span!("worker", worker_id = %worker_id);
        workers.spawn(
            run_worker(
                worker_id,
                self.client.clone(),
                Arc::clone(queue),
                results.clone(),
                max_tasks,
            )
            .instrument(span),
        );
    }
}

/// Worker body: initialize the client once, then pull tasks until drained or recycled
///
/// `max_tasks` must be `None` or at least 1.
async fn run_worker<C: ChatClient>(
    worker_id: String,
    client: C,
    queue: Arc<TaskQueue>,
    results: ResultSender<C::Response>,
    max_tasks: Option<usize>,
) -> WorkerReport {
    let executor = match init_worker_client(&client) {
        Ok(worker_client) => RetryExecutor::new(Some(worker_client)),
        Err(e) => {
            warn!(error = %e, "Worker client initialization failed");
            RetryExecutor::new(None)
        }
    };
    debug!(has_client = executor.has_client(), "Worker started");

    let mut processed = 0;
    loop {
        if max_tasks.is_some_and(|max| processed >= max) {
            return WorkerReport {
                worker_id,
                processed,
                exit: WorkerExit::Recycled,
            };
        }

        // Guard must not live across the await below
        let next = queue.lock().pop_front();
        let Some(task) = next else {
            return WorkerReport {
                worker_id,
                processed,
                exit: WorkerExit::Drained,
            };
        };

        let result = executor.execute(&task).await;
        processed += 1;
        // The receiver outlives every worker
        let _ = results.send(result);
    }
}

fn init_worker_client<C: ChatClient>(client: &C) -> Result<C, ClientError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| client.for_worker()))
        .unwrap_or_else(|payload| Err(ClientError::Panicked(panic_message(payload.as_ref()))))
}

/// Add a `WorkerLost` result for every expected index that has none
fn account_for_lost<T>(results: &mut Vec<TaskResult<T>>, expected: &[usize]) {
    let seen: HashSet<usize> = results.iter().map(|r| r.index).collect();
    for &index in expected {
        if !seen.contains(&index) {
            results.push(TaskResult::failed(
                index,
                TaskFailure::worker_lost("worker panicked or was aborted"),
                0,
                std::time::Duration::ZERO,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::task::{CallParams, FailureKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the task's model name after a short delay, tracking concurrency
    #[derive(Clone, Default)]
    struct TrackingClient {
        fail_init: bool,
        inits: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatClient for TrackingClient {
        type Response = String;

        async fn chat(&self, params: &CallParams) -> Result<String, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(params.model.clone())
        }

        fn for_worker(&self) -> Result<Self, ClientError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(ClientError::Configuration("no credentials".into()));
            }
            Ok(self.clone())
        }
    }

    #[derive(Debug)]
    struct UnprintableError;

    impl std::fmt::Display for UnprintableError {
        fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            panic!("error rendering failed")
        }
    }

    impl std::error::Error for UnprintableError {}

    /// Succeeds once, then fails with an error whose rendering takes the worker down
    #[derive(Clone, Default)]
    struct FatalAfterFirstClient {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatClient for FatalAfterFirstClient {
        type Response = String;

        async fn chat(&self, _params: &CallParams) -> Result<String, ClientError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok("first".to_string());
            }
            Err(anyhow::Error::new(UnprintableError).into())
        }
    }

    fn tasks(n: usize) -> Vec<TaskDescriptor> {
        (0..n)
            .map(|i| TaskDescriptor::new(i, CallParams::new("m"), RetryPolicy::no_retry()))
            .collect()
    }

    fn sorted_indices<T>(results: &[TaskResult<T>]) -> Vec<usize> {
        let mut indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        indices.sort_unstable();
        indices
    }

    #[test]
    fn test_default_config() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.pool_size, None);
        assert_eq!(config.max_tasks_per_worker, Some(100));
        assert!(config.effective_pool_size() >= 1);
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerPoolConfig::default()
            .with_pool_size(4)
            .with_max_tasks_per_worker(0);

        assert_eq!(config.pool_size, Some(4));
        assert_eq!(config.effective_pool_size(), 4);
        assert_eq!(config.max_tasks_per_worker, None);
    }

    #[test]
    fn test_zero_pool_size_uses_host_parallelism() {
        let config = WorkerPoolConfig::default().with_pool_size(0);
        let host = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        assert_eq!(config.pool_size, None);
        assert_eq!(config.effective_pool_size(), host);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_task_produces_one_result() {
        let client = TrackingClient::default();
        let pool = WorkerPool::new(client.clone(), WorkerPoolConfig::default().with_pool_size(3));

        let results = pool.run(tasks(20)).await;

        assert_eq!(sorted_indices(&results), (0..20).collect::<Vec<_>>());
        assert!(results.iter().all(|r| r.is_ok() && r.attempts == 1));
        assert_eq!(client.calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_pool_size() {
        let client = TrackingClient::default();
        let pool = WorkerPool::new(client.clone(), WorkerPoolConfig::default().with_pool_size(3));

        pool.run(tasks(12)).await;

        assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 3);
        // One client initialization per worker, not per task
        assert_eq!(client.inits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_never_exceeds_task_count() {
        let client = TrackingClient::default();
        let pool = WorkerPool::new(client.clone(), WorkerPoolConfig::default().with_pool_size(16));

        let results = pool.run(tasks(2)).await;

        assert_eq!(results.len(), 2);
        assert_eq!(client.inits.load(Ordering::SeqCst), 2);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_workers_are_recycled() {
        let client = TrackingClient::default();
        let config = WorkerPoolConfig::default()
            .with_pool_size(2)
            .with_max_tasks_per_worker(3);
        let pool = WorkerPool::new(client.clone(), config);

        let results = pool.run(tasks(10)).await;

        assert_eq!(sorted_indices(&results), (0..10).collect::<Vec<_>>());
        // Each worker runs at most 3 tasks, so at least 4 were started
        assert!(client.inits.load(Ordering::SeqCst) >= 4);
        assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_client_init_is_reported_per_task() {
        let client = TrackingClient {
            fail_init: true,
            ..Default::default()
        };
        let pool = WorkerPool::new(client.clone(), WorkerPoolConfig::default().with_pool_size(2));

        let results = pool.run(tasks(5)).await;

        assert_eq!(results.len(), 5);
        for result in &results {
            assert_eq!(result.attempts, 0);
            assert_eq!(
                result.error().map(|e| e.kind),
                Some(FailureKind::ClientNotInitialized)
            );
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let client = TrackingClient::default();
        let pool = WorkerPool::new(client.clone(), WorkerPoolConfig::default());

        assert!(pool.run(Vec::new()).await.is_empty());
        assert_eq!(client.inits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_recycling_threshold_is_disabled() {
        let config = WorkerPoolConfig {
            pool_size: Some(2),
            max_tasks_per_worker: Some(0),
        };
        assert_eq!(config.effective_max_tasks_per_worker(), None);

        let config: WorkerPoolConfig =
            serde_json::from_str(r#"{"pool_size":2,"max_tasks_per_worker":0}"#).unwrap();
        assert_eq!(config.max_tasks_per_worker, Some(0));
        assert_eq!(config.effective_max_tasks_per_worker(), None);
    }

    #[tokio::test]
    async fn test_zero_recycling_threshold_still_drains_queue() {
        let client = TrackingClient::default();
        let config = WorkerPoolConfig {
            pool_size: Some(2),
            max_tasks_per_worker: Some(0),
        };
        let pool = WorkerPool::new(client.clone(), config);

        let results = tokio::time::timeout(Duration::from_secs(5), pool.run(tasks(3)))
            .await
            .expect("pool finishes");

        assert_eq!(sorted_indices(&results), vec![0, 1, 2]);
        assert_eq!(client.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lost_worker_keeps_finished_results() {
        let client = FatalAfterFirstClient::default();
        let pool = WorkerPool::new(client.clone(), WorkerPoolConfig::default().with_pool_size(1));

        let mut results = pool.run(tasks(3)).await;
        results.sort_by_key(|r| r.index);

        assert_eq!(sorted_indices(&results), vec![0, 1, 2]);
        assert!(results[0].is_ok());
        assert_eq!(results[0].attempts, 1);
        assert_eq!(results[0].value().map(String::as_str), Some("first"));
        for result in &results[1..] {
            assert_eq!(result.attempts, 0);
            assert_eq!(
                result.error().map(|e| e.kind),
                Some(FailureKind::WorkerLost)
            );
        }
        // Task 2 never ran
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_account_for_lost() {
        let mut results = vec![
            TaskResult::succeeded(0, (), 1, Duration::ZERO),
            TaskResult::succeeded(2, (), 1, Duration::ZERO),
        ];

        account_for_lost(&mut results, &[0, 1, 2, 3]);

        assert_eq!(sorted_indices(&results), vec![0, 1, 2, 3]);
        let lost: Vec<_> = results
            .iter()
            .filter(|r| r.error().map(|e| e.kind) == Some(FailureKind::WorkerLost))
            .map(|r| r.index)
            .collect();
        assert_eq!(lost, vec![1, 3]);
    }
}

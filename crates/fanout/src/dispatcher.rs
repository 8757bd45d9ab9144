//! Batch dispatcher
//!
//! Repeats one logical call `n` times through a WorkerPool and restores
//! submission order on the way out.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::client::ChatClient;
use crate::config::DispatchConfig;
use crate::pool::{WorkerPool, WorkerPoolConfig};
use crate::retry::RetryPolicy;
use crate::task::{CallParams, TaskDescriptor, TaskResult};

/// Entry point for batch calls
///
/// Owns the client handle; workers receive copies of it when a batch runs.
pub struct Dispatcher<C: ChatClient> {
    pool: WorkerPool<C>,
}

impl<C: ChatClient> Dispatcher<C> {
    pub fn new(client: C, pool_config: WorkerPoolConfig) -> Self {
        Self {
            pool: WorkerPool::new(client, pool_config),
        }
    }

    /// Build a dispatcher from a full configuration, returning the retry policy to use
    pub fn from_config(client: C, config: DispatchConfig) -> (Self, RetryPolicy) {
        (Self::new(client, config.pool), config.retry)
    }

    /// Issue the same call `n` times and return every outcome ordered by index
    ///
    /// `n == 0` returns immediately without starting a pool or touching the
    /// client. Failures never abort the batch; they come back as failed
    /// results.
    #[instrument(skip_all, fields(batch_id = %Uuid::now_v7(), n = n, model = %params.model))]
    pub async fn dispatch(
        &self,
        n: usize,
        params: CallParams,
        retry: RetryPolicy,
    ) -> Vec<TaskResult<C::Response>> {
        if n == 0 {
            return Vec::new();
        }

        let tasks: Vec<TaskDescriptor> = (0..n)
            .map(|index| TaskDescriptor::new(index, params.clone(), retry.clone()))
            .collect();

        let mut results = self.pool.run(tasks).await;
        results.sort_by_key(|r| r.index);

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "Batch complete"
        );

        results
    }

    /// Synchronous variant of [`Dispatcher::dispatch`] for callers outside a tokio runtime
    ///
    /// Must not be called from within an async context.
    pub fn dispatch_blocking(
        &self,
        n: usize,
        params: CallParams,
        retry: RetryPolicy,
    ) -> std::io::Result<Vec<TaskResult<C::Response>>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.dispatch(n, params, retry)))
    }
}

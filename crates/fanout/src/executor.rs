//! Retry executor
//!
//! Runs one TaskDescriptor against a worker's client as an explicit state
//! machine:
//!
//! ```text
//!   Attempting(n) ──ok──────────────────────▶ Succeeded   (terminal)
//!        │
//!        ├─err, n == max_retries ───────────▶ Exhausted   (terminal)
//!        │
//!        └─err, n <  max_retries ─ backoff ─▶ Attempting(n + 1)
//! ```
//!
//! Every outcome, including a panic inside the remote call, becomes a
//! TaskResult. Nothing is propagated to the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::{ChatClient, ClientError};
use crate::task::{CallParams, FailureKind, TaskDescriptor, TaskFailure, TaskResult};

/// Attempt-count state machine of one task
enum AttemptState<T> {
    Attempting(u32),
    Succeeded(T),
    Exhausted(String),
}

/// Executes tasks with retry, backoff and jitter
///
/// Built once per worker. `client` is `None` when the worker's client
/// initialization failed.
pub struct RetryExecutor<C: ChatClient> {
    client: Option<C>,
}

impl<C: ChatClient> RetryExecutor<C> {
    pub fn new(client: Option<C>) -> Self {
        Self { client }
    }

    /// Whether this executor has a usable client
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Run the task to a terminal outcome
    pub async fn execute(&self, task: &TaskDescriptor) -> TaskResult<C::Response> {
        let Some(client) = &self.client else {
            return TaskResult::failed(
                task.index,
                TaskFailure::client_not_initialized(),
                0,
                std::time::Duration::ZERO,
            );
        };

        let start = Instant::now();
        let policy = &task.retry;
        let mut attempts = 0;
        let mut state = AttemptState::Attempting(1);

        loop {
            match state {
                AttemptState::Attempting(attempt) if attempt > policy.max_retries => break,
                AttemptState::Attempting(attempt) => {
                    attempts = attempt;
                    state = match call_once(client, &task.params).await {
                        Ok(value) => AttemptState::Succeeded(value),
                        Err(err) if !policy.has_attempts_remaining(attempt) => {
                            warn!(
                                index = task.index,
                                attempt,
                                error = %err,
                                "Attempt failed, no retries left"
                            );
                            AttemptState::Exhausted(err.into_diagnostic())
                        }
                        Err(err) => {
                            let delay = policy.delay_for_attempt(attempt);
                            warn!(
                                index = task.index,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Attempt failed, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            AttemptState::Attempting(attempt + 1)
                        }
                    };
                }
                AttemptState::Succeeded(value) => {
                    debug!(index = task.index, attempts, "Task succeeded");
                    return TaskResult::succeeded(task.index, value, attempts, start.elapsed());
                }
                AttemptState::Exhausted(diagnostic) => {
                    return TaskResult::failed(
                        task.index,
                        TaskFailure::new(FailureKind::RetriesExhausted, diagnostic),
                        attempts,
                        start.elapsed(),
                    );
                }
            }
        }

        TaskResult::failed(
            task.index,
            TaskFailure::loop_exhausted(),
            attempts,
            start.elapsed(),
        )
    }
}

/// One remote call; a panic counts as a failed attempt
async fn call_once<C: ChatClient>(
    client: &C,
    params: &CallParams,
) -> Result<C::Response, ClientError> {
    match AssertUnwindSafe(client.chat(params)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ClientError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

//! # Fanout
//!
//! A resilient parallel dispatcher for chat-completion calls.
//!
//! One logical call is issued `n` times across a bounded pool of workers.
//! Each call is retried independently with exponential backoff and jitter,
//! and the outcomes come back in submission order no matter when they finished.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                            │
//! │  (builds n TaskDescriptors, restores index order)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  (bounded workers, one client copy each, recycling)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RetryExecutor                           │
//! │  (attempt / backoff state machine around ChatClient::chat)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use fanout::prelude::*;
//!
//! let client = HttpChatClient::new(ClientConfig::from_env()?)?;
//! let dispatcher = Dispatcher::new(client, WorkerPoolConfig::default());
//!
//! let params = CallParams::new("command-a-03-2025")
//!     .with_message(ChatMessage::user("what is 987987 * 123123"))
//!     .with_temperature(1.0);
//!
//! let results = dispatcher.dispatch(5, params, RetryPolicy::default()).await;
//! for result in &results {
//!     println!("[{}] ok={} attempts={}", result.index, result.is_ok(), result.attempts);
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod pool;
pub mod retry;
pub mod task;

mod serde_duration;

/// Prelude for common imports
pub mod prelude {
    pub use crate::client::{ChatClient, ClientConfig, ClientError, HttpChatClient};
    pub use crate::config::{ConfigError, DispatchConfig};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::pool::{WorkerPool, WorkerPoolConfig};
    pub use crate::retry::RetryPolicy;
    pub use crate::task::{
        CallOptions, CallParams, ChatMessage, FailureKind, MessageRole, TaskDescriptor,
        TaskFailure, TaskOutcome, TaskResult,
    };
}

// Re-export key types at crate root
pub use client::{ChatClient, ClientConfig, ClientError, HttpChatClient};
pub use config::{ConfigError, DispatchConfig};
pub use dispatcher::Dispatcher;
pub use executor::RetryExecutor;
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use retry::RetryPolicy;
pub use task::{
    CallOptions, CallParams, ChatMessage, FailureKind, MessageRole, TaskDescriptor, TaskFailure,
    TaskOutcome, TaskResult,
};

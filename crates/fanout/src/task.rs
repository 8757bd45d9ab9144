// Task and result data model
//
// A batch is n TaskDescriptors carrying identical call parameters. Each one
// produces exactly one TaskResult, correlated back by index.

use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::retry::RetryPolicy;

/// Message role in conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Role-tagged chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Additional call options
///
/// Well-known sampling options are named fields. Anything else the remote
/// service accepts goes into `extra` and is flattened into the request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallOptions {
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Random seed for reproducible sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Forward-compatible options passed through verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters of one remote chat call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallParams {
    /// Model identifier (e.g., "command-a-03-2025")
    pub model: String,
    /// Ordered conversation sent to the model
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub options: CallOptions,
}

impl CallParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            options: CallOptions::default(),
        }
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.options.seed = Some(seed);
        self
    }

    /// Add a pass-through option
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.extra.insert(key.into(), value);
        self
    }
}

/// One unit of work in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Position in the batch; only used to restore order
    pub index: usize,
    pub params: CallParams,
    pub retry: RetryPolicy,
}

impl TaskDescriptor {
    pub fn new(index: usize, params: CallParams, retry: RetryPolicy) -> Self {
        Self {
            index,
            params,
            retry,
        }
    }
}

/// Why a task failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The worker never obtained a usable client; nothing was attempted
    ClientNotInitialized,
    /// Every attempt failed
    RetriesExhausted,
    /// The attempt loop ended without reaching a terminal state
    LoopExhausted,
    /// The worker running the task terminated abnormally
    WorkerLost,
}

/// Failure record of a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    /// Human-readable diagnostic, including the cause chain
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn client_not_initialized() -> Self {
        Self::new(FailureKind::ClientNotInitialized, "client not initialized")
    }

    pub fn loop_exhausted() -> Self {
        Self::new(
            FailureKind::LoopExhausted,
            "retry loop exhausted unexpectedly",
        )
    }

    pub fn worker_lost(detail: impl std::fmt::Display) -> Self {
        Self::new(
            FailureKind::WorkerLost,
            format!("worker terminated before finishing the task: {detail}"),
        )
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Terminal outcome of a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Succeeded { value: T },
    Failed { error: TaskFailure },
}

/// Outcome record of one TaskDescriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult<T> {
    /// Echo of `TaskDescriptor::index`
    pub index: usize,
    pub outcome: TaskOutcome<T>,
    /// Attempts actually made
    pub attempts: u32,
    /// Wall-clock time of the whole retry sequence
    pub elapsed: Duration,
}

impl<T> TaskResult<T> {
    pub fn succeeded(index: usize, value: T, attempts: u32, elapsed: Duration) -> Self {
        Self {
            index,
            outcome: TaskOutcome::Succeeded { value },
            attempts,
            elapsed,
        }
    }

    pub fn failed(index: usize, error: TaskFailure, attempts: u32, elapsed: Duration) -> Self {
        Self {
            index,
            outcome: TaskOutcome::Failed { error },
            attempts,
            elapsed,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Succeeded { .. })
    }

    /// Successful response, present iff `is_ok()`
    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            TaskOutcome::Succeeded { value } => Some(value),
            TaskOutcome::Failed { .. } => None,
        }
    }

    /// Failure record, present iff `!is_ok()`
    pub fn error(&self) -> Option<&TaskFailure> {
        match &self.outcome {
            TaskOutcome::Succeeded { .. } => None,
            TaskOutcome::Failed { error } => Some(error),
        }
    }
}

/// Flat wire shape of a TaskResult
#[derive(Serialize)]
struct TaskResultRecord<'a, T> {
    index: usize,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a TaskFailure>,
    attempts: u32,
    /// Whole milliseconds, truncated
    elapsed_ms: u64,
}

impl<T: Serialize> Serialize for TaskResult<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        TaskResultRecord {
            index: self.index,
            ok: self.is_ok(),
            value: self.value(),
            error: self.error(),
            attempts: self.attempts,
            elapsed_ms: crate::serde_duration::whole_millis(self.elapsed),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_params_serialize_flat() {
        let params = CallParams::new("command-a-03-2025")
            .with_message(ChatMessage::user("hello"))
            .with_temperature(1.0)
            .with_option("k", json!(3));

        let body = serde_json::to_value(&params).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "command-a-03-2025",
                "messages": [{"role": "user", "content": "hello"}],
                "temperature": 1.0,
                "k": 3,
            })
        );
    }

    #[test]
    fn test_message_role_from_str() {
        assert_eq!("System".parse::<MessageRole>(), Ok(MessageRole::System));
        assert_eq!("assistant".parse::<MessageRole>(), Ok(MessageRole::Assistant));
        assert!("robot".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_result_accessors() {
        let ok = TaskResult::succeeded(0, "hi", 2, Duration::from_millis(5));
        assert!(ok.is_ok());
        assert_eq!(ok.value(), Some(&"hi"));
        assert!(ok.error().is_none());

        let failed: TaskResult<&str> =
            TaskResult::failed(1, TaskFailure::client_not_initialized(), 0, Duration::ZERO);
        assert!(!failed.is_ok());
        assert!(failed.value().is_none());
        assert_eq!(
            failed.error().map(|e| e.kind),
            Some(FailureKind::ClientNotInitialized)
        );
    }

    #[test]
    fn test_result_serialization() {
        let ok = TaskResult::succeeded(3, json!({"text": "42"}), 1, Duration::from_millis(1500));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({
                "index": 3,
                "ok": true,
                "value": {"text": "42"},
                "attempts": 1,
                "elapsed_ms": 1500,
            })
        );

        let failed: TaskResult<Value> = TaskResult::failed(
            4,
            TaskFailure::new(FailureKind::RetriesExhausted, "boom"),
            3,
            Duration::from_millis(10),
        );
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "index": 4,
                "ok": false,
                "error": {"kind": "retries_exhausted", "message": "boom"},
                "attempts": 3,
                "elapsed_ms": 10,
            })
        );
    }
}

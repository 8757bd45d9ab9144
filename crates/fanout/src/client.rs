// Remote client handle
//
// ChatClient is the seam between the dispatcher and the remote service.
// The dispatcher owns one instance; every worker derives its own copy once,
// at worker start, through `for_worker`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::{env_parse, ConfigError};
use crate::task::CallParams;

/// Default remote endpoint (Cohere v2 chat)
pub const DEFAULT_API_URL: &str = "https://api.cohere.com/v2/chat";

/// Errors raised by a single remote call
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Request could not be sent or the connection failed
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Remote returned a non-success status
    #[error("remote returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Response body was not valid JSON
    #[error("failed to decode response body")]
    Decode(#[source] serde_json::Error),

    /// Client could not be configured or built
    #[error("client configuration error: {0}")]
    Configuration(String),

    /// The remote call panicked
    #[error("remote call panicked: {0}")]
    Panicked(String),

    /// Any other failure (custom clients, test doubles)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    /// Full diagnostic of the error, including every cause in its source chain
    pub fn into_diagnostic(self) -> String {
        format!("{:?}", anyhow::Error::new(self))
    }
}

/// Handle to the remote chat service
///
/// Implementations must be safe to use from many workers at once. Any mutable
/// state (connection pools, token caches) is internally synchronized or
/// duplicated by `for_worker`.
#[async_trait]
pub trait ChatClient: Clone + Send + Sync + 'static {
    /// Opaque success payload, passed through to `TaskResult::value`
    type Response: Send + 'static;

    /// Perform one remote call
    async fn chat(&self, params: &CallParams) -> Result<Self::Response, ClientError>;

    /// Per-worker initialization, called exactly once when a worker starts
    ///
    /// An error leaves the worker without a client; its tasks then fail with
    /// `FailureKind::ClientNotInitialized` and are not retried.
    fn for_worker(&self) -> Result<Self, ClientError> {
        Ok(self.clone())
    }
}

/// Configuration of the HTTP chat client
#[derive(Clone)]
pub struct ClientConfig {
    /// Chat endpoint URL
    pub api_url: String,
    /// Bearer token
    pub api_key: String,
    /// Optional per-request timeout (none by default)
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            request_timeout: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// - `CO_API_KEY`: API key (required)
    /// - `FANOUT_API_URL`: chat endpoint (default: Cohere v2 chat)
    /// - `FANOUT_REQUEST_TIMEOUT_SECS`: per-request timeout in seconds
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key =
            std::env::var("CO_API_KEY").map_err(|_| ConfigError::Missing("CO_API_KEY"))?;
        let api_url =
            std::env::var("FANOUT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let request_timeout = env_parse::<f64>("FANOUT_REQUEST_TIMEOUT_SECS")?
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Invalid {
                    name: "FANOUT_REQUEST_TIMEOUT_SECS",
                    value: secs.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            api_url,
            api_key,
            request_timeout,
        })
    }

    /// Set the chat endpoint URL
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Chat client speaking JSON over HTTP with bearer authentication
///
/// Works with Cohere v2 chat and OpenAI-compatible chat completion endpoints.
/// The response body is returned as-is.
///
/// # Example
///
/// ```ignore
/// use fanout::{ClientConfig, HttpChatClient};
///
/// let client = HttpChatClient::new(ClientConfig::from_env()?)?;
/// // or with custom endpoint
/// let client = HttpChatClient::new(
///     ClientConfig::new("your-api-key").with_api_url("https://api.example.com/v1/chat/completions"),
/// )?;
/// ```
#[derive(Clone, Debug)]
pub struct HttpChatClient {
    http: Client,
    config: ClientConfig,
}

impl HttpChatClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = build_http_client(&config)?;
        Ok(Self { http, config })
    }

    /// Get the API URL
    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }
}

fn build_http_client(config: &ClientConfig) -> Result<Client, ClientError> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl ChatClient for HttpChatClient {
    type Response = Value;

    async fn chat(&self, params: &CallParams) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(params)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: self.config.api_url.clone(),
                source,
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                url: self.config.api_url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }

    /// Fresh connection pool per worker, so recycled workers drop their connections
    fn for_worker(&self) -> Result<Self, ClientError> {
        debug!(api_url = %self.config.api_url, "Building worker HTTP client");
        Ok(Self {
            http: build_http_client(&self.config)?,
            config: self.config.clone(),
        })
    }
}

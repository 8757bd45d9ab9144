// Chat command - issue one chat call n times in parallel

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use fanout::{
    CallParams, ChatMessage, ClientConfig, DispatchConfig, Dispatcher, HttpChatClient,
    MessageRole, TaskResult,
};
use serde_json::Value;

use crate::output::{print_field, response_text, OutputFormat};

#[derive(Args)]
pub struct ChatArgs {
    /// Number of times to issue the call
    #[arg(long, short, default_value = "1")]
    pub n: usize,

    /// Model name
    #[arg(long, short)]
    pub model: String,

    /// Message as "role:content" or plain user text (repeatable, in order)
    #[arg(long = "message", required = true)]
    pub messages: Vec<String>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Extra request field as key=value (value parsed as JSON, else a string)
    #[arg(long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Worker count (default: available parallelism)
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Attempts per task [default: 3]
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Base backoff in seconds [default: 0.5]
    #[arg(long)]
    pub backoff_base: Option<f64>,

    /// Jitter bound in seconds [default: 0.25]
    #[arg(long)]
    pub jitter: Option<f64>,

    /// Tasks a worker handles before it is replaced, 0 disables [default: 100]
    #[arg(long)]
    pub max_tasks_per_worker: Option<usize>,

    /// Chat endpoint URL
    #[arg(long, env = "FANOUT_API_URL", default_value = fanout::client::DEFAULT_API_URL)]
    pub api_url: String,

    /// API key
    #[arg(long, env = "CO_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "FANOUT_REQUEST_TIMEOUT_SECS")]
    pub request_timeout: Option<f64>,
}

impl ChatArgs {
    fn call_params(&self) -> Result<CallParams> {
        let mut params = CallParams::new(&self.model)
            .with_messages(self.messages.iter().map(|m| parse_message(m)));

        if let Some(temperature) = self.temperature {
            params = params.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            params = params.with_max_tokens(max_tokens);
        }
        if let Some(seed) = self.seed {
            params = params.with_seed(seed);
        }
        for option in &self.options {
            let (key, value) = parse_option(option)?;
            params = params.with_option(key, value);
        }

        Ok(params)
    }

    fn dispatch_config(&self) -> Result<DispatchConfig> {
        let mut config = DispatchConfig::from_env().context("Invalid dispatch configuration")?;

        if let Some(size) = self.pool_size {
            config.pool = config.pool.with_pool_size(size);
        }
        if let Some(max_tasks) = self.max_tasks_per_worker {
            config.pool = config.pool.with_max_tasks_per_worker(max_tasks);
        }
        if let Some(max_retries) = self.max_retries {
            config.retry = config.retry.with_max_retries(max_retries);
        }
        if let Some(base) = self.backoff_base {
            config.retry = config.retry.with_backoff_base_secs(base);
        }
        if let Some(jitter) = self.jitter {
            config.retry = config.retry.with_jitter_secs(jitter);
        }

        Ok(config)
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(&self.api_key).with_api_url(&self.api_url);
        if let Some(secs) = self.request_timeout {
            let timeout = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid request timeout: {secs}"))?;
            config = config.with_request_timeout(timeout);
        }
        Ok(config)
    }
}

/// "role:content" when the prefix is a known role, otherwise user text
fn parse_message(raw: &str) -> ChatMessage {
    if let Some((role, content)) = raw.split_once(':') {
        if let Ok(role) = role.trim().parse::<MessageRole>() {
            return ChatMessage::new(role, content.trim_start());
        }
    }
    ChatMessage::user(raw)
}

fn parse_option(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got {raw:?}"))?;
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

pub async fn run(args: ChatArgs, output: OutputFormat, quiet: bool) -> Result<()> {
    let params = args.call_params()?;
    let config = args.dispatch_config()?;
    let client = HttpChatClient::new(args.client_config()?)
        .context("Failed to build HTTP client")?;

    tracing::debug!(?config, "Dispatch configuration");

    let (dispatcher, retry) = Dispatcher::from_config(client, config);
    let results = dispatcher.dispatch(args.n, params, retry).await;

    if !output.is_text() {
        return output.print_value(&results);
    }

    for result in &results {
        print_result(result, quiet);
    }

    if !quiet {
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        println!();
        print_field("Succeeded", &succeeded.to_string());
        print_field("Failed", &(results.len() - succeeded).to_string());
    }

    Ok(())
}

fn print_result(result: &TaskResult<Value>, quiet: bool) {
    match (result.value(), result.error()) {
        (Some(value), _) => println!("[{}] OK: {}", result.index, response_text(value)),
        (None, Some(error)) => println!("[{}] FAIL: {}", result.index, error),
        (None, None) => println!("[{}] FAIL", result.index),
    }
    if !quiet {
        println!(
            "    attempts: {}  elapsed: {:.2?}",
            result.attempts, result.elapsed
        );
    }
}

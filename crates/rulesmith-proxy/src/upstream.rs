//! Model endpoint client

use async_trait::async_trait;
use rulesmith_core::{Error, OpenAiAdapter, PromptPayload, Result, RuleCandidate, UpstreamError};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::config::ModelConfig;

/// Largest upstream error body kept for logs and error messages
const MAX_ERROR_BODY: usize = 2048;

const MISSING_KEY: &str = "model API key is not configured; set OPENAI_API_KEY";

/// Turns an assembled prompt into an unvalidated rule candidate
#[async_trait]
pub trait RuleGenerator: Send + Sync {
    /// Fail fast when the generator cannot serve requests at all
    fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn generate(&self, payload: &PromptPayload) -> Result<RuleCandidate>;

    /// Model identifier for logs
    fn model(&self) -> &str;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    adapter: OpenAiAdapter,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.chat_completions_url(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            adapter: OpenAiAdapter::with_settings(
                config.model.clone(),
                config.temperature,
                config.frequency_penalty,
            ),
            timeout: config.timeout(),
        })
    }

    async fn call(&self, api_key: &str, payload: &PromptPayload) -> Result<RuleCandidate> {
        let request = self.adapter.build_request(payload);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited.into());
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            }
            .into());
        }

        Ok(self.adapter.parse_response(&body)?)
    }

    fn transport_error(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl RuleGenerator for OpenAiGenerator {
    fn ready(&self) -> Result<()> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(Error::config(MISSING_KEY)),
        }
    }

    async fn generate(&self, payload: &PromptPayload) -> Result<RuleCandidate> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(Error::config(MISSING_KEY));
        };

        debug!(
            "Calling {} with model {} ({} media parts)",
            self.endpoint,
            self.adapter.model(),
            payload.media_count()
        );

        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.call(api_key, payload)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout).into()),
        };
        let elapsed = start.elapsed();

        metrics::histogram!("rulesmith_upstream_latency_ms").record(elapsed.as_secs_f64() * 1000.0);

        if let Err(Error::Upstream(e)) = &result {
            error!("Model call failed after {:?}: {}", elapsed, e);
            metrics::counter!("rulesmith_upstream_errors_total", "kind" => e.label()).increment(1);
        }

        result
    }

    fn model(&self) -> &str {
        self.adapter.model()
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

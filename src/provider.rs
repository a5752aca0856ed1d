//! AI provider abstraction and implementations.
//!
//! Defines the [`AiProvider`] trait and concrete backends:
//! - **[`DisabledProvider`]**: returns errors; used when no provider is configured.
//! - **[`OpenAiProvider`]**: chat completions API, `OPENAI_API_KEY`.
//! - **[`AnthropicProvider`]**: messages API, `ANTHROPIC_API_KEY`.
//!
//! # Retry Strategy
//!
//! Both HTTP providers retry transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Provider fallback (primary → configured fallback, once) lives in the
//! augmenter, not here.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::models::{Completion, Sentiment, Usage};

/// A single completion request handed to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn from_config(prompt: String, config: &ProviderConfig) -> Self {
        Self {
            prompt,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// An opaque generative-model collaborator.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider identifier used in logs ("openai", "anthropic", ...).
    fn name(&self) -> &str;

    /// Generate a completion for the prompt.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Classify the sentiment of a text. Consumed by a neighboring
    /// feature; implemented as a JSON-instructed completion.
    async fn analyze_sentiment(&self, text: &str) -> Result<Sentiment> {
        let request = CompletionRequest {
            prompt: format!(
                "Classify the sentiment of the following text. Respond with only a JSON \
                 object of the form {{\"sentiment\": \"positive|neutral|negative\", \
                 \"rating\": 1-5, \"confidence\": 0.0-1.0}}.\n\nText: {}",
                text
            ),
            model: String::new(),
            temperature: 0.0,
            max_tokens: 64,
        };
        let completion = self.complete(&request).await?;
        parse_sentiment(&completion.content)
    }
}

fn parse_sentiment(content: &str) -> Result<Sentiment> {
    // Models sometimes wrap JSON in prose or code fences; take the first
    // object-shaped slice.
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => bail!("no JSON object in sentiment response"),
    };
    let value: serde_json::Value = serde_json::from_str(json)?;
    Ok(Sentiment {
        sentiment: value
            .get("sentiment")
            .and_then(|v| v.as_str())
            .unwrap_or("neutral")
            .to_string(),
        rating: value.get("rating").and_then(|v| v.as_u64()).unwrap_or(3) as u8,
        confidence: value
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32,
    })
}

/// Instantiate a provider by name from configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Box<dyn AiProvider>> {
    match name {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "anthropic" => Ok(Box::new(AnthropicProvider::new(config)?)),
        other => bail!("Unknown AI provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op provider that always fails; used when generation is not
/// configured.
pub struct DisabledProvider;

#[async_trait]
impl AiProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        bail!("AI provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Chat-completions provider. Requires the `OPENAI_API_KEY` environment
/// variable.
pub struct OpenAiProvider {
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            url: config
                .openai_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let json = post_with_retries(
            &self.url,
            &body,
            &[("Authorization", format!("Bearer {}", api_key))],
            self.timeout_secs,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Completion> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?
        .to_string();

    Ok(Completion {
        content,
        usage: parse_usage(json.get("usage"), "prompt_tokens", "completion_tokens"),
    })
}

// ============ Anthropic Provider ============

/// Messages-API provider. Requires the `ANTHROPIC_API_KEY` environment
/// variable.
pub struct AnthropicProvider {
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            bail!("ANTHROPIC_API_KEY environment variable not set");
        }
        Ok(Self {
            url: config
                .anthropic_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
        });

        let json = post_with_retries(
            &self.url,
            &body,
            &[
                ("x-api-key", api_key),
                ("anthropic-version", "2023-06-01".to_string()),
            ],
            self.timeout_secs,
            self.max_retries,
            "Anthropic",
        )
        .await?;

        parse_anthropic_response(&json)
    }
}

fn parse_anthropic_response(json: &serde_json::Value) -> Result<Completion> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        })
        .and_then(|b| b.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Anthropic response: missing text block"))?
        .to_string();

    Ok(Completion {
        content,
        usage: parse_usage(json.get("usage"), "input_tokens", "output_tokens"),
    })
}

// ============ Shared HTTP plumbing ============

fn parse_usage(usage: Option<&serde_json::Value>, prompt_key: &str, completion_key: &str) -> Usage {
    let get = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    };
    Usage {
        prompt_tokens: get(prompt_key),
        completion_tokens: get(completion_key),
    }
}

/// POST a JSON body with exponential-backoff retries on 429/5xx/network
/// errors; other client errors fail immediately.
async fn post_with_retries(
    url: &str,
    body: &serde_json::Value,
    headers: &[(&str, String)],
    timeout_secs: u64,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(label, attempt, delay_secs = delay.as_secs(), "retrying provider call");
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).header("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.header(*name, value);
        }

        match req.json(body).send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    warn!(label, status = status.as_u16(), "provider returned retryable error");
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} completion failed after retries", label)))
}

//! Research provider
//!
//! The discovery agent only needs "prompt in, text plus token usage out".
//! [`HttpResearchProvider`] speaks a Messages-style LLM API; tests swap in
//! scripted implementations of [`ResearchProvider`].

use async_trait::async_trait;
use pawmap_common::config::ProviderConfig;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Longest error body kept in [`ProviderError::Api`]
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Text returned by a provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
    pub tokens_used: u64,
}

/// Provider call failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Provider rejected credentials: {0}")]
    Auth(String),

    #[error("Provider rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Client(_) | Self::Auth(_) | Self::InvalidResponse(_) => false,
        }
    }

    /// Server-suggested wait before retrying, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Text-generation backend used by the discovery agent
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Run one prompt
    async fn research(&self, prompt: &str) -> Result<ProviderResponse, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Messages-style HTTP provider
pub struct HttpResearchProvider {
    client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
    base_url: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpResearchProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));

        let client = reqwest::Client::builder()
            .user_agent(concat!("pawmap-discovery/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_minute(per_minute));

        Ok(Self {
            client,
            rate_limiter,
            base_url: config.base_url.clone(),
            api_key,
            api_version: config.api_version.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ResearchProvider for HttpResearchProvider {
    async fn research(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        self.rate_limiter.until_ready().await;

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending research request");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text, retry_after));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(into_provider_response(parsed))
    }
}

fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(truncate(body)),
        429 => ProviderError::RateLimited { retry_after },
        _ => ProviderError::Api {
            status,
            body: truncate(body),
        },
    }
}

fn into_provider_response(parsed: MessagesResponse) -> ProviderResponse {
    let text = parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    let tokens_used = parsed
        .usage
        .map(|u| u.input_tokens + u.output_tokens)
        .unwrap_or(0);

    ProviderResponse { text, tokens_used }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

//! Claude API integration.
//!
//! Implements [`GenerationProvider`] over the Messages API, both single-shot
//! and streamed.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{AIError, ChunkStream, GenerationProvider, Prompt};
use crate::core::AiConfig;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Claude API provider.
pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    ///
    /// Reads API key from ANTHROPIC_API_KEY environment variable.
    pub fn new() -> Result<Self, AIError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AIError::ProviderNotAvailable("ANTHROPIC_API_KEY not set".into()))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
        })
    }

    /// Create from the `[ai]` config section.
    pub fn from_config(config: &AiConfig) -> Result<Self, AIError> {
        let mut provider = Self::new()?;
        if let Some(model) = &config.model {
            provider = provider.with_model(model);
        }
        provider.max_tokens = config.max_tokens;
        provider.client = Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| AIError::ApiError(format!("Failed to build HTTP client: {e}")))?;
        Ok(provider)
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn send(&self, prompt: &Prompt, stream: bool) -> Result<Response, AIError> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &prompt.system,
            messages: vec![Message { role: "user", content: &prompt.user }],
            stream,
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AIError::ApiError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(AIError::RateLimited(retry_after));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AIError::ApiError(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationProvider for ClaudeProvider {
    async fn generate(&self, prompt: &Prompt) -> Result<String, AIError> {
        let response: ClaudeResponse = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| AIError::ApiError(e.to_string()))?;

        let text: String = response.content.into_iter().filter_map(|c| c.text).collect();
        if text.is_empty() {
            return Err(AIError::NoContent);
        }
        Ok(text)
    }

    async fn stream(&self, prompt: &Prompt) -> Result<ChunkStream, AIError> {
        let response = self.send(prompt, true).await?;
        tracing::debug!(model = %self.model, "Streaming response started");

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| AIError::Stream(e.to_string())));
        Ok(chunks.boxed())
    }

    fn name(&self) -> &str {
        "claude"
    }
}

/// Claude API request structure.
#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Message in a Claude request.
#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Claude API response structure.
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ContentBlock>,
}

/// Content block in a Claude response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

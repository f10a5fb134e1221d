//! Generation collaborators.
//!
//! A [`GenerationProvider`] turns a prompt into text, either in one piece or
//! as a stream of response chunks. Everything built on top treats provider
//! output as untrusted: it is decoded by [`stream`], then validated before
//! it touches a request.
//!
//! ## Consumers
//!
//! - [`ImpactScorer`] - tier-1 impact assessment at intake
//! - [`RequestRouter`] - owner, complexity and duplicate alert at intake
//! - [`DocumentGenerator`] - the three scoping documents, streamed in order

#[cfg(feature = "remote")]
mod claude;
mod documents;
mod routing;
mod scoring;
pub mod stream;

#[cfg(feature = "remote")]
pub use claude::ClaudeProvider;
pub use documents::{DocumentGenerator, GenerationProgress};
pub use routing::{RequestRouter, RoutingDecision};
pub use scoring::ImpactScorer;
pub use stream::{decode_stream, extract_json, DecodeOptions, StreamDecoder};

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::workflow::ValidationError;

/// Response body chunks as they arrive.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, AIError>>;

/// A prompt with its system instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self { system: system.into(), user: user.into() }
    }
}

/// Trait for text-generation providers.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a complete response.
    async fn generate(&self, prompt: &Prompt) -> Result<String, AIError>;

    /// Start a streamed response.
    async fn stream(&self, prompt: &Prompt) -> Result<ChunkStream, AIError>;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// AI error types.
#[derive(Debug, thiserror::Error)]
pub enum AIError {
    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("No content in response")]
    NoContent,

    #[error("Response is not valid JSON: {message}")]
    Parse { message: String, excerpt: String },

    #[error("Generated output failed validation: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

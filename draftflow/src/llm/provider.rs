//! The external generation service contract.

use crate::errors::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Completion token cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object.
    #[serde(default)]
    pub json_mode: bool,
    /// Schema the JSON response must satisfy.
    #[serde(default)]
    pub schema: Option<Value>,
}

/// What the provider returns for a successful request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Raw completion text.
    pub text: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Completion tokens produced.
    pub completion_tokens: u64,
    /// Provider-side latency.
    pub latency_ms: u64,
}

impl ProviderResponse {
    /// A response with the given text and no usage figures.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sets token usage.
    #[must_use]
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        self
    }
}

/// A text-generation backend.
///
/// Implementations map transport failures onto the [`GenerationError`]
/// taxonomy: timeouts to `Timeout`, HTTP 429 to `RateLimited`, other
/// failures to `Provider` with `retryable` set for 5xx or status-less errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Executes a single request. No retries.
    async fn generate(&self, request: &GenerationRequest) -> Result<ProviderResponse, GenerationError>;
}

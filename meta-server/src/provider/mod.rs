//! Text-generation capability used by the analyzer.
//!
//! The analyzer only needs prompt-in, text-out. [`Provider`] is the seam
//! between the analysis pipeline and a concrete LLM API, so tests can swap
//! in a deterministic stub.

mod gemini;

pub use gemini::GeminiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for LLM providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Broad failure category, used by callers to decide how to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// No credential available
    Unconfigured,
    /// The request never got an HTTP answer
    Transport,
    /// The API answered with an error
    Api,
    /// The API answered with something we could not read
    Decode,
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub(crate) fn new(
        provider: &str,
        model: &str,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Unified chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Temperature (0.0 - 1.0); provider default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ChatRequest {
    /// Single-turn request with one user message.
    pub fn user(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message {
                role: "user".into(),
                content: prompt.into(),
            }],
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Unified chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response content
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

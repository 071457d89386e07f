//! Google Gemini provider.
//!
//! Calls the Generative Language REST API. The key is sent in the
//! `x-goog-api-key` header so it never appears in URLs or error messages.

use super::{ChatRequest, ChatResponse, Provider, ProviderError, ProviderErrorKind, TokenUsage};
use async_trait::async_trait;
use meta_common::config::AnalyzerConfig;
use meta_common::util::trim_base_url;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Public endpoint of the Generative Language API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const PROVIDER: &str = "gemini";

/// Gemini provider authenticated with an API key.
pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<i64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<i64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<i64>,
}

impl GeminiProvider {
    /// Create a provider against the public API.
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, Duration::from_secs(120))
    }

    /// Create a provider against a custom endpoint.
    pub fn with_base_url(api_key: Option<&str>, base_url: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key
                .filter(|k| !k.trim().is_empty())
                .map(String::from),
            base_url: trim_base_url(base_url).to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a provider from the analyzer configuration section.
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::with_base_url(
            config.api_key.as_deref(),
            config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Whether an API key is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        let model_name = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/v1beta/{model_name}:generateContent", self.base_url)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let model = request.model.clone();

        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::new(
                PROVIDER,
                &model,
                ProviderErrorKind::Unconfigured,
                "Gemini API key not found. Set GEMINI_API_KEY.",
            )
        })?;

        let contents: Vec<Content> = request
            .messages
            .iter()
            .map(|msg| Content {
                role: msg.role.clone(),
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        let gemini_request = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        let response = self
            .client
            .post(self.endpoint(&model))
            .header("x-goog-api-key", api_key)
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(
                    PROVIDER,
                    &model,
                    ProviderErrorKind::Transport,
                    format!("Request failed: {}", e.without_url()),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                PROVIDER,
                &model,
                ProviderErrorKind::Api,
                format!("API error ({}): {}", status.as_u16(), error_text),
            )
            .with_status(status.as_u16()));
        }

        let result: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                PROVIDER,
                &model,
                ProviderErrorKind::Decode,
                format!("Failed to parse response: {}", e.without_url()),
            )
        })?;

        if let Some(err) = result.error {
            return Err(ProviderError::new(
                PROVIDER,
                &model,
                ProviderErrorKind::Api,
                format!("API error: {}", err.message),
            ));
        }

        let candidate = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| {
                ProviderError::new(
                    PROVIDER,
                    &model,
                    ProviderErrorKind::Decode,
                    "No response from Gemini",
                )
            })?;

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::new(
                PROVIDER,
                &model,
                ProviderErrorKind::Decode,
                format!(
                    "Empty response from Gemini (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        let usage = result
            .usage_metadata
            .map_or(TokenUsage::default(), |u| TokenUsage {
                input_tokens: u.prompt_token_count.unwrap_or(0),
                output_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            });

        Ok(ChatResponse {
            provider: PROVIDER.into(),
            model,
            content,
            usage,
            finish_reason: candidate.finish_reason,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

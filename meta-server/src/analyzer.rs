//! Analyzer client.
//!
//! Builds the comparison prompt for two schema versions and sends it to the
//! text-generation provider. The reply is returned untouched; turning it into
//! a verdict is [`crate::verdict`]'s job.

use crate::provider::{ChatRequest, GeminiProvider, Provider, ProviderError, ProviderErrorKind};
use meta_common::config::AnalyzerConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The capability could not be reached, is not configured, or timed out.
    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),

    /// The capability answered with an error.
    #[error("Analyzer error: {0}")]
    Upstream(String),
}

impl From<ProviderError> for AnalyzerError {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::Unconfigured | ProviderErrorKind::Transport => {
                Self::Unavailable(err.to_string())
            }
            ProviderErrorKind::Api | ProviderErrorKind::Decode => Self::Upstream(err.to_string()),
        }
    }
}

/// Build the comparison prompt. Both schemas are embedded verbatim.
pub fn build_prompt(old_schema: &str, new_schema: &str) -> String {
    format!(
        r#"Act as a Data Engineer. Compare these two JSON schemas.

Old: {old_schema}
New: {new_schema}

Task:
1. Detect breaking changes (e.g., type changes, removed fields).
2. Summarize the intent of the change.

Return a JSON object with:
- "is_breaking": true/false
- "summary": "Short explanation of changes"
- "changes": ["List", "of", "specific", "changes"]
"#
    )
}

/// Sampling temperature for schema comparisons.
pub const ANALYSIS_TEMPERATURE: f64 = 0.2;

/// Sends schema comparisons to a text-generation provider.
#[derive(Clone)]
pub struct AnalyzerClient {
    provider: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
}

impl AnalyzerClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout,
        }
    }

    /// Build a Gemini-backed client, or `None` when no API key is configured.
    pub fn from_config(config: &AnalyzerConfig) -> Option<Self> {
        let provider = GeminiProvider::from_config(config);
        if !provider.has_api_key() {
            return None;
        }
        Some(Self::new(
            Arc::new(provider),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the provider to compare two schema versions and return its raw reply.
    pub async fn analyze(&self, old_schema: &str, new_schema: &str) -> Result<String, AnalyzerError> {
        let request = ChatRequest::user(&self.model, build_prompt(old_schema, new_schema))
            .with_temperature(ANALYSIS_TEMPERATURE);

        let response = tokio::time::timeout(self.timeout, self.provider.chat(request))
            .await
            .map_err(|_| {
                AnalyzerError::Unavailable(format!(
                    "{} did not answer within {}s",
                    self.provider.name(),
                    self.timeout.as_secs()
                ))
            })??;

        tracing::debug!(
            provider = %response.provider,
            model = %response.model,
            latency_ms = response.latency_ms,
            output_tokens = response.usage.output_tokens,
            "Analyzer call completed"
        );

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and replies with a canned result.
    struct StubProvider {
        reply: Result<String, ProviderErrorKind>,
        delay: Duration,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl StubProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(kind: ProviderErrorKind) -> Self {
            Self {
                reply: Err(kind),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(text) => Ok(ChatResponse {
                    provider: "stub".into(),
                    model: request.model,
                    content: text.clone(),
                    usage: TokenUsage::default(),
                    finish_reason: None,
                    latency_ms: 0,
                }),
                Err(kind) => Err(ProviderError::new("stub", &request.model, *kind, "boom")),
            }
        }
    }

    #[test]
    fn prompt_embeds_schemas_verbatim() {
        let prompt = build_prompt(r#"{"id": 1}"#, "not json at all");
        assert!(prompt.contains(r#"Old: {"id": 1}"#));
        assert!(prompt.contains("New: not json at all"));
        assert!(prompt.contains("\"is_breaking\""));
        assert!(prompt.contains("\"summary\""));
        assert!(prompt.contains("\"changes\""));
        assert!(prompt.starts_with("Act as a Data Engineer"));
    }

    #[tokio::test]
    async fn analyze_returns_raw_text() {
        let stub = Arc::new(StubProvider::replying("```json\n{}\n```"));
        let client = AnalyzerClient::new(stub.clone(), "m", Duration::from_secs(1));

        let raw = client.analyze("", "").await.unwrap();
        assert_eq!(raw, "```json\n{}\n```");
        let requests = stub.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "m");
        assert_eq!(requests[0].temperature, Some(ANALYSIS_TEMPERATURE));
        assert!(requests[0].messages[0].content.starts_with("Act as a Data Engineer"));
    }

    #[tokio::test]
    async fn transport_failure_is_unavailable() {
        let client = AnalyzerClient::new(
            Arc::new(StubProvider::failing(ProviderErrorKind::Transport)),
            "m",
            Duration::from_secs(1),
        );
        let err = client.analyze("a", "b").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Unavailable(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn api_failure_is_upstream() {
        let client = AnalyzerClient::new(
            Arc::new(StubProvider::failing(ProviderErrorKind::Api)),
            "m",
            Duration::from_secs(1),
        );
        assert!(matches!(
            client.analyze("a", "b").await,
            Err(AnalyzerError::Upstream(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_unavailable() {
        let stub = StubProvider {
            delay: Duration::from_secs(30),
            ..StubProvider::replying("late")
        };
        let client = AnalyzerClient::new(Arc::new(stub), "m", Duration::from_secs(5));

        let err = client.analyze("a", "b").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Unavailable(ref m) if m.contains("5s")));
    }

    #[test]
    fn from_config_requires_key() {
        assert!(AnalyzerClient::from_config(&AnalyzerConfig::default()).is_none());

        let config = AnalyzerConfig {
            api_key: Some("key".into()),
            ..AnalyzerConfig::default()
        };
        let client = AnalyzerClient::from_config(&config).unwrap();
        assert_eq!(client.provider_name(), "gemini");
        assert_eq!(client.model(), "gemini-2.0-flash");
    }
}

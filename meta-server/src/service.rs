//! Analysis service.
//!
//! Orchestrates one schema comparison:
//!
//! ```text
//! request → config check → analyzer → normalize → store (best-effort) → verdict
//! ```
//!
//! Only the first two steps can fail. Normalization is total and persistence
//! problems are logged and absorbed.

use crate::analyzer::{AnalyzerClient, AnalyzerError};
use crate::store::{AnalysisRecord, AnalysisStore, SaveOutcome, HISTORY_LIMIT};
use crate::verdict::{normalize_with_path, Normalization, Verdict};
use meta_common::config::Config;
use meta_common::util::truncate_with_ellipsis;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two schema versions to compare. Neither needs to be valid JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaPair {
    pub old_schema: String,
    pub new_schema: String,
}

/// Errors that end an analyze request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required credential is absent.
    #[error("{0}")]
    Configuration(String),

    /// The analyzer could not produce a reply.
    #[error("{0}")]
    AnalysisFailed(#[from] AnalyzerError),
}

impl AnalysisError {
    /// HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        500
    }
}

/// The schema change analysis pipeline.
pub struct AnalysisService {
    analyzer: Option<AnalyzerClient>,
    store: AnalysisStore,
}

impl AnalysisService {
    pub fn new(analyzer: Option<AnalyzerClient>, store: AnalysisStore) -> Self {
        Self { analyzer, store }
    }

    /// Wire the Gemini analyzer and configured store from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            AnalyzerClient::from_config(&config.analyzer),
            AnalysisStore::from_config(config),
        )
    }

    pub fn analyzer_configured(&self) -> bool {
        self.analyzer.is_some()
    }

    pub fn store_configured(&self) -> bool {
        self.store.is_configured()
    }

    /// Analyze a schema change and persist the result when possible.
    pub async fn handle_analyze(&self, pair: &SchemaPair) -> Result<Verdict, AnalysisError> {
        tracing::info!(
            old_len = pair.old_schema.len(),
            new_len = pair.new_schema.len(),
            "Received analysis request"
        );

        let Some(analyzer) = self.analyzer.as_ref() else {
            tracing::error!("Missing analyzer API key");
            return Err(AnalysisError::Configuration(
                "Server missing Gemini API Key".to_string(),
            ));
        };

        tracing::info!(
            provider = analyzer.provider_name(),
            model = analyzer.model(),
            "Calling analyzer"
        );
        let raw = analyzer
            .analyze(&pair.old_schema, &pair.new_schema)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Analyzer call failed");
                AnalysisError::from(e)
            })?;
        tracing::info!(preview = %truncate_with_ellipsis(&raw, 50), "Analyzer responded");

        let (verdict, path) = normalize_with_path(&raw);
        if path == Normalization::Fallback {
            tracing::warn!(
                is_breaking = verdict.is_breaking,
                "Analyzer reply was not a JSON object, inferred verdict from text"
            );
        }

        match self
            .store
            .save(&pair.old_schema, &pair.new_schema, &verdict)
            .await
        {
            SaveOutcome::Saved(record) => {
                tracing::info!(id = record.id, "Saved analysis");
            }
            SaveOutcome::Skipped(reason) => {
                tracing::warn!(reason = %reason, "Analysis not persisted");
            }
        }

        Ok(verdict)
    }

    /// Recent analyses, newest first. Never fails.
    pub async fn handle_history(&self, limit: usize) -> Vec<AnalysisRecord> {
        self.store.list_recent(limit).await
    }

    /// History with the default cap.
    pub async fn recent_history(&self) -> Vec<AnalysisRecord> {
        self.handle_history(HISTORY_LIMIT).await
    }
}

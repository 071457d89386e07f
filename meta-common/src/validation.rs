//! Configuration validation.
//!
//! Checks that configured values are within valid ranges before the server
//! starts. Missing credentials are not validation errors: they disable the
//! corresponding feature instead.

use thiserror::Error;

use crate::config::{AnalyzerConfig, Config, ObservabilityConfig, ServerConfig, StoreConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.server.validate(),
            self.analyzer.validate(),
            self.store.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidValue {
                field: "server.port".into(),
                reason: "must be between 1 and 65535".into(),
            });
        }
        if self.body_limit_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "server.body_limit_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for AnalyzerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "analyzer.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "analyzer.model".into(),
                reason: "must not be empty".into(),
            });
        }
        if let Some(ref base_url) = self.base_url {
            check_url("analyzer.base_url", base_url)?;
        }
        Ok(())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(ref url) = self.supabase_url {
            check_url("store.supabase_url", url)?;
        }
        if self.table.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "store.table".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

fn check_url(field: &str, value: &str) -> ValidationResult<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: e.to_string(),
        }),
    }
}

//! Error types shared by the analyzer crates.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for backend integrations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// External service could not be reached
    #[error("External service error: {0}")]
    External(String),

    /// External service answered but refused or mangled the operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether retrying later could plausibly succeed.
    ///
    /// Connection failures and timeouts are transient; rejected writes,
    /// decode failures and misconfiguration are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::External(_) | Self::Timeout | Self::Io(_) => true,
            Self::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::External(_) => 502,
            Self::Timeout => 504,
            _ => 500,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

//! Meta Common - Shared configuration, errors, and logging for the metadata
//! schema analyzer.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and request context
//! - Small string helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{AnalyzerConfig, Config, ObservabilityConfig, ServerConfig, StoreConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::{init_logging, RequestContext};
    pub use crate::validation::{Validate, ValidationError};
}

//! Configuration management for the metadata analyzer.
//!
//! The service reads an optional configuration file at `~/.metalyzer/config.json`
//! once at startup and then applies environment overrides. The resulting
//! [`Config`] is passed explicitly to every component.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Analyzer
//! - `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) → analyzer.api_key
//! - `META_ANALYZER_MODEL` → analyzer.model
//! - `META_ANALYZER_TIMEOUT_SECS` → analyzer.timeout_secs
//!
//! ## Store
//! - `SUPABASE_URL` → store.supabase_url
//! - `SUPABASE_KEY` → store.supabase_key
//! - `META_SQLITE_PATH` → store.sqlite_path
//!
//! ## Server
//! - `META_PORT` → server.port
//! - `META_BIND_ADDRESS` → server.host
//! - `META_LOG_LEVEL` → observability.log_level
//! - `META_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".metalyzer"),
        |dirs| dirs.home_dir().join(".metalyzer"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "0.0.0.0"
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port. Default: 8000
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_body_limit() -> usize {
    1024 * 1024
}

// ============================================================================
// Analyzer Configuration
// ============================================================================

/// Text-generation capability used to compare schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Gemini API key. Analysis is disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Override for the Generative Language API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Upper bound on a single analyzer call
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: None,
            timeout_secs: default_analyzer_timeout(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_analyzer_timeout() -> u64 {
    60
}

// ============================================================================
// Store Configuration
// ============================================================================

/// Durable record store. Every field is optional; with nothing set the
/// service runs without persistence or history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Supabase project URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,

    /// Supabase service or anon key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_key: Option<String>,

    /// Table holding analysis records
    #[serde(default = "default_table")]
    pub table: String,

    /// Local SQLite database, used when Supabase is not configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            table: default_table(),
            sqlite_path: None,
        }
    }
}

fn default_table() -> String {
    "metadata_analyses".to_string()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Empty values are ignored so that `KEY=` in a shell does not count as
    /// a configured credential.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")) {
            self.analyzer.api_key = Some(key);
        }
        if let Some(model) = var("META_ANALYZER_MODEL") {
            self.analyzer.model = model;
        }
        if let Some(secs) = var("META_ANALYZER_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.analyzer.timeout_secs = secs;
        }

        if let Some(url) = var("SUPABASE_URL") {
            self.store.supabase_url = Some(url);
        }
        if let Some(key) = var("SUPABASE_KEY") {
            self.store.supabase_key = Some(key);
        }
        if let Some(path) = var("META_SQLITE_PATH") {
            self.store.sqlite_path = Some(PathBuf::from(path));
        }

        if let Some(port) = var("META_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(host) = var("META_BIND_ADDRESS") {
            self.server.host = host;
        }

        if let Some(level) = var("META_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = var("META_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Whether a non-empty analyzer credential is present.
    pub fn analyzer_configured(&self) -> bool {
        non_empty(self.analyzer.api_key.as_deref()).is_some()
    }

    /// Whether both Supabase URL and key are present.
    pub fn supabase_configured(&self) -> bool {
        non_empty(self.store.supabase_url.as_deref()).is_some()
            && non_empty(self.store.supabase_key.as_deref()).is_some()
    }

    /// Whether any store backend is configured.
    pub fn store_configured(&self) -> bool {
        self.supabase_configured() || self.store.sqlite_path.is_some()
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

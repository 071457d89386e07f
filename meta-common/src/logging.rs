//! Logging utilities.
//!
//! Provides structured logging (pretty or JSON) with trace IDs for request
//! correlation.
//!
//! # Noise Filtering
//!
//! By default, noisy library modules (hyper, reqwest, h2, rustls, tokio_util)
//! are set to `warn` level so that analysis pipeline logs stay readable.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Header carrying the trace ID between caller and service.
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Default noisy modules that should be filtered to warn level.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tokio_util",
    "tower_http",
];

/// Build the filter directives for a base level with noise suppression.
fn build_directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    directives
}

/// Build the default EnvFilter with noise suppression.
///
/// `RUST_LOG` wins when set.
fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(build_directives(log_level))
}

/// Initialize logging with the given configuration.
///
/// # Arguments
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - Output format: "json" for structured JSON, "pretty" for human-readable
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Generate a new trace ID for request tracing.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Request Context
// ============================================================================

/// Per-request context for log correlation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace ID, propagated from the caller when present
    pub trace_id: String,
    /// Service name
    pub service: String,
}

impl RequestContext {
    /// Create a new request context with a fresh trace ID.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            trace_id: generate_trace_id(),
            service: service.into(),
        }
    }

    /// Create context from HTTP headers, reusing the caller's trace ID.
    pub fn from_headers(headers: &http::HeaderMap, service: impl Into<String>) -> Self {
        let trace_id = headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(generate_trace_id);

        Self {
            trace_id,
            service: service.into(),
        }
    }

    /// Add context to HTTP headers for propagation.
    pub fn to_headers(&self, headers: &mut http::HeaderMap) {
        if let Ok(trace_id) = self.trace_id.parse() {
            headers.insert(TRACE_ID_HEADER, trace_id);
        }
    }

    /// Span wrapping all logs for this request.
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "request",
            operation,
            trace_id = %self.trace_id,
            service = %self.service
        )
    }
}

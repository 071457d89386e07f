//! Meta Server - breaking-change analysis for metadata schemas.
//!
//! This crate compares two versions of a metadata/JSON schema with an LLM,
//! normalizes the reply into a structured verdict, and keeps a history of
//! past analyses:
//! - Analyzer client over a pluggable text-generation provider (Gemini)
//! - Total verdict normalization with keyword fallback
//! - Best-effort persistence (Supabase or SQLite)
//! - HTTP API with health, history, and analyze endpoints
//!
//! ## Architecture
//!
//! ```text
//! Client → routes → AnalysisService → AnalyzerClient → Provider
//!                         ↓
//!                  normalize → AnalysisStore
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analyzer;
pub mod provider;
pub mod routes;
pub mod service;
pub mod store;
pub mod verdict;

pub use analyzer::{AnalyzerClient, AnalyzerError};
pub use provider::{ChatRequest, ChatResponse, GeminiProvider, Provider, ProviderError, ProviderErrorKind};
pub use service::{AnalysisError, AnalysisService, SchemaPair};
pub use store::{AnalysisRecord, AnalysisStore, RecordBackend, SaveOutcome, SkipReason};
pub use verdict::{normalize, Verdict};

use axum::Router;
use meta_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Build the router with all routes and middleware from configuration.
pub fn build_router(config: &Config) -> Router {
    let service = Arc::new(AnalysisService::from_config(config));
    build_router_with_service(service, config.server.body_limit_bytes)
}

/// Build the router around an existing service.
pub fn build_router_with_service(service: Arc<AnalysisService>, body_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_routes(service)
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(cors)
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let service = Arc::new(AnalysisService::from_config(config));
    tracing::info!(
        analyzer_configured = service.analyzer_configured(),
        store_configured = service.store_configured(),
        "Analysis service ready"
    );
    if !service.analyzer_configured() {
        tracing::warn!("GEMINI_API_KEY not set, /analyze will return errors");
    }

    let router = build_router_with_service(service, config.server.body_limit_bytes);

    tracing::info!("Starting Meta Server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

//! Route definitions for the analyzer service.
//!
//! Provides the analyze, history, and health endpoints. Every route is
//! served both at the root and under `/api`.

use crate::service::{AnalysisError, AnalysisService, SchemaPair};
use crate::store::AnalysisRecord;
use crate::verdict::Verdict;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use meta_common::logging::RequestContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

const SERVICE_NAME: &str = "meta-server";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub analyzer_configured: bool,
    pub store_configured: bool,
    pub version: String,
    pub service: String,
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Build all routes over the given service.
pub fn build_routes(service: Arc<AnalysisService>) -> Router {
    let api = Router::new()
        .route("/health", get(health_handler))
        .route("/analyses", get(list_analyses_handler))
        .route("/analyze", post(analyze_handler))
        .with_state(AppState { service });

    Router::new().merge(api.clone()).nest("/api", api)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Health check. Reports configuration, never fails.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        analyzer_configured: state.service.analyzer_configured(),
        store_configured: state.service.store_configured(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: SERVICE_NAME.into(),
    })
}

/// Recent analyses, newest first. Empty on any failure.
async fn list_analyses_handler(State(state): State<AppState>) -> Json<Vec<AnalysisRecord>> {
    Json(state.service.recent_history().await)
}

/// Analyze a schema change.
async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(pair): Json<SchemaPair>,
) -> (HeaderMap, Result<Json<Verdict>, AnalysisError>) {
    let ctx = RequestContext::from_headers(&headers, SERVICE_NAME);

    let result = state
        .service
        .handle_analyze(&pair)
        .instrument(ctx.span("analyze"))
        .await
        .map(Json);

    let mut response_headers = HeaderMap::new();
    ctx.to_headers(&mut response_headers);
    (response_headers, result)
}

//! Cache HTTP API.
//!
//! - POST /v1/query       — serve a query through the tiers
//! - POST /v1/invalidate  — drop one descriptor's entry from hot and warm
//! - GET  /v1/cache/stats — tier occupancy and hit counters
//! - GET  /health

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::cache::entry::Origin;
use crate::cache::orchestrator::{CacheError, CacheStats, Orchestrator};
use crate::config::Config;
use crate::query::QueryDescriptor;
use crate::table::ResultTable;

/// Application state shared across handlers.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/query", post(run_query))
        .route("/v1/invalidate", post(invalidate))
        .route("/v1/cache/stats", get(cache_stats))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Freshness indicator returned with every result.
#[derive(Debug, Serialize)]
pub struct FreshnessTag {
    pub origin: Origin,
    pub age_secs: u64,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub freshness: FreshnessTag,
    pub row_count: usize,
    pub table: ResultTable,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub invalidated: bool,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps cache errors onto HTTP statuses: a malformed descriptor is the
/// caller's fault, everything else is "data unavailable".
struct ApiError(CacheError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CacheError::Key(_) => StatusCode::BAD_REQUEST,
            CacheError::Cold(_) | CacheError::FetchAborted => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        Self(err)
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(descriptor): Json<QueryDescriptor>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    info!(
        request_id,
        dataset = descriptor.dataset,
        filters = descriptor.filters.len(),
        "Query request"
    );

    let outcome = state.orchestrator.get(&descriptor).await?;

    info!(
        request_id,
        origin = %outcome.origin,
        rows = outcome.table.num_rows(),
        age_secs = outcome.age.as_secs(),
        "Query served"
    );

    Ok(Json(QueryResponse {
        freshness: FreshnessTag {
            origin: outcome.origin,
            age_secs: outcome.age.as_secs(),
            stale: outcome.stale,
            warning: outcome.warning,
        },
        row_count: outcome.table.num_rows(),
        table: (*outcome.table).clone(),
    }))
}

async fn invalidate(
    State(state): State<Arc<AppState>>,
    Json(descriptor): Json<QueryDescriptor>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    state.orchestrator.invalidate(&descriptor).await?;
    Ok(Json(InvalidateResponse { invalidated: true }))
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.orchestrator.stats())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cache: state.orchestrator.stats(),
    })
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::error::AppError;
use crate::publish::HotCache;
use crate::types::{Platform, COMBINED_MARKETS_KEY, COMBINED_SUMMARY_KEY};

/// Read-only view over the hot cache. Never triggers ingestion.
#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<dyn HotCache>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/summary", get(get_combined_summary))
        .route("/v1/summary/:platform", get(get_platform_summary))
        .route("/v1/markets", get(get_combined_markets))
        .route("/v1/markets/:platform", get(get_platform_markets))
        .route("/healthz", get(healthz))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_combined_summary(State(state): State<ApiState>) -> Result<Response, AppError> {
    cached_json(&state, COMBINED_SUMMARY_KEY).await
}

async fn get_combined_markets(State(state): State<ApiState>) -> Result<Response, AppError> {
    cached_json(&state, COMBINED_MARKETS_KEY).await
}

async fn get_platform_summary(
    State(state): State<ApiState>,
    Path(platform): Path<String>,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform)?;
    cached_json(&state, &platform.summary_key()).await
}

async fn get_platform_markets(
    State(state): State<ApiState>,
    Path(platform): Path<String>,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform)?;
    cached_json(&state, &platform.markets_key()).await
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_platform(s: &str) -> Result<Platform, AppError> {
    s.parse().map_err(AppError::NotFound)
}

/// Cached values are already JSON; pass them through untouched.
async fn cached_json(state: &ApiState, key: &str) -> Result<Response, AppError> {
    match state.cache.get(key).await? {
        Some(body) => Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response()),
        None => Err(AppError::NotAvailable(key.to_string())),
    }
}

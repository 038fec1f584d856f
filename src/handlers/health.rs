//! Health endpoint.
//!
//! `GET /health` is mounted as a plain Axum handler, outside any chain, so
//! load balancer probes are never rate limited or authenticated.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::error::AppResult;
use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "rate_limit_keys": 42,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        rate_limit_keys: state.tracked_keys().await?,
        timestamp: Utc::now(),
    }))
}

//! Business handlers mounted behind middleware chains.
//!
//! Each takes the raw request plus the context the chain accumulated.
//!
//! # Endpoints
//!
//! - `GET /api/whoami` - Echo what the pipeline knows about the caller
//! - `POST /api/revalidate` - Accept a page revalidation request (service token)
//! - `POST /api/cron/{job}` - Trigger a scheduled job (cron secret)

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::http::Request;
use chrono::Utc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::PRINCIPAL_KEY;
use crate::middleware::{FINGERPRINT_KEY, REQUEST_ID_KEY};
use crate::models::{CronRunResponse, RevalidateRequest, RevalidateResponse, WhoAmIResponse};
use crate::pipeline::RequestContext;

/// Largest revalidation body accepted, independent of the global body limit.
const MAX_REVALIDATE_BODY: usize = 64 * 1024;

/// Longest job name accepted by `/api/cron/{job}`.
const MAX_JOB_NAME_LEN: usize = 64;

/// Echo the context built by the chain.
pub async fn whoami(_req: Request<Body>, ctx: RequestContext) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        request_id: ctx.get_str(REQUEST_ID_KEY).map(str::to_string),
        fingerprint: ctx.get_str(FINGERPRINT_KEY).map(str::to_string),
        context: ctx.into_map(),
    })
}

/// Accept a revalidation request.
///
/// # Request Body
///
/// ```json
/// { "paths": ["/blog/hello-world"], "tags": ["posts"] }
/// ```
///
/// At least one path or tag is required; paths must be absolute.
pub async fn revalidate(
    req: Request<Body>,
    ctx: RequestContext,
) -> AppResult<Json<RevalidateResponse>> {
    let bytes = to_bytes(req.into_body(), MAX_REVALIDATE_BODY)
        .await
        .map_err(|e| AppError::BadRequest(format!("Unreadable body: {e}")))?;

    let request: RevalidateRequest = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?;

    if request.paths.is_empty() && request.tags.is_empty() {
        return Err(AppError::BadRequest(
            "At least one path or tag is required".to_string(),
        ));
    }

    if let Some(bad) = request.paths.iter().find(|p| !p.starts_with('/')) {
        return Err(AppError::BadRequest(format!(
            "Path must be absolute: {bad}"
        )));
    }

    let requested_by = ctx.get_str(PRINCIPAL_KEY).map(str::to_string);
    info!(
        paths = request.paths.len(),
        tags = request.tags.len(),
        requested_by = ?requested_by,
        "Revalidation accepted"
    );

    Ok(Json(RevalidateResponse {
        revalidated: true,
        paths: request.paths,
        tags: request.tags,
        requested_by,
        request_id: ctx.get_str(REQUEST_ID_KEY).map(str::to_string),
        timestamp: Utc::now(),
    }))
}

/// Trigger the job named in the last path segment.
pub async fn run_cron(req: Request<Body>, ctx: RequestContext) -> AppResult<Json<CronRunResponse>> {
    let job = req
        .uri()
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    validate_job_name(&job)?;

    info!(job = %job, "Scheduled job triggered");

    Ok(Json(CronRunResponse {
        job,
        accepted: true,
        request_id: ctx.get_str(REQUEST_ID_KEY).map(str::to_string),
        timestamp: Utc::now(),
    }))
}

/// Job names are 1-64 characters of `[a-z0-9-_]`.
fn validate_job_name(job: &str) -> AppResult<()> {
    let valid = !job.is_empty()
        && job.len() <= MAX_JOB_NAME_LEN
        && job
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid job name: {job:?}")))
    }
}

//! Response factory: turns an [`ErrorEnvelope`] into an HTTP response.
//!
//! # Output
//!
//! - Status: the envelope override, else the code's default status
//! - `Retry-After`: whole seconds, rounded up, never below `1`
//! - Envelope headers in sorted order (invalid names/values are skipped)
//! - Body: the JSON envelope, except for the no-content family
//!   (1xx, 204, 205, 304), which carries no payload
//!
//! Building is a pure function of the envelope, so the same envelope always
//! produces byte-identical status, headers and body.

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};
use tracing::{error, warn};

use crate::models::ErrorEnvelope;

/// Static fallback body if envelope serialization ever fails.
const FALLBACK_BODY: &str =
    r#"{"code":"INTERNAL_ERROR","message":"An internal error occurred."}"#;

/// Builds terminal responses for denied or failed requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseFactory;

impl ResponseFactory {
    /// Build the HTTP response for `envelope`.
    pub fn build(envelope: &ErrorEnvelope) -> Response<Body> {
        let status = envelope.effective_status();
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;

        let headers = response.headers_mut();

        for (name, value) in &envelope.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => {
                    warn!(header = %name, "Skipping invalid envelope header");
                }
            }
        }

        if let Some(retry_after_ms) = envelope.retry_after_ms {
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after_ms)));
        }

        if is_bodyless(status) {
            return response;
        }

        let body = match serde_json::to_vec(envelope) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, code = %envelope.code, "Failed to serialize error envelope");
                FALLBACK_BODY.as_bytes().to_vec()
            }
        };

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *response.body_mut() = Body::from(body);
        response
    }
}

/// Convert a millisecond retry hint to `Retry-After` seconds (ceil, min 1).
pub fn retry_after_secs(retry_after_ms: u64) -> u64 {
    retry_after_ms.div_ceil(1000).max(1)
}

fn is_bodyless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::RESET_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

//! Client-specified request deadlines.
//!
//! Clients may bound how long the pipeline works on their request:
//!
//! ```text
//! X-Request-Timeout: 5000  # 5 seconds in milliseconds
//! ```
//!
//! The route binder turns the value (or the server default) into a deadline
//! that cancels the chain once it passes.
//!
//! # Security Considerations
//!
//! - Minimum and maximum bounds are enforced to prevent abuse
//! - Invalid or out-of-range values are ignored (fall back to server default)

use std::time::Duration;

use axum::http::HeaderMap;
use tracing::debug;

/// Minimum allowed request timeout (100ms).
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Maximum allowed request timeout (5 minutes).
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// Header name for client-specified request timeout.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// A validated request timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout {
    pub duration: Duration,
    /// The original value from the header (for logging).
    pub original_ms: u64,
}

impl RequestTimeout {
    /// Returns `None` if the value is outside the allowed range.
    pub fn from_millis(ms: u64) -> Option<Self> {
        if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&ms) {
            return None;
        }
        Some(Self {
            duration: Duration::from_millis(ms),
            original_ms: ms,
        })
    }
}

/// Parse and validate the `X-Request-Timeout` header.
pub fn request_timeout(headers: &HeaderMap) -> Option<RequestTimeout> {
    let value_str = headers.get(REQUEST_TIMEOUT_HEADER)?.to_str().ok()?;

    let Ok(ms) = value_str.trim().parse::<u64>() else {
        debug!(
            value = value_str,
            "Invalid X-Request-Timeout header value, ignoring"
        );
        return None;
    };

    let timeout = RequestTimeout::from_millis(ms);
    if timeout.is_none() {
        debug!(
            timeout_ms = ms,
            min = MIN_REQUEST_TIMEOUT_MS,
            max = MAX_REQUEST_TIMEOUT_MS,
            "Client timeout outside allowed range, ignoring"
        );
    }
    timeout
}

/// Client timeout if valid, otherwise `default`.
///
/// A client may shorten the server default but never extend it.
pub fn effective_deadline(headers: &HeaderMap, default: Option<Duration>) -> Option<Duration> {
    match (request_timeout(headers).map(|t| t.duration), default) {
        (Some(client), Some(server)) => Some(client.min(server)),
        (client, server) => client.or(server),
    }
}

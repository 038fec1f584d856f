//! Request ID unit for log correlation.
//!
//! Propagates a caller-supplied `X-Request-Id` or generates a UUIDv4, and
//! contributes it to the context under [`REQUEST_ID_KEY`] so later units and
//! the handler log with the same ID.
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:3000/api/whoami
//! ```

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use tracing::{Span, debug};
use uuid::Uuid;

use crate::error::AppResult;
use crate::pipeline::{ChainResult, ContextFragment, Middleware, RequestContext};

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context key holding the request ID.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Longest caller-supplied ID we propagate; longer ones are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Contributes the request ID to the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdUnit;

impl RequestIdUnit {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for RequestIdUnit {
    async fn handle(&self, parts: &Parts, _ctx: &RequestContext) -> AppResult<ChainResult> {
        let request_id = extract_or_generate_request_id(&parts.headers);

        Span::current().record("request_id", request_id.as_str());
        debug!(request_id = %request_id, path = %parts.uri.path(), "Processing request");

        Ok(ChainResult::contribute(
            ContextFragment::new().with(REQUEST_ID_KEY, request_id),
        ))
    }
}

/// Extract request ID from headers or generate a new one.
fn extract_or_generate_request_id(headers: &HeaderMap) -> String {
    if let Some(header_value) = headers.get(REQUEST_ID_HEADER)
        && let Ok(value) = header_value.to_str()
        && !value.trim().is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
    {
        return value.trim().to_string();
    }

    Uuid::new_v4().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn test_extract_existing_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("existing-id-123"));
        assert_eq!(extract_or_generate_request_id(&headers), "existing-id-123");
    }

    #[test]
    fn test_generate_new_request_id() {
        let id = extract_or_generate_request_id(&HeaderMap::new());
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_oversized_request_id_replaced() {
        let mut headers = HeaderMap::new();
        let long = "x".repeat(MAX_REQUEST_ID_LEN + 1);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&long).unwrap());

        let id = extract_or_generate_request_id(&headers);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn test_unit_contributes_request_id() {
        let (parts, _) = Request::builder()
            .header(REQUEST_ID_HEADER, "abc")
            .body(())
            .unwrap()
            .into_parts();

        match RequestIdUnit.handle(&parts, &RequestContext::new()).await.unwrap() {
            ChainResult::Continue(fragment) => {
                let mut ctx = RequestContext::new();
                ctx.merge(fragment);
                assert_eq!(ctx.get_str(REQUEST_ID_KEY), Some("abc"));
            }
            ChainResult::ShortCircuit(_) => panic!("request id never short-circuits"),
        }
    }
}

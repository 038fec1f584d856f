//! Rate limiting unit keyed by client fingerprint.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429 `TOO_MANY_REQUESTS`):
//! - `Retry-After`: seconds until the quota window ends (quota policy only)
//! - `X-RateLimit-Limit`: requests admitted per window, burst included (quota only)
//! - `X-RateLimit-Remaining`: always `0` on a denial (quota only)
//!
//! Interval denials carry none of these: the next admission time depends on
//! when the caller retries, not on a window boundary.
//!
//! # Keying
//!
//! The key is the salted fingerprint of the client (see
//! [`crate::fingerprint`]). A fingerprint already in the context (from a
//! [`super::FingerprintUnit`] or an earlier limiter) is reused.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;
use tracing::warn;

use super::fingerprint::FINGERPRINT_KEY;
use crate::error::AppResult;
use crate::fingerprint::Fingerprinter;
use crate::models::ErrorEnvelope;
use crate::pipeline::{ChainResult, ContextFragment, Middleware, RequestContext};
use crate::rate_limit::{RateLimitDecision, RateLimiter};

/// Header carrying the per-window limit on quota denials.
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Header carrying the remaining allowance on quota denials.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Consults a [`RateLimiter`] for every request.
#[derive(Debug, Clone)]
pub struct RateLimitUnit {
    limiter: RateLimiter,
    fingerprinter: Arc<Fingerprinter>,
}

impl RateLimitUnit {
    pub fn new(limiter: RateLimiter, fingerprinter: Arc<Fingerprinter>) -> Self {
        Self {
            limiter,
            fingerprinter,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

#[async_trait]
impl Middleware for RateLimitUnit {
    async fn handle(&self, parts: &Parts, ctx: &RequestContext) -> AppResult<ChainResult> {
        let (key, computed) = match ctx.get_str(FINGERPRINT_KEY) {
            Some(existing) => (existing.to_string(), false),
            None => (self.fingerprinter.fingerprint(&parts.headers), true),
        };

        let decision = self.limiter.allow(&key).await?;

        if decision.allowed {
            let fragment = if computed {
                ContextFragment::new().with(FINGERPRINT_KEY, key)
            } else {
                ContextFragment::new()
            };
            return Ok(ChainResult::contribute(fragment));
        }

        warn!(
            scope = self.limiter.scope(),
            path = %parts.uri.path(),
            retry_after_ms = ?decision.retry_after_ms,
            "Rate limit exceeded"
        );

        Ok(ChainResult::deny(&denial_envelope(
            self.limiter.scope(),
            &decision,
        )))
    }
}

/// Envelope for a denied decision.
pub fn denial_envelope(scope: &str, decision: &RateLimitDecision) -> ErrorEnvelope {
    let mut envelope =
        ErrorEnvelope::too_many_requests("Too many requests. Please retry later.")
            .with_detail("scope", scope);

    if let Some(retry_after_ms) = decision.retry_after_ms {
        envelope = envelope
            .with_detail("retry_after_ms", retry_after_ms)
            .with_retry_after_ms(retry_after_ms);
    }

    if let Some(limit) = decision.limit {
        envelope = envelope
            .with_header(RATE_LIMIT_LIMIT_HEADER, limit.to_string())
            .with_header(
                RATE_LIMIT_REMAINING_HEADER,
                decision.remaining.unwrap_or(0).to_string(),
            );
    }

    envelope
}

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use super::RateLimitError;
use super::clock::{Clock, SystemClock};
use super::policy::RateLimitPolicy;
use super::store::{InMemoryStore, KeyState, RateLimitStore};
use crate::error::AppResult;
use crate::metrics;

/// Outcome of a single [`RateLimiter::allow`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Milliseconds until the current quota window ends. Quota denials only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Requests admitted per window, burst included. Quota only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Requests left in the current window. Quota only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

impl RateLimitDecision {
    pub fn allowed(limit: Option<u32>, remaining: Option<u32>) -> Self {
        Self {
            allowed: true,
            retry_after_ms: None,
            limit,
            remaining,
        }
    }

    pub fn denied(retry_after_ms: Option<u64>, limit: Option<u32>) -> Self {
        Self {
            allowed: false,
            retry_after_ms,
            limit,
            remaining: limit.map(|_| 0),
        }
    }
}

/// A policy bound to a store, a clock and a key scope.
///
/// Cheap to clone; clones share the store.
///
/// # Example
///
/// ```rust
/// use request_pipeline::rate_limit::{RateLimitPolicy, RateLimiter};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RateLimiter::new("login", RateLimitPolicy::quota(2, "5s", 0)?);
///
/// assert!(limiter.allow("client-a").await?.allowed);
/// assert!(limiter.allow("client-a").await?.allowed);
/// assert!(!limiter.allow("client-a").await?.allowed);
/// assert!(limiter.allow("client-b").await?.allowed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    scope: Arc<str>,
    policy: RateLimitPolicy,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Limiter with its own in-memory store and the system clock.
    pub fn new(scope: &str, policy: RateLimitPolicy) -> Self {
        Self::with_store(
            scope,
            policy,
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Limiter over a shared store. Keys are prefixed with `scope`, so
    /// several limiters can share one store without colliding.
    pub fn with_store(
        scope: &str,
        policy: RateLimitPolicy,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!(scope, %policy, "Rate limiter created");
        Self {
            scope: Arc::from(scope),
            policy,
            store,
            clock,
        }
    }

    /// Parse `window` and build a quota limiter in one step.
    pub fn quota(scope: &str, limit: u32, window: &str) -> Result<Self, RateLimitError> {
        Ok(Self::new(scope, RateLimitPolicy::quota(limit, window, 0)?))
    }

    /// Parse `window` and build an interval limiter in one step.
    pub fn interval(scope: &str, window: &str) -> Result<Self, RateLimitError> {
        Ok(Self::new(scope, RateLimitPolicy::interval(window)?))
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Check and record one request for `key`.
    ///
    /// The read-modify-write is atomic per key, so concurrent callers for the
    /// same key never exceed the policy.
    pub async fn allow(&self, key: &str) -> AppResult<RateLimitDecision> {
        let now_ms = self.clock.now_ms();
        let policy = self.policy;
        let transition = move |current: Option<&KeyState>| policy.evaluate(current, now_ms);

        let decision = self.store.apply(&self.scoped(key), &transition).await?;

        metrics::record_rate_limit_decision(&self.scope, decision.allowed);
        trace!(
            scope = %self.scope,
            allowed = decision.allowed,
            retry_after_ms = ?decision.retry_after_ms,
            "Rate limit decision"
        );

        Ok(decision)
    }

    /// Current record for `key`, without recording a hit.
    pub async fn peek(&self, key: &str) -> AppResult<Option<KeyState>> {
        self.store.get(&self.scoped(key)).await
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.scope, key)
    }
}

//! Per-key rate limiting with two policies.
//!
//! # Policies
//!
//! - **Interval**: at most one admitted request per key per window
//!   (a strict minimum gap, not a sliding counter)
//! - **Quota**: at most `limit + burst` admitted requests per key per fixed
//!   window; denials carry a retry hint until the window ends
//!
//! # Architecture
//!
//! ```text
//! RateLimiter::allow(key)
//!      │
//!      ▼
//! RateLimitPolicy::evaluate(state, now)   ← pure decision logic
//!      │
//!      ▼
//! RateLimitStore::apply(key, transition)  ← atomic per-key read-modify-write
//! ```
//!
//! The store and the clock are injected, so tests run against a
//! [`ManualClock`] and a deployment can swap [`InMemoryStore`] for a shared
//! external store without touching the decision logic.

mod clock;
mod limiter;
mod policy;
mod store;
mod window;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use policy::{PolicyKind, RateLimitPolicy, RateLimitSettings};
pub use store::{InMemoryStore, KeyState, LimiterState, RateLimitStore, Transition, TransitionFn};
pub use window::{RlWindow, WindowParseError};

/// Errors raised while constructing a limiter. Never raised per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("invalid window: {0}")]
    InvalidWindow(#[from] WindowParseError),

    #[error("quota limit must be greater than 0")]
    ZeroLimit,

    #[error("quota policy requires a hit limit")]
    MissingLimit,

    #[error("unknown rate limit policy '{0}' (expected 'interval' or 'quota')")]
    UnknownPolicy(String),
}

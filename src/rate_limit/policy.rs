//! Rate limit policies and their pure decision logic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::RateLimitError;
use super::limiter::RateLimitDecision;
use super::store::{KeyState, LimiterState, Transition};
use super::window::RlWindow;

/// Which policy a limiter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Interval,
    Quota,
}

impl FromStr for PolicyKind {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interval" => Ok(Self::Interval),
            "quota" => Ok(Self::Quota),
            other => Err(RateLimitError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval => f.write_str("interval"),
            Self::Quota => f.write_str("quota"),
        }
    }
}

/// Unvalidated limiter settings as they come out of configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub policy: PolicyKind,
    pub window: String,
    #[serde(default)]
    pub hits: Option<u32>,
    #[serde(default)]
    pub burst: u32,
}

/// A validated policy. Construction is the only place a window string is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// At most one admitted request per key per `window`.
    Interval { window: RlWindow },
    /// At most `limit + burst` admitted requests per key per fixed `window`.
    Quota {
        window: RlWindow,
        limit: u32,
        burst: u32,
    },
}

impl RateLimitPolicy {
    /// Interval policy, e.g. `RateLimitPolicy::interval("2s")`.
    pub fn interval(window: &str) -> Result<Self, RateLimitError> {
        Ok(Self::Interval {
            window: RlWindow::parse(window)?,
        })
    }

    /// Quota policy admitting `limit + burst` requests per `window`.
    pub fn quota(limit: u32, window: &str, burst: u32) -> Result<Self, RateLimitError> {
        if limit == 0 {
            return Err(RateLimitError::ZeroLimit);
        }
        Ok(Self::Quota {
            window: RlWindow::parse(window)?,
            limit,
            burst,
        })
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Result<Self, RateLimitError> {
        match settings.policy {
            PolicyKind::Interval => Self::interval(&settings.window),
            PolicyKind::Quota => {
                let limit = settings.hits.ok_or(RateLimitError::MissingLimit)?;
                Self::quota(limit, &settings.window, settings.burst)
            }
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Interval { .. } => PolicyKind::Interval,
            Self::Quota { .. } => PolicyKind::Quota,
        }
    }

    pub fn window(&self) -> RlWindow {
        match self {
            Self::Interval { window } | Self::Quota { window, .. } => *window,
        }
    }

    /// Requests admitted per window, burst included. `None` for interval.
    pub fn capacity(&self) -> Option<u32> {
        match self {
            Self::Interval { .. } => None,
            Self::Quota { limit, burst, .. } => Some(limit.saturating_add(*burst)),
        }
    }

    /// Decide on one request given the key's current record.
    ///
    /// A record written by a different policy kind is treated as absent.
    pub fn evaluate(&self, current: Option<&KeyState>, now_ms: u64) -> Transition {
        match *self {
            Self::Interval { window } => evaluate_interval(window, current, now_ms),
            Self::Quota {
                window,
                limit,
                burst,
            } => evaluate_quota(window, limit.saturating_add(burst), current, now_ms),
        }
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval { window } => write!(f, "interval(1/{window})"),
            Self::Quota {
                window,
                limit,
                burst,
            } => write!(f, "quota({limit}+{burst}/{window})"),
        }
    }
}

fn evaluate_interval(window: RlWindow, current: Option<&KeyState>, now_ms: u64) -> Transition {
    let last = current.and_then(|s| match s.state {
        LimiterState::Interval { last_admitted_ms } => Some(last_admitted_ms),
        LimiterState::Quota { .. } => None,
    });

    let admitted = match last {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= window.as_millis(),
    };

    let last_admitted_ms = match (admitted, last) {
        (false, Some(last)) => last,
        _ => now_ms,
    };

    Transition {
        next: KeyState {
            state: LimiterState::Interval { last_admitted_ms },
            touched_ms: now_ms,
        },
        decision: if admitted {
            RateLimitDecision::allowed(None, None)
        } else {
            RateLimitDecision::denied(None, None)
        },
    }
}

fn evaluate_quota(
    window: RlWindow,
    capacity: u32,
    current: Option<&KeyState>,
    now_ms: u64,
) -> Transition {
    let window_ms = window.as_millis();
    let (mut window_start_ms, mut hits) = current
        .and_then(|s| match s.state {
            LimiterState::Quota {
                window_start_ms,
                hits,
            } => Some((window_start_ms, hits)),
            LimiterState::Interval { .. } => None,
        })
        .unwrap_or((now_ms, 0));

    if now_ms.saturating_sub(window_start_ms) >= window_ms {
        window_start_ms = now_ms;
        hits = 0;
    }

    let decision = if hits < u64::from(capacity) {
        hits += 1;
        let remaining = u64::from(capacity).saturating_sub(hits);
        RateLimitDecision::allowed(
            Some(capacity),
            Some(u32::try_from(remaining).unwrap_or(u32::MAX)),
        )
    } else {
        let window_end = window_start_ms.saturating_add(window_ms);
        let retry_after_ms = window_end.saturating_sub(now_ms).max(1);
        RateLimitDecision::denied(Some(retry_after_ms), Some(capacity))
    };

    Transition {
        next: KeyState {
            state: LimiterState::Quota {
                window_start_ms,
                hits,
            },
            touched_ms: now_ms,
        },
        decision,
    }
}

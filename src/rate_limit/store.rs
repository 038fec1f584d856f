//! Limiter state storage.
//!
//! The decision logic never touches the map directly: it hands the store a
//! transition closure and the store applies it atomically for one key.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use super::clock::Clock;
use super::limiter::RateLimitDecision;
use crate::error::AppResult;
use crate::metrics;

/// Policy-specific part of a key's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterState {
    /// Timestamp of the last admitted request.
    Interval { last_admitted_ms: u64 },
    /// Start of the current fixed window and hits admitted inside it.
    Quota { window_start_ms: u64, hits: u64 },
}

/// Per-key record. `touched_ms` moves on every check, admitted or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub state: LimiterState,
    pub touched_ms: u64,
}

/// Result of evaluating a policy against the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: KeyState,
    pub decision: RateLimitDecision,
}

/// Type of the closure passed to [`RateLimitStore::apply`].
pub type TransitionFn<'a> = dyn Fn(Option<&KeyState>) -> Transition + Send + Sync + 'a;

/// Storage backend for limiter state.
///
/// Implementations must run `transition` and persist its `next` state as a
/// single atomic step per key. Two concurrent `apply` calls on one key must
/// observe each other's writes.
#[async_trait]
pub trait RateLimitStore: Send + Sync + fmt::Debug {
    /// Atomically read the record for `key`, compute the transition and store it.
    async fn apply(&self, key: &str, transition: &TransitionFn<'_>) -> AppResult<RateLimitDecision>;

    /// Current record for `key`, if any.
    async fn get(&self, key: &str) -> AppResult<Option<KeyState>>;

    /// Drop every record untouched for at least `idle_ttl_ms`. Returns how many were removed.
    async fn evict_idle(&self, now_ms: u64, idle_ttl_ms: u64) -> AppResult<usize>;

    /// Number of keys currently tracked.
    async fn tracked_keys(&self) -> AppResult<usize>;
}

/// Process-local store backed by a sharded concurrent map.
///
/// The shard lock held by [`DashMap::entry`] covers the whole
/// read-modify-write, so a single key never sees a lost update.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, KeyState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_sync(&self, key: &str, transition: &TransitionFn<'_>) -> RateLimitDecision {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let outcome = transition(Some(occupied.get()));
                occupied.insert(outcome.next);
                outcome.decision
            }
            Entry::Vacant(vacant) => {
                let outcome = transition(None);
                vacant.insert(outcome.next);
                outcome.decision
            }
        }
    }

    fn evict_sync(&self, now_ms: u64, idle_ttl_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, state| now_ms.saturating_sub(state.touched_ms) < idle_ttl_ms);
        before.saturating_sub(self.entries.len())
    }

    /// Spawn the idle-key sweeper.
    ///
    /// The task is tracked by `tracker` and exits when `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        clock: Arc<dyn Clock>,
        idle_ttl: Duration,
        every: Duration,
        tracker: &TaskTracker,
        cancel: CancellationToken,
    ) {
        let store = Arc::clone(self);
        let idle_ttl_ms = u64::try_from(idle_ttl.as_millis()).unwrap_or(u64::MAX);

        tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limit sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = store.evict_sync(clock.now_ms(), idle_ttl_ms);
                        let remaining = store.entries.len();
                        metrics::record_keys_evicted(evicted);
                        metrics::set_tracked_keys(remaining);
                        if evicted > 0 {
                            debug!(evicted, remaining, "Evicted idle rate limit keys");
                        } else {
                            trace!(remaining, "Rate limit sweep found nothing idle");
                        }
                    }
                }
            }

            debug!("Rate limit sweeper shutting down");
        });
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn apply(&self, key: &str, transition: &TransitionFn<'_>) -> AppResult<RateLimitDecision> {
        Ok(self.apply_sync(key, transition))
    }

    async fn get(&self, key: &str) -> AppResult<Option<KeyState>> {
        Ok(self.entries.get(key).map(|entry| *entry.value()))
    }

    async fn evict_idle(&self, now_ms: u64, idle_ttl_ms: u64) -> AppResult<usize> {
        if idle_ttl_ms == 0 {
            warn!("Idle TTL of zero would evict every key; skipping sweep");
            return Ok(0);
        }
        Ok(self.evict_sync(now_ms, idle_ttl_ms))
    }

    async fn tracked_keys(&self) -> AppResult<usize> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn counting(now_ms: u64) -> impl Fn(Option<&KeyState>) -> Transition + Send + Sync {
        move |current| {
            let hits = match current.map(|s| s.state) {
                Some(LimiterState::Quota { hits, .. }) => hits + 1,
                _ => 1,
            };
            Transition {
                next: KeyState {
                    state: LimiterState::Quota {
                        window_start_ms: 0,
                        hits,
                    },
                    touched_ms: now_ms,
                },
                decision: RateLimitDecision::allowed(None, None),
            }
        }
    }

    #[tokio::test]
    async fn test_apply_creates_then_updates() {
        let store = InMemoryStore::new();
        store.apply("k", &counting(10)).await.unwrap();
        store.apply("k", &counting(20)).await.unwrap();

        let state = store.get("k").await.unwrap().unwrap();
        assert_eq!(
            state.state,
            LimiterState::Quota {
                window_start_ms: 0,
                hits: 2
            }
        );
        assert_eq!(state.touched_ms, 20);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryStore::new();
        store.apply("a", &counting(0)).await.unwrap();
        store.apply("b", &counting(0)).await.unwrap();
        assert_eq!(store.tracked_keys().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_evict_idle_removes_only_stale_keys() {
        let store = InMemoryStore::new();
        store.apply("old", &counting(0)).await.unwrap();
        store.apply("fresh", &counting(9_000)).await.unwrap();

        let evicted = store.evict_idle(10_000, 5_000).await.unwrap();

        assert_eq!(evicted, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_ignored() {
        let store = InMemoryStore::new();
        store.apply("k", &counting(0)).await.unwrap();
        assert_eq!(store.evict_idle(10_000, 0).await.unwrap(), 0);
        assert_eq!(store.tracked_keys().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let clock: Arc<dyn Clock> = Arc::new(crate::rate_limit::ManualClock::new(0));

        store.spawn_sweeper(
            clock,
            Duration::from_secs(60),
            Duration::from_millis(10),
            &tracker,
            cancel.clone(),
        );

        cancel.cancel();
        tracker.close();
        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("sweeper should exit after cancellation");
    }
}

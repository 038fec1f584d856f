//! Shared application state for Axum handlers.
//!
//! - **Fingerprinter**: owns the server-side salt
//! - **Store**: one in-memory rate limit store shared by every limiter
//! - **Limiters**: one per mounted policy, scoped so their keys never collide
//! - **Configuration**: runtime configuration access
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken`. The same token is the parent of every request's
//! cancellation token, so shutting down also stops in-flight chains. Call
//! `shutdown()` to stop everything before application exit.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::fingerprint::Fingerprinter;
use crate::rate_limit::{Clock, InMemoryStore, RateLimitStore, RateLimiter, SystemClock};

/// Scope prefix for the public endpoint limiter.
pub const PUBLIC_SCOPE: &str = "public";

/// Scope prefix for the revalidation limiter.
pub const REVALIDATE_SCOPE: &str = "revalidate";

/// Shared application state for Axum handlers.
///
/// Cloned for each request; everything inside is behind an `Arc`.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;  // Wait for background tasks to complete
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Fingerprint generator with the process salt
    pub fingerprinter: Arc<Fingerprinter>,
    /// Limiter for public endpoints
    pub public_limiter: RateLimiter,
    /// Limiter for the revalidation endpoint
    pub revalidate_limiter: RateLimiter,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Backing store shared by both limiters
    store: Arc<InMemoryStore>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create state using the system clock and start the idle-key sweeper.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RateLimit` if a limiter's settings are invalid.
    pub fn new(config: Config) -> AppResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create state with an injected clock (tests use a `ManualClock`).
    ///
    /// Must be called inside a Tokio runtime: the sweeper is spawned here.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let public_policy = config.public_policy()?;
        let revalidate_policy = config.revalidate_policy()?;

        let store = Arc::new(InMemoryStore::new());
        let shared: Arc<dyn RateLimitStore> = store.clone();

        let public_limiter =
            RateLimiter::with_store(PUBLIC_SCOPE, public_policy, shared.clone(), clock.clone());
        let revalidate_limiter =
            RateLimiter::with_store(REVALIDATE_SCOPE, revalidate_policy, shared, clock.clone());

        let fingerprinter = Arc::new(Fingerprinter::from_optional_salt(
            config.fingerprint_salt.as_deref(),
        ));

        // Evicting a key mid-window would hand its owner a fresh allowance.
        let longest_window = public_policy
            .window()
            .as_duration()
            .max(revalidate_policy.window().as_duration());
        let idle_ttl = config.rate_limit_idle_ttl.max(longest_window);

        let state = Self {
            fingerprinter,
            public_limiter,
            revalidate_limiter,
            started_at: Instant::now(),
            store,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
            config: Arc::new(config),
        };

        info!(
            public = %public_policy,
            revalidate = %revalidate_policy,
            idle_ttl_secs = idle_ttl.as_secs(),
            "Rate limiters configured"
        );

        state.store.spawn_sweeper(
            clock,
            idle_ttl,
            state.config.rate_limit_sweep_interval,
            &state.task_tracker,
            state.cancellation_token.clone(),
        );

        Ok(state)
    }

    /// Token that fires on shutdown. Request tokens are children of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Number of keys currently tracked by the shared store.
    pub async fn tracked_keys(&self) -> AppResult<usize> {
        self.store.tracked_keys().await
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// This method:
    /// 1. Signals all tasks (and in-flight chains) to stop via the cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

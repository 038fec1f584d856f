//! Application routing configuration.
//!
//! Each API route is a [`BoundRoute`] (a middleware chain plus handler)
//! mounted through a [`RouteBinder`]. Axum-level layers wrap everything.
//!
//! # Layer Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Body Limit     │ ← 413 past MAX_REQUEST_BODY_SIZE
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Route Binder    │ ← deadline + shutdown cancellation
//! └────────┬─────────┘
//!          ▼
//!   Chain units → Handler
//! ```
//!
//! # Chains
//!
//! ```text
//! base        = [RequestId]
//! /api/whoami = base + [Fingerprint, RateLimit(public)]
//! /api/revalidate = base + [RateLimit(revalidate), ServiceTokenAuth]
//! /api/cron/{job} = base + [CronSecretAuth]
//! ```

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{MethodFilter, MethodRouter, get, on};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::{
    FingerprintUnit, RateLimitUnit, RequestIdUnit, SharedSecretAuth, effective_deadline,
};
use crate::pipeline::{BoundRoute, Chain};
use crate::state::AppState;

/// Mounts bound routes onto Axum method routers.
///
/// Every request gets a child of the shutdown token, armed with a deadline
/// from `X-Request-Timeout` or the configured default.
#[derive(Debug, Clone)]
pub struct RouteBinder {
    shutdown: CancellationToken,
    default_deadline: Option<Duration>,
}

impl RouteBinder {
    pub fn new(shutdown: CancellationToken, default_deadline: Option<Duration>) -> Self {
        Self {
            shutdown,
            default_deadline,
        }
    }

    pub fn get<S>(&self, route: BoundRoute) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.on(MethodFilter::GET, route)
    }

    pub fn post<S>(&self, route: BoundRoute) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.on(MethodFilter::POST, route)
    }

    /// Mount `route` for the given methods.
    pub fn on<S>(&self, filter: MethodFilter, route: BoundRoute) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let binder = self.clone();
        on(filter, move |req: Request<Body>| {
            let binder = binder.clone();
            let route = route.clone();
            async move { binder.dispatch(&route, req).await }
        })
    }

    async fn dispatch(&self, route: &BoundRoute, req: Request<Body>) -> axum::response::Response {
        let cancel = self.shutdown.child_token();
        let deadline = effective_deadline(req.headers(), self.default_deadline);

        let run = route.call_with_cancellation(req, cancel.clone());
        let Some(deadline) = deadline else {
            return run.await;
        };

        tokio::pin!(run);
        tokio::select! {
            biased;

            response = &mut run => response,
            _ = tokio::time::sleep(deadline) => {
                warn!(route = route.name(), deadline_ms = deadline.as_millis() as u64, "Request deadline reached");
                cancel.cancel();
                run.await
            }
        }
    }
}

/// Build the application router with all routes and layers configured.
///
/// # Arguments
///
/// * `state` - Application state containing config and limiters
///
/// # Returns
///
/// Fully configured Axum router ready to be served.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let binder = RouteBinder::new(state.shutdown_token(), config.request_deadline);

    // =========================================================================
    // Chains (branch from a shared prefix)
    // =========================================================================
    let base = Chain::new().with(RequestIdUnit::new());

    let whoami = base
        .with(FingerprintUnit::new(state.fingerprinter.clone()))
        .with(RateLimitUnit::new(
            state.public_limiter.clone(),
            state.fingerprinter.clone(),
        ))
        .route_named("whoami", handlers::whoami);

    let revalidate = base
        .with(RateLimitUnit::new(
            state.revalidate_limiter.clone(),
            state.fingerprinter.clone(),
        ))
        .with(SharedSecretAuth::service(config.service_token.clone()))
        .route_named("revalidate", handlers::revalidate);

    let cron = base
        .with(SharedSecretAuth::cron(config.cron_secret.clone()))
        .route_named("cron", handlers::run_cron);

    // =========================================================================
    // Routes
    // =========================================================================
    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/whoami", binder.get(whoami))
        .route("/api/revalidate", binder.post(revalidate))
        .route("/api/cron/{job}", binder.post(cron));

    // =========================================================================
    // Layers (applied bottom to top)
    // =========================================================================
    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );

    router
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(build_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build CORS layer from configuration.
///
/// # Arguments
///
/// * `allowed_origins` - List of allowed origins, or `["*"]` for any origin
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

//! # Request Pipeline
//!
//! Ordered middleware chains in front of Axum handlers, featuring:
//!
//! - **Fingerprinting**: salted one-way client identity from proxy headers,
//!   `User-Agent` and `Accept-Language`
//! - **Rate Limiting**: interval (minimum gap) and quota (fixed window with
//!   burst) policies over a pluggable store
//! - **Uniform Errors**: one JSON envelope and status mapping for every
//!   short-circuit
//! - **Composable Chains**: immutable, prefix-sharing unit sequences bound
//!   to handlers, with cancellation and per-request deadlines
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layers (Trace → CORS → Body Limit)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RouteBinder (deadline, shutdown cancellation)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Chain units (RequestId → RateLimit → Auth)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (whoami, revalidate, cron)                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use request_pipeline::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state.clone());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Building a Chain
//!
//! ```rust
//! use axum::body::Body;
//! use axum::http::Request;
//! use request_pipeline::pipeline::{Chain, RequestContext};
//! use request_pipeline::middleware::RequestIdUnit;
//!
//! let route = Chain::new()
//!     .with(RequestIdUnit::new())
//!     .route(|_req: Request<Body>, ctx: RequestContext| async move { axum::Json(ctx) });
//! assert_eq!(route.name(), "route");
//! ```
//!
//! ## Security Configuration
//!
//! Protect the revalidation and cron endpoints:
//! ```bash
//! SERVICE_TOKEN=... CRON_SECRET=... FINGERPRINT_SALT=... cargo run
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use fingerprint::Fingerprinter;
pub use pipeline::{BoundRoute, Chain, ChainResult, Middleware, RequestContext};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use response::ResponseFactory;
pub use routes::{RouteBinder, build_router};
pub use state::AppState;

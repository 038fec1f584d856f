//! In-process tests of chains bound to handlers.
//!
//! No sockets: routes are driven directly through `BoundRoute::call`, with a
//! `ManualClock` standing in for time where windows matter.
//!
//! Run with: `cargo test --test pipeline_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, RETRY_AFTER};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use request_pipeline::AppResult;
use request_pipeline::fingerprint::Fingerprinter;
use request_pipeline::middleware::{AuthProvider, Principal, RateLimitUnit, RequireSession};
use request_pipeline::models::{ErrorCode, ErrorEnvelope};
use request_pipeline::pipeline::{
    BoundRoute, Chain, ChainResult, ContextFragment, Middleware, RequestContext, from_fn,
};
use request_pipeline::rate_limit::{InMemoryStore, ManualClock, RateLimitPolicy, RateLimiter};

// ============================================================================
// Helpers
// ============================================================================

/// Accepts `Authorization: Bearer letmein`.
struct BearerProvider;

#[async_trait]
impl AuthProvider for BearerProvider {
    async fn authenticate(&self, parts: &Parts) -> AppResult<Option<Principal>> {
        let ok = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer letmein");
        Ok(ok.then(|| Principal {
            subject: "tester".to_string(),
            scheme: "bearer",
        }))
    }

    fn name(&self) -> &'static str {
        "BearerAuth"
    }
}

/// Appends its label to a shared log, then continues.
fn recorder(label: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> impl Middleware {
    let log = log.clone();
    from_fn(label, move |_, _| {
        log.lock().unwrap().push(label);
        Ok(ChainResult::proceed())
    })
}

fn quota_limiter(limit: u32, window: &str, clock: &ManualClock) -> RateLimiter {
    RateLimiter::with_store(
        "test",
        RateLimitPolicy::quota(limit, window, 0).unwrap(),
        Arc::new(InMemoryStore::new()),
        Arc::new(clock.clone()),
    )
}

fn ok_route(chain: &Chain) -> BoundRoute {
    chain.route(|_req: Request<Body>, _ctx: RequestContext| async { StatusCode::OK })
}

fn get(authorized: bool) -> Request<Body> {
    let mut builder = Request::get("/protected").header("user-agent", "pipeline-tests/1.0");
    if authorized {
        builder = builder.header(AUTHORIZATION, "Bearer letmein");
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Rate limiter + auth end to end
// ============================================================================

#[tokio::test]
async fn test_quota_then_auth_scenario() {
    let clock = ManualClock::new(1_700_000_000_000);
    let route = ok_route(
        &Chain::new()
            .with(RateLimitUnit::new(
                quota_limiter(2, "5s", &clock),
                Arc::new(Fingerprinter::new("test-salt")),
            ))
            .with(RequireSession::new(BearerProvider)),
    );

    // Two authorized requests fit the window
    assert_eq!(route.call(get(true)).await.status(), StatusCode::OK);
    assert_eq!(route.call(get(true)).await.status(), StatusCode::OK);

    // Third is refused by the limiter before auth runs
    let denied = route.call(get(true)).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = denied
        .headers()
        .get(RETRY_AFTER)
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=5).contains(&retry_after));
    assert_eq!(json_body(denied).await["code"], "TOO_MANY_REQUESTS");

    // A fresh window admits again
    clock.advance(Duration::from_secs(5));
    assert_eq!(route.call(get(true)).await.status(), StatusCode::OK);

    // Within quota but unauthenticated
    let unauthorized = route.call(get(false)).await;
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(unauthorized).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_interval_denial_has_no_retry_after() {
    let clock = ManualClock::new(0);
    let limiter = RateLimiter::with_store(
        "interval",
        RateLimitPolicy::interval("10s").unwrap(),
        Arc::new(InMemoryStore::new()),
        Arc::new(clock.clone()),
    );
    let route = ok_route(
        &Chain::new().with(RateLimitUnit::new(limiter, Arc::new(Fingerprinter::new("s")))),
    );

    assert_eq!(route.call(get(false)).await.status(), StatusCode::OK);

    clock.advance(Duration::from_secs(9));
    let denied = route.call(get(false)).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(denied.headers().get(RETRY_AFTER).is_none());

    clock.advance(Duration::from_secs(1));
    assert_eq!(route.call(get(false)).await.status(), StatusCode::OK);
}

// ============================================================================
// Ordering, context, short-circuit
// ============================================================================

#[tokio::test]
async fn test_short_circuit_stops_later_units_and_handler() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = log.clone();

    let route = Chain::new()
        .with(from_fn("tag", |_, _| {
            Ok(ChainResult::contribute(ContextFragment::new().with("tagged", true)))
        }))
        .with(from_fn("gate", |_, ctx| {
            // Sees what the earlier unit contributed
            assert_eq!(ctx.get("tagged"), Some(&Value::Bool(true)));
            Ok(ChainResult::deny(&ErrorEnvelope::forbidden("Nope")))
        }))
        .with(recorder("after", &log))
        .route(move |_req: Request<Body>, _ctx: RequestContext| {
            let log = handler_log.clone();
            async move {
                log.lock().unwrap().push("handler");
                StatusCode::OK
            }
        });

    let response = route.call(get(false)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], ErrorCode::Forbidden.as_str());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_units_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let route = ok_route(
        &Chain::new()
            .with(recorder("first", &log))
            .with(recorder("second", &log))
            .with(recorder("third", &log)),
    );

    assert_eq!(route.call(get(false)).await.status(), StatusCode::OK);
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_bound_route_ignores_later_appends() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let base = Chain::new().with(recorder("base", &log));
    let route = ok_route(&base);

    let extended = base.with(from_fn("deny", |_, _| {
        Ok(ChainResult::deny(&ErrorEnvelope::forbidden("Nope")))
    }));

    assert_eq!(route.call(get(false)).await.status(), StatusCode::OK);
    assert_eq!(ok_route(&extended).call(get(false)).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(base.len(), 1);
    assert_eq!(*log.lock().unwrap(), vec!["base", "base"]);
}

#[tokio::test]
async fn test_branching_before_bind_leaves_base_untouched() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let base = Chain::new().with(recorder("a1", &log));

    // Branch first, then bind the original
    let _extended = base.with(recorder("b1", &log)).with(recorder("b2", &log));
    let route = ok_route(&base);

    assert_eq!(route.call(get(false)).await.status(), StatusCode::OK);
    assert_eq!(*log.lock().unwrap(), vec!["a1"]);
    assert_eq!(base.names(), vec!["a1"]);
}

#[tokio::test]
async fn test_handler_sees_accumulated_context() {
    let route = Chain::new()
        .with_context(
            from_fn("static", |_, _| Ok(ChainResult::proceed())),
            ContextFragment::new().with("tenant", "acme"),
        )
        .with(from_fn("dynamic", |parts, _| {
            Ok(ChainResult::contribute(
                ContextFragment::new().with("path", parts.uri.path()),
            ))
        }))
        .route(|_req: Request<Body>, ctx: RequestContext| async move { axum::Json(ctx) });

    let body = json_body(route.call(get(false)).await).await;
    assert_eq!(body["tenant"], "acme");
    assert_eq!(body["path"], "/protected");
}

// ============================================================================
// Failures and cancellation
// ============================================================================

#[tokio::test]
async fn test_unit_error_is_internal_error() {
    let route = ok_route(&Chain::new().with(from_fn("broken", |_, _| {
        Err(request_pipeline::AppError::StoreError("backend down".to_string()))
    })));

    let response = route.call(get(false)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert!(!body.to_string().contains("backend down"));
}

struct Slow(Duration);

#[async_trait]
impl Middleware for Slow {
    async fn handle(&self, _parts: &Parts, _ctx: &RequestContext) -> AppResult<ChainResult> {
        tokio::time::sleep(self.0).await;
        Ok(ChainResult::proceed())
    }
}

#[tokio::test]
async fn test_cancellation_stops_later_units() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let route = ok_route(
        &Chain::new()
            .with(Slow(Duration::from_secs(30)))
            .with(recorder("after", &log)),
    );

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let response = route.call_with_cancellation(get(false), token).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json_body(response).await["code"], "TIMEOUT");
    assert!(log.lock().unwrap().is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_exceed_quota() {
    let clock = ManualClock::new(0);
    let route = ok_route(&Chain::new().with(RateLimitUnit::new(
        quota_limiter(10, "60s", &clock),
        Arc::new(Fingerprinter::new("salt")),
    )));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let route = route.clone();
            tokio::spawn(async move { route.call(get(false)).await.status() })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() == StatusCode::OK {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 10);
}

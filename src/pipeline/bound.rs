//! Executing a bound chain for one request.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::context::RequestContext;
use super::handler::Handler;
use super::unit::{ChainResult, MiddlewareUnit};
use crate::metrics;
use crate::models::ErrorEnvelope;
use crate::response::ResponseFactory;

struct BoundInner {
    name: String,
    units: Vec<MiddlewareUnit>,
    initial: RequestContext,
    handler: Box<dyn Handler>,
}

/// A chain snapshot bound to a handler. Cheap to clone and shared by every
/// request to the route.
#[derive(Clone)]
pub struct BoundRoute {
    inner: Arc<BoundInner>,
}

/// How a chain run ended before reaching the handler.
enum Stopped {
    ShortCircuit(Response<Body>),
    Failed,
    Cancelled,
}

impl BoundRoute {
    pub(crate) fn new(
        name: String,
        units: Vec<MiddlewareUnit>,
        initial: RequestContext,
        handler: Box<dyn Handler>,
    ) -> Self {
        Self {
            inner: Arc::new(BoundInner {
                name,
                units,
                initial,
                handler,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Context every request starts from (the merged static fragments).
    pub fn initial_context(&self) -> &RequestContext {
        &self.inner.initial
    }

    /// Run the chain and, if every unit continues, the handler.
    pub async fn call(&self, req: Request<Body>) -> Response<Body> {
        self.call_with_cancellation(req, CancellationToken::new())
            .await
    }

    /// Like [`BoundRoute::call`], but stops once `cancel` fires.
    ///
    /// A unit in flight when the token fires is dropped; no further unit
    /// and no handler runs, and the caller gets a `TIMEOUT` response.
    pub async fn call_with_cancellation(
        &self,
        req: Request<Body>,
        cancel: CancellationToken,
    ) -> Response<Body> {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let mut ctx = self.inner.initial.clone();

        let stopped = 'units: {
            for unit in &self.inner.units {
                if cancel.is_cancelled() {
                    break 'units Some((unit.name(), Stopped::Cancelled));
                }

                let run = AssertUnwindSafe(unit.run(&parts, &ctx)).catch_unwind();
                let outcome = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => None,
                    outcome = run => Some(outcome),
                };

                match outcome {
                    None => break 'units Some((unit.name(), Stopped::Cancelled)),
                    Some(Ok(Ok(ChainResult::Continue(fragment)))) => {
                        ctx.merge(fragment);
                    }
                    Some(Ok(Ok(ChainResult::ShortCircuit(response)))) => {
                        break 'units Some((unit.name(), Stopped::ShortCircuit(response)));
                    }
                    Some(Ok(Err(e))) => {
                        error!(route = %self.inner.name, unit = unit.name(), error = %e, "Middleware unit failed");
                        metrics::record_unit_failure(&self.inner.name, unit.name(), "error");
                        break 'units Some((unit.name(), Stopped::Failed));
                    }
                    Some(Err(payload)) => {
                        error!(
                            route = %self.inner.name,
                            unit = unit.name(),
                            panic = panic_message(payload.as_ref()),
                            "Middleware unit panicked"
                        );
                        metrics::record_unit_failure(&self.inner.name, unit.name(), "panic");
                        break 'units Some((unit.name(), Stopped::Failed));
                    }
                }
            }

            if cancel.is_cancelled() {
                break 'units Some(("handler", Stopped::Cancelled));
            }
            None
        };

        let elapsed = started.elapsed().as_secs_f64();

        match stopped {
            None => {
                metrics::record_chain_duration(&self.inner.name, "passed", elapsed);
                let req = Request::from_parts(parts, body);
                self.inner.handler.call(req, ctx).await
            }
            Some((unit, Stopped::ShortCircuit(response))) => {
                debug!(route = %self.inner.name, unit, status = %response.status(), "Chain short-circuited");
                metrics::record_short_circuit(&self.inner.name, unit);
                metrics::record_chain_duration(&self.inner.name, "short_circuit", elapsed);
                response
            }
            Some((_, Stopped::Failed)) => {
                metrics::record_chain_duration(&self.inner.name, "failed", elapsed);
                ResponseFactory::build(&ErrorEnvelope::internal())
            }
            Some((unit, Stopped::Cancelled)) => {
                warn!(route = %self.inner.name, before = unit, "Request cancelled inside the chain");
                metrics::record_unit_failure(&self.inner.name, unit, "cancelled");
                metrics::record_chain_duration(&self.inner.name, "cancelled", elapsed);
                ResponseFactory::build(&ErrorEnvelope::timeout("Request deadline exceeded."))
            }
        }
    }
}

impl fmt::Debug for BoundRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.inner.units.iter().map(MiddlewareUnit::name).collect();
        f.debug_struct("BoundRoute")
            .field("name", &self.inner.name)
            .field("units", &names)
            .field("initial", &self.inner.initial)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::ErrorCode;
    use crate::pipeline::{Chain, ContextFragment, from_fn};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use std::sync::Mutex;

    async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn echo_context() -> impl Handler {
        |_req: Request<Body>, ctx: RequestContext| async move { axum::Json(ctx) }
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_handler_sees_merged_context() {
        let route = Chain::new()
            .with(from_fn("a", |_, _| {
                Ok(ChainResult::contribute(ContextFragment::new().with("a", 1)))
            }))
            .with(from_fn("b", |_, ctx| {
                let seen = ctx.get("a").cloned().unwrap_or_default();
                Ok(ChainResult::contribute(ContextFragment::new().with("b_saw", seen)))
            }))
            .route(echo_context());

        let body = json_body(route.call(request()).await).await;
        assert_eq!(body, serde_json::json!({"a": 1, "b_saw": 1}));
    }

    #[tokio::test]
    async fn test_static_fragments_seed_context() {
        let route = Chain::new()
            .with_context(
                from_fn("a", |_, ctx| {
                    assert_eq!(ctx.get_str("route"), Some("whoami"));
                    Ok(ChainResult::proceed())
                }),
                ContextFragment::new().with("route", "whoami"),
            )
            .route(echo_context());

        assert_eq!(route.initial_context().get_str("route"), Some("whoami"));
        let body = json_body(route.call(request()).await).await;
        assert_eq!(body["route"], "whoami");
    }

    #[tokio::test]
    async fn test_short_circuit_stops_chain() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let (r1, r3, rh) = (ran.clone(), ran.clone(), ran.clone());

        let route = Chain::new()
            .with(from_fn("first", move |_, _| {
                r1.lock().unwrap().push("first");
                Ok(ChainResult::proceed())
            }))
            .with(from_fn("deny", |_, _| {
                Ok(ChainResult::deny(&ErrorEnvelope::forbidden("nope")))
            }))
            .with(from_fn("third", move |_, _| {
                r3.lock().unwrap().push("third");
                Ok(ChainResult::proceed())
            }))
            .route(move |_req: Request<Body>, _ctx: RequestContext| {
                let ran = rh.clone();
                async move {
                    ran.lock().unwrap().push("handler");
                    StatusCode::OK
                }
            });

        let response = route.call(request()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*ran.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_unit_error_becomes_internal_error() {
        let route = Chain::new()
            .with(from_fn("broken", |_, _| {
                Err(AppError::StoreError("secret connection string".to_string()))
            }))
            .route(echo_context());

        let response = route.call(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["code"], ErrorCode::InternalError.as_str());
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_unit_panic_becomes_internal_error() {
        let route = Chain::new()
            .with(from_fn("panics", |_, _| panic!("boom")))
            .route(echo_context());

        let response = route.call(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_units_and_handler() {
        let route = Chain::new()
            .with(from_fn("never", |_, _| panic!("must not run")))
            .route(echo_context());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let response = route.call_with_cancellation(request(), cancel).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json_body(response).await["code"], "TIMEOUT");
    }

    #[tokio::test]
    async fn test_empty_chain_runs_handler() {
        let route = Chain::new().route(echo_context());
        let response = route.call(request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({}));
    }

    #[test]
    fn test_panic_message() {
        let s: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(s.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}

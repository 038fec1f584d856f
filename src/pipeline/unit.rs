//! Middleware units and their results.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::Response;

use super::context::{ContextFragment, RequestContext};
use crate::error::AppResult;
use crate::models::ErrorEnvelope;
use crate::response::ResponseFactory;

/// What a unit decided about the request.
#[derive(Debug)]
pub enum ChainResult {
    /// Keep going, merging these fields into the context.
    Continue(ContextFragment),
    /// Stop here and answer with this response. Later units and the handler
    /// never run.
    ShortCircuit(Response<Body>),
}

impl ChainResult {
    /// Continue without contributing anything.
    pub fn proceed() -> Self {
        Self::Continue(ContextFragment::new())
    }

    /// Continue and contribute `fragment`.
    pub fn contribute(fragment: ContextFragment) -> Self {
        Self::Continue(fragment)
    }

    /// Short-circuit with the response built from `envelope`.
    pub fn deny(envelope: &ErrorEnvelope) -> Self {
        Self::ShortCircuit(ResponseFactory::build(envelope))
    }

    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::ShortCircuit(_))
    }
}

/// One step of a chain.
///
/// Units see the request head and the context built so far. Denials are
/// returned as [`ChainResult::ShortCircuit`]; `Err` is reserved for
/// unexpected failures and becomes an `INTERNAL_ERROR` response.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, parts: &Parts, ctx: &RequestContext) -> AppResult<ChainResult>;

    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Middleware built from a synchronous closure.
pub struct FnMiddleware<F> {
    name: &'static str,
    f: F,
}

/// Wrap a closure as a unit.
///
/// # Example
///
/// ```rust
/// use request_pipeline::pipeline::{from_fn, ChainResult, ContextFragment};
///
/// let tenant = from_fn("tenant", |parts, _ctx| {
///     let tenant = parts
///         .headers
///         .get("x-tenant")
///         .and_then(|v| v.to_str().ok())
///         .unwrap_or("public")
///         .to_string();
///     Ok(ChainResult::contribute(ContextFragment::new().with("tenant", tenant)))
/// });
/// # let _ = tenant;
/// ```
pub fn from_fn<F>(name: &'static str, f: F) -> FnMiddleware<F>
where
    F: Fn(&Parts, &RequestContext) -> AppResult<ChainResult> + Send + Sync + 'static,
{
    FnMiddleware { name, f }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&Parts, &RequestContext) -> AppResult<ChainResult> + Send + Sync + 'static,
{
    async fn handle(&self, parts: &Parts, ctx: &RequestContext) -> AppResult<ChainResult> {
        (self.f)(parts, ctx)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// A middleware plus an optional static fragment contributed once when the
/// chain is bound to a route.
#[derive(Clone)]
pub struct MiddlewareUnit {
    middleware: Arc<dyn Middleware>,
    fragment: Option<ContextFragment>,
}

impl MiddlewareUnit {
    pub fn new(middleware: impl Middleware) -> Self {
        Self {
            middleware: Arc::new(middleware),
            fragment: None,
        }
    }

    pub fn with_context(middleware: impl Middleware, fragment: ContextFragment) -> Self {
        Self {
            middleware: Arc::new(middleware),
            fragment: Some(fragment),
        }
    }

    /// Reuse a middleware instance already shared elsewhere.
    pub fn from_arc(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            middleware,
            fragment: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.middleware.name()
    }

    pub fn static_fragment(&self) -> Option<&ContextFragment> {
        self.fragment.as_ref()
    }

    pub(crate) async fn run(&self, parts: &Parts, ctx: &RequestContext) -> AppResult<ChainResult> {
        self.middleware.handle(parts, ctx).await
    }
}

impl fmt::Debug for MiddlewareUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareUnit")
            .field("name", &self.name())
            .field("fragment", &self.fragment)
            .finish()
    }
}

impl<M: Middleware> From<M> for MiddlewareUnit {
    fn from(middleware: M) -> Self {
        Self::new(middleware)
    }
}

use std::future::Future;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;

use super::context::RequestContext;

/// The business handler at the end of a chain.
///
/// Implemented for any `Fn(Request<Body>, RequestContext) -> impl Future`
/// whose output implements [`IntoResponse`].
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, req: Request<Body>, ctx: RequestContext) -> Response<Body>;
}

#[async_trait]
impl<F, Fut, R> Handler for F
where
    F: Fn(Request<Body>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    async fn call(&self, req: Request<Body>, ctx: RequestContext) -> Response<Body> {
        (self)(req, ctx).await.into_response()
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;

use crate::error::AppResult;
use crate::fingerprint::Fingerprinter;
use crate::pipeline::{ChainResult, ContextFragment, Middleware, RequestContext};

/// Context key holding the client fingerprint.
pub const FINGERPRINT_KEY: &str = "fingerprint";

/// Contributes the client fingerprint so several limiters (or the handler)
/// share one computation.
#[derive(Debug, Clone)]
pub struct FingerprintUnit {
    fingerprinter: Arc<Fingerprinter>,
}

impl FingerprintUnit {
    pub fn new(fingerprinter: Arc<Fingerprinter>) -> Self {
        Self { fingerprinter }
    }
}

#[async_trait]
impl Middleware for FingerprintUnit {
    async fn handle(&self, parts: &Parts, _ctx: &RequestContext) -> AppResult<ChainResult> {
        Ok(ChainResult::contribute(ContextFragment::new().with(
            FINGERPRINT_KEY,
            self.fingerprinter.fingerprint(&parts.headers),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_contributes_fingerprint() {
        let fingerprinter = Arc::new(Fingerprinter::new("salt"));
        let unit = FingerprintUnit::new(fingerprinter.clone());
        let (parts, _) = Request::builder()
            .header("user-agent", "test")
            .body(())
            .unwrap()
            .into_parts();

        match unit.handle(&parts, &RequestContext::new()).await.unwrap() {
            ChainResult::Continue(fragment) => {
                let mut ctx = RequestContext::new();
                ctx.merge(fragment);
                let expected = fingerprinter.fingerprint(&parts.headers);
                assert_eq!(ctx.get_str(FINGERPRINT_KEY), Some(expected.as_str()));
            }
            ChainResult::ShortCircuit(_) => panic!("fingerprinting never short-circuits"),
        }
    }
}

//! Authentication units.
//!
//! The chain only consumes one question, "is this request authenticated, and
//! as whom?", through the [`AuthProvider`] trait. [`RequireSession`] turns any
//! provider into a unit that short-circuits with `401 UNAUTHORIZED` when the
//! answer is no.
//!
//! # Shared secrets
//!
//! Internal callers authenticate with a static secret header:
//!
//! - `X-Service-Token`: service-to-service calls ([`SharedSecret::service_token`])
//! - `X-Cron-Secret`: the job scheduler ([`SharedSecret::cron_secret`])
//!
//! ```bash
//! curl -X POST -H "X-Service-Token: $SERVICE_TOKEN" http://localhost:3000/api/revalidate
//! ```
//!
//! # Security Features
//!
//! - **Constant-time comparison**: secrets are compared with `subtle`
//! - **Fail closed**: a provider with no configured secret rejects everything

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderName;
use axum::http::request::Parts;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::models::ErrorEnvelope;
use crate::pipeline::{ChainResult, ContextFragment, Middleware, RequestContext};

/// Header carrying the service-to-service token.
pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";

/// Header carrying the scheduler secret.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Context key holding the authenticated subject.
pub const PRINCIPAL_KEY: &str = "auth.principal";

/// Context key holding the scheme that authenticated the request.
pub const SCHEME_KEY: &str = "auth.scheme";

/// Who a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub scheme: &'static str,
}

/// Answers "is this request authenticated?".
///
/// `Ok(None)` means unauthenticated; `Err` is reserved for provider failures
/// (an unreachable session store, say) and becomes a 500.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn authenticate(&self, parts: &Parts) -> AppResult<Option<Principal>>;

    /// Unit name used in logs and metrics.
    fn name(&self) -> &'static str;
}

/// Unit that requires `provider` to authenticate the request.
///
/// On success contributes [`PRINCIPAL_KEY`] and [`SCHEME_KEY`].
pub struct RequireSession<P> {
    provider: P,
}

impl<P: AuthProvider> RequireSession<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: AuthProvider> Middleware for RequireSession<P> {
    async fn handle(&self, parts: &Parts, _ctx: &RequestContext) -> AppResult<ChainResult> {
        match self.provider.authenticate(parts).await? {
            Some(principal) => {
                debug!(subject = %principal.subject, scheme = principal.scheme, "Request authenticated");
                Ok(ChainResult::contribute(
                    ContextFragment::new()
                        .with(PRINCIPAL_KEY, principal.subject)
                        .with(SCHEME_KEY, principal.scheme),
                ))
            }
            None => {
                warn!(path = %parts.uri.path(), provider = self.provider.name(), "Unauthenticated request rejected");
                Ok(ChainResult::deny(&ErrorEnvelope::unauthorized(
                    "Authentication required",
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        self.provider.name()
    }
}

/// Unit checking a shared-secret header.
pub type SharedSecretAuth = RequireSession<SharedSecret>;

impl SharedSecretAuth {
    /// `X-Service-Token` check. `None` rejects every request.
    pub fn service(secret: Option<String>) -> Self {
        Self::new(SharedSecret::service_token(secret))
    }

    /// `X-Cron-Secret` check. `None` rejects every request.
    pub fn cron(secret: Option<String>) -> Self {
        Self::new(SharedSecret::cron_secret(secret))
    }
}

/// Provider comparing one header against a configured secret.
#[derive(Clone)]
pub struct SharedSecret {
    header: HeaderName,
    secret: Option<Arc<str>>,
    subject: &'static str,
    name: &'static str,
}

impl SharedSecret {
    pub fn service_token(secret: Option<String>) -> Self {
        Self::new(
            HeaderName::from_static(SERVICE_TOKEN_HEADER),
            secret,
            "service",
            "ServiceTokenAuth",
        )
    }

    pub fn cron_secret(secret: Option<String>) -> Self {
        Self::new(
            HeaderName::from_static(CRON_SECRET_HEADER),
            secret,
            "cron",
            "CronSecretAuth",
        )
    }

    fn new(
        header: HeaderName,
        secret: Option<String>,
        subject: &'static str,
        name: &'static str,
    ) -> Self {
        let secret = secret.filter(|s| !s.is_empty()).map(Arc::from);
        if secret.is_none() {
            warn!(header = %header, "No secret configured; every request will be rejected");
        }
        Self {
            header,
            secret,
            subject,
            name,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("header", &self.header)
            .field("configured", &self.is_configured())
            .finish()
    }
}

#[async_trait]
impl AuthProvider for SharedSecret {
    async fn authenticate(&self, parts: &Parts) -> AppResult<Option<Principal>> {
        let Some(expected) = self.secret.as_deref() else {
            return Ok(None);
        };

        let provided = parts
            .headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok());

        Ok(match provided {
            Some(provided) if constant_time_eq(provided, expected) => Some(Principal {
                subject: self.subject.to_string(),
                scheme: "shared-secret",
            }),
            Some(_) => {
                debug!(header = %self.header, "Shared secret mismatch");
                None
            }
            None => None,
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Perform constant-time comparison of two strings.
///
/// Length differences still return early; only the contents are compared in
/// constant time.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    fn parts_with(header: Option<(&str, &str)>) -> Parts {
        let mut builder = Request::builder().uri("/api/revalidate");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    async fn run(unit: &impl Middleware, parts: &Parts) -> ChainResult {
        unit.handle(parts, &RequestContext::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_valid_service_token_contributes_principal() {
        let auth = SharedSecretAuth::service(Some("s3cret".to_string()));
        let parts = parts_with(Some((SERVICE_TOKEN_HEADER, "s3cret")));

        match run(&auth, &parts).await {
            ChainResult::Continue(fragment) => {
                let mut ctx = RequestContext::new();
                ctx.merge(fragment);
                assert_eq!(ctx.get_str(PRINCIPAL_KEY), Some("service"));
                assert_eq!(ctx.get_str(SCHEME_KEY), Some("shared-secret"));
            }
            ChainResult::ShortCircuit(_) => panic!("expected continue"),
        }
    }

    #[tokio::test]
    async fn test_wrong_or_missing_secret_is_unauthorized() {
        let auth = SharedSecretAuth::cron(Some("s3cret".to_string()));

        for parts in [
            parts_with(Some((CRON_SECRET_HEADER, "guess"))),
            parts_with(Some((SERVICE_TOKEN_HEADER, "s3cret"))),
            parts_with(None),
        ] {
            match run(&auth, &parts).await {
                ChainResult::ShortCircuit(response) => {
                    assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
                }
                ChainResult::Continue(_) => panic!("expected 401"),
            }
        }
    }

    #[tokio::test]
    async fn test_unconfigured_secret_fails_closed() {
        let auth = SharedSecretAuth::service(Some(String::new()));
        let parts = parts_with(Some((SERVICE_TOKEN_HEADER, "")));
        assert!(run(&auth, &parts).await.is_short_circuit());
    }

    #[test]
    fn test_unit_names() {
        assert_eq!(SharedSecretAuth::service(None).name(), "ServiceTokenAuth");
        assert_eq!(SharedSecretAuth::cron(None).name(), "CronSecretAuth");
    }

    #[test]
    fn test_debug_hides_secret() {
        let provider = SharedSecret::service_token(Some("hunter2".to_string()));
        assert!(!format!("{provider:?}").contains("hunter2"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret123", "secret123"));
        assert!(!constant_time_eq("secret123", "secret456"));
        assert!(!constant_time_eq("short", "much-longer-string"));
    }
}

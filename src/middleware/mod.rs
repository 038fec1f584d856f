//! Middleware units for the request pipeline.
//!
//! - **Request ID**: propagation or generation for log correlation
//! - **Fingerprint**: salted one-way client identity
//! - **Rate Limiting**: interval and quota policies keyed by fingerprint
//! - **Authentication**: shared-secret headers and pluggable session providers
//!
//! Plus the header helpers the units and the route binder share (client IP
//! resolution, request deadlines).
//!
//! # Architecture
//!
//! ```text
//! Request → RequestId → RateLimit → Auth → Handler
//!                           ↓         ↓
//!                   429 Too Many   401 Unauth
//! ```
//!
//! # Security Considerations
//!
//! - Shared secrets are compared in constant time
//! - Raw client IPs never leave the fingerprint generator
//! - Request timeout bounds prevent abuse via extreme values

pub mod auth;
pub mod fingerprint;
pub mod ip;
pub mod rate_limit;
pub mod request_id;
pub mod timeout;

pub use auth::{AuthProvider, Principal, RequireSession, SharedSecret, SharedSecretAuth};
pub use fingerprint::{FINGERPRINT_KEY, FingerprintUnit};
pub use ip::{UNKNOWN_IP, extract_client_ip, normalize_ip};
pub use rate_limit::RateLimitUnit;
pub use request_id::{REQUEST_ID_HEADER, REQUEST_ID_KEY, RequestIdUnit};
pub use timeout::{
    MAX_REQUEST_TIMEOUT_MS, MIN_REQUEST_TIMEOUT_MS, REQUEST_TIMEOUT_HEADER, RequestTimeout,
    effective_deadline, request_timeout,
};

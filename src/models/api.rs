use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Keys currently held by the rate limit store
    pub rate_limit_keys: usize,
    /// Server time
    pub timestamp: DateTime<Utc>,
}

/// What the pipeline learned about the caller.
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub request_id: Option<String>,
    /// Salted client fingerprint (never the raw IP)
    pub fingerprint: Option<String>,
    /// Everything the chain contributed
    pub context: Map<String, Value>,
}

/// Request to revalidate cached pages.
#[derive(Debug, Deserialize)]
pub struct RevalidateRequest {
    /// Absolute paths, e.g. `/blog/hello-world`
    #[serde(default)]
    pub paths: Vec<String>,
    /// Cache tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Response after a revalidation request was accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct RevalidateResponse {
    pub revalidated: bool,
    pub paths: Vec<String>,
    pub tags: Vec<String>,
    /// Authenticated caller
    pub requested_by: Option<String>,
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Response after a scheduled job was triggered.
#[derive(Debug, Serialize, Deserialize)]
pub struct CronRunResponse {
    pub job: String,
    pub accepted: bool,
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

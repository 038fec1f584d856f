mod api;
mod envelope;

pub use api::{CronRunResponse, HealthResponse, RevalidateRequest, RevalidateResponse, WhoAmIResponse};
pub use envelope::{ErrorCode, ErrorEnvelope};

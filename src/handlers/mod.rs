pub mod api;
mod health;

pub use api::{revalidate, run_cron, whoami};
pub use health::health_check;

//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `FINGERPRINT_SALT`: Server-side salt for client fingerprints. When unset a
//!   random salt is generated per process, so rate limit buckets reset on restart
//! - `SERVICE_TOKEN`: Expected `X-Service-Token` for `/api/revalidate`
//! - `CRON_SECRET`: Expected `X-Cron-Secret` for `/api/cron/{job}`
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*` for dev)
//!
//! # Rate Limiting
//!
//! Each mounted limiter reads four variables under its own prefix
//! (`PUBLIC_RATE_LIMIT_*`, `REVALIDATE_RATE_LIMIT_*`):
//!
//! - `*_POLICY`: `interval` or `quota`
//! - `*_WINDOW`: `<positive integer><s|h|d>`, e.g. `10s`, `1h`, `2d`
//! - `*_HITS`: requests per window (quota only, required)
//! - `*_BURST`: extra requests per window on top of `*_HITS` (quota only)
//!
//! Invalid limiter settings fail startup rather than the first request.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::rate_limit::{PolicyKind, RateLimitPolicy, RateLimitSettings};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines (development)
    #[default]
    Pretty,
    /// One JSON object per line (log shippers)
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected 'pretty' or 'json')")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Default deadline for a request's middleware chain (default: 30s).
    /// Clients may override it with `X-Request-Timeout`. `0` disables it.
    pub request_deadline: Option<Duration>,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Salt mixed into every fingerprint (random per process when unset)
    pub fingerprint_salt: Option<String>,

    /// Shared secret for service-to-service calls
    pub service_token: Option<String>,

    /// Shared secret for the job scheduler
    pub cron_secret: Option<String>,

    /// Allowed CORS origins. `*` allows all (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Limiter in front of public endpoints (default: quota, 30 + 10 burst per 60s)
    pub public_rate_limit: RateLimitSettings,

    /// Limiter in front of `/api/revalidate` (default: interval, one per 10s)
    pub revalidate_rate_limit: RateLimitSettings,

    /// How long a key may sit untouched before the sweeper drops it
    /// (default: 1h, never shorter than the longest window)
    pub rate_limit_idle_ttl: Duration,

    /// How often the sweeper runs (default: 60s)
    pub rate_limit_sweep_interval: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level filter (e.g., "info", "debug", "request_pipeline=trace")
    pub log_level: String,

    /// Log output format (default: pretty)
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse, and
    /// `AppError::RateLimit` if a limiter's settings are invalid.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let deadline_ms: u64 = Self::parse_env("REQUEST_DEADLINE_MS", 30_000)?;

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or(defaults.host),
            port: Self::parse_env("PORT", defaults.port)?,
            request_deadline: (deadline_ms > 0).then(|| Duration::from_millis(deadline_ms)),
            max_request_body_size: Self::parse_env(
                "MAX_REQUEST_BODY_SIZE",
                defaults.max_request_body_size,
            )?,

            // Security
            fingerprint_salt: Self::optional_env("FINGERPRINT_SALT"),
            service_token: Self::optional_env("SERVICE_TOKEN"),
            cron_secret: Self::optional_env("CRON_SECRET"),
            cors_allowed_origins: Self::parse_cors_origins(),

            // Rate limiting
            public_rate_limit: Self::parse_rate_limit(
                "PUBLIC_RATE_LIMIT",
                defaults.public_rate_limit,
            )?,
            revalidate_rate_limit: Self::parse_rate_limit(
                "REVALIDATE_RATE_LIMIT",
                defaults.revalidate_rate_limit,
            )?,
            rate_limit_idle_ttl: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_IDLE_TTL_SECS",
                defaults.rate_limit_idle_ttl.as_secs(),
            )?),
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                defaults.rate_limit_sweep_interval.as_secs(),
            )?),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: Self::parse_env("LOG_FORMAT", defaults.log_format)?,
            metrics_port: Self::parse_env("METRICS_PORT", defaults.metrics_port)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` or `AppError::RateLimit` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        self.public_policy()?;
        self.revalidate_policy()?;

        if self.rate_limit_sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_idle_ttl.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_IDLE_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validated policy for public endpoints.
    pub fn public_policy(&self) -> AppResult<RateLimitPolicy> {
        Ok(RateLimitPolicy::from_settings(&self.public_rate_limit)?)
    }

    /// Validated policy for the revalidation endpoint.
    pub fn revalidate_policy(&self) -> AppResult<RateLimitPolicy> {
        Ok(RateLimitPolicy::from_settings(&self.revalidate_rate_limit)?)
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Non-empty value of `name`, if set.
    fn optional_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.is_empty())
    }

    /// Read `{prefix}_POLICY`, `{prefix}_WINDOW`, `{prefix}_HITS` and
    /// `{prefix}_BURST`, falling back to `default` for each.
    fn parse_rate_limit(prefix: &str, default: RateLimitSettings) -> AppResult<RateLimitSettings> {
        let policy: PolicyKind = match env::var(format!("{prefix}_POLICY")) {
            Ok(val) => val.parse()?,
            Err(_) => default.policy,
        };

        let hits = match env::var(format!("{prefix}_HITS")) {
            Ok(val) => Some(val.trim().parse().map_err(|e| {
                AppError::ConfigError(format!("Invalid {prefix}_HITS: {e}"))
            })?),
            Err(_) => default.hits,
        };

        Ok(RateLimitSettings {
            policy,
            window: env::var(format!("{prefix}_WINDOW")).unwrap_or(default.window),
            hits,
            burst: Self::parse_env(&format!("{prefix}_BURST"), default.burst)?,
        })
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redacted(value: &Option<String>) -> &'static str {
            if value.is_some() { "[REDACTED]" } else { "<unset>" }
        }

        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("request_deadline", &self.request_deadline)
            .field("max_request_body_size", &self.max_request_body_size)
            .field("fingerprint_salt", &redacted(&self.fingerprint_salt))
            .field("service_token", &redacted(&self.service_token))
            .field("cron_secret", &redacted(&self.cron_secret))
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("public_rate_limit", &self.public_rate_limit)
            .field("revalidate_rate_limit", &self.revalidate_rate_limit)
            .field("rate_limit_idle_ttl", &self.rate_limit_idle_ttl)
            .field("rate_limit_sweep_interval", &self.rate_limit_sweep_interval)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_deadline: Some(Duration::from_secs(30)),
            max_request_body_size: 1024 * 1024, // 1MB
            // Security
            fingerprint_salt: None,
            service_token: None,
            cron_secret: None,
            cors_allowed_origins: vec!["*".to_string()],
            // Rate limiting
            public_rate_limit: RateLimitSettings {
                policy: PolicyKind::Quota,
                window: "60s".to_string(),
                hits: Some(30),
                burst: 10,
            },
            revalidate_rate_limit: RateLimitSettings {
                policy: PolicyKind::Interval,
                window: "10s".to_string(),
                hits: None,
                burst: 0,
            },
            rate_limit_idle_ttl: Duration::from_secs(3600),
            rate_limit_sweep_interval: Duration::from_secs(60),
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
        }
    }
}

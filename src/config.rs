//! Client configuration.
//!
//! Configuration is via environment variables:
//! - `TODOIST_API_TOKEN` - API token (required before the first call)
//! - `TODOIST_BASE_URL` - Base URL (default: `https://api.todoist.com/api/v1`)
//! - `TODOIST_TIMEOUT_MS` - Per-request timeout in milliseconds (default: 10000)
//! - `TODOIST_RETRY_ATTEMPTS` - Tries per sync batch submission (default: 3)

use std::time::Duration;

/// Default Todoist API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.todoist.com/api/v1";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "TODOIST_API_TOKEN";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Token bucket settings for one endpoint class.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Calls allowed per window.
    pub capacity: u32,
    /// Fixed window after which the bucket is refilled to capacity.
    pub window: Duration,
    /// First backoff delay; doubles per consecutive backoff.
    pub backoff_base: Duration,
    /// Upper bound for a single backoff, jitter included.
    pub backoff_cap: Duration,
}

impl RateLimitConfig {
    /// Todoist REST endpoints.
    pub fn rest() -> Self {
        Self {
            capacity: 300,
            window: Duration::from_secs(60),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }

    /// The Todoist `/sync` endpoint.
    pub fn sync() -> Self {
        Self {
            capacity: 50,
            ..Self::rest()
        }
    }
}

/// Retry delays for sync batch submissions.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total tries, the first one included.
    pub attempts: u32,
    /// Delay before the first retry after a transient server failure.
    pub base_delay: Duration,
    /// Upper bound for the exponential server-failure delay.
    pub max_delay: Duration,
    /// Wait used for a 429 that carried no `Retry-After` header.
    pub default_rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            default_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

/// Everything the Todoist client needs. Immutable once the client is built;
/// only the token may be supplied later through the client itself.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub token: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub rest_limit: RateLimitConfig,
    pub sync_limit: RateLimitConfig,
}

impl ApiConfig {
    /// Create with explicit token and base URL, production defaults otherwise.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            rest_limit: RateLimitConfig::rest(),
            sync_limit: RateLimitConfig::sync(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("TODOIST_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());

        let mut config = Self::new(base_url, token);

        if let Some(ms) = std::env::var("TODOIST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = std::env::var("TODOIST_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
        {
            config.retry.attempts = attempts;
        }

        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limits(mut self, rest: RateLimitConfig, sync: RateLimitConfig) -> Self {
        self.rest_limit = rest;
        self.sync_limit = sync;
        self
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let config = ApiConfig::new("http://localhost:9000/api/v1/", None);
        assert_eq!(config.base_url, "http://localhost:9000/api/v1");
    }

    #[test]
    fn sync_class_has_lower_ceiling_than_rest() {
        assert_eq!(RateLimitConfig::rest().capacity, 300);
        assert_eq!(RateLimitConfig::sync().capacity, 50);
        assert_eq!(RateLimitConfig::sync().window, Duration::from_secs(60));
    }

    #[test]
    fn defaults_match_production_policy() {
        let config = ApiConfig::new(DEFAULT_BASE_URL, Some("t".into()));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.default_rate_limit_wait, Duration::from_secs(60));
    }
}

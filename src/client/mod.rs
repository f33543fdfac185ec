//! HTTP client for the Todoist API.
//!
//! Every call goes through one of two [`RateLimiter`]s (REST or Sync) owned
//! by the client, carries the bearer token, and has its HTTP failures
//! classified into a [`TodoistError`].

mod rate_limiter;
mod rest;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

pub use rate_limiter::*;
pub use rest::*;

use crate::config::{ApiConfig, RetryConfig, TOKEN_ENV};
use crate::error::{Result, TodoistError};

/// One outbound call: method, path relative to the base URL, query pairs,
/// optional JSON body and the rate limit class it is billed to.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub class: EndpointClass,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            class: EndpointClass::Rest,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Add the pair only when a value is present.
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn billed_to(mut self, class: EndpointClass) -> Self {
        self.class = class;
        self
    }
}

/// HTTP client for the Todoist REST and Sync APIs.
///
/// Clones share the token and both rate limiters.
#[derive(Debug, Clone)]
pub struct TodoistClient {
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    http: Client,
    timeout: Duration,
    retry: RetryConfig,
    rest_limiter: RateLimiter,
    sync_limiter: RateLimiter,
}

impl TodoistClient {
    /// Create client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env())
    }

    /// Create with explicit configuration.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TodoistError::unknown(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url,
            token: Arc::new(RwLock::new(config.token)),
            http,
            timeout: config.timeout,
            retry: config.retry,
            rest_limiter: RateLimiter::new(EndpointClass::Rest, config.rest_limit),
            sync_limiter: RateLimiter::new(EndpointClass::Sync, config.sync_limit),
        })
    }

    /// Supply or replace the API token after construction.
    pub fn set_token(&self, token: impl Into<String>) {
        let mut guard = match self.token.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(token.into());
    }

    pub fn has_token(&self) -> bool {
        self.current_token().is_some()
    }

    /// Fail with `Authentication` when no token can be resolved.
    pub fn ensure_token(&self) -> Result<()> {
        self.resolve_token().map(|_| ())
    }

    fn current_token(&self) -> Option<String> {
        let guard = match self.token.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone().filter(|t| !t.trim().is_empty())
    }

    /// The configured token, falling back to the environment as a last
    /// resort. Fails before any network I/O when neither is present.
    fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.current_token() {
            return Ok(token);
        }

        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => {
                debug!("Using API token from {}", TOKEN_ENV);
                self.set_token(token.clone());
                Ok(token)
            }
            _ => Err(TodoistError::Authentication(format!(
                "API token is not configured (set {})",
                TOKEN_ENV
            ))),
        }
    }

    pub fn limiter(&self, class: EndpointClass) -> &RateLimiter {
        match class {
            EndpointClass::Rest => &self.rest_limiter,
            EndpointClass::Sync => &self.sync_limiter,
        }
    }

    pub fn rate_limit_status(&self) -> Vec<RateLimitStatus> {
        vec![self.rest_limiter.status(), self.sync_limiter.status()]
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Execute a request and decode the JSON response.
    ///
    /// Empty bodies (204 No Content) decode as JSON `null`, so `()` and
    /// [`Value`] are valid targets for endpoints that return nothing.
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let token = self.resolve_token()?;

        let limiter = self.limiter(request.class);
        limiter.acquire().await?;

        let url = format!("{}{}", self.base_url, request.path);
        debug!(
            method = %request.method,
            path = %request.path,
            class = request.class.as_str(),
            "Todoist request"
        );

        let mut builder = self.http.request(request.method, &url).bearer_auth(token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TodoistError::from_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, retry_after, &body);

            if matches!(err, TodoistError::RateLimit { .. }) {
                // Delay the next call from any caller on this class.
                limiter.backoff().await;
            } else {
                warn!(status = status.as_u16(), path = %request.path, "Todoist request failed");
            }
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TodoistError::from_transport(e, self.timeout))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> TodoistError {
    match status.as_u16() {
        401 => TodoistError::Authentication("invalid or expired token".to_string()),
        403 => TodoistError::Authentication("insufficient permissions".to_string()),
        404 => TodoistError::NotFound(body_error(body).unwrap_or_else(|| "resource".to_string())),
        429 => TodoistError::rate_limited("Todoist API rate limit reached", retry_after),
        400 => TodoistError::Validation(
            body_error(body).unwrap_or_else(|| "request rejected by Todoist".to_string()),
        ),
        code @ (500 | 502 | 503 | 504) => TodoistError::ServiceUnavailable {
            status: code,
            message: body_error(body).unwrap_or_else(|| status.to_string()),
        },
        code => TodoistError::Unknown {
            status: Some(code),
            message: body_error(body).unwrap_or_else(|| body.chars().take(200).collect()),
        },
    }
}

/// The `error` field of a JSON error body, if there is one.
fn body_error(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

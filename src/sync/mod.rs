//! Todoist sync protocol: batches of commands submitted to `POST /sync`.
//!
//! Submissions are billed to the Sync rate limit class. [`TodoistClient::sync`]
//! submits once; [`TodoistClient::execute_batch`] retries rate limits and
//! transient server failures.

mod command;
mod response;

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

pub use command::*;
pub use response::*;

use crate::client::{ApiRequest, EndpointClass, TodoistClient};
use crate::config::RetryConfig;
use crate::error::{Result, TodoistError};

#[derive(Serialize)]
struct SyncRequest<'a> {
    commands: &'a [SyncCommand],
}

/// How long to wait before retry number `attempt` (1-based) after `err`.
///
/// Rate limits wait for the server's `Retry-After` (or the configured
/// default); everything else doubles from `base_delay` up to `max_delay`.
pub fn retry_delay(policy: &RetryConfig, err: &TodoistError, attempt: u32) -> Duration {
    match err {
        TodoistError::RateLimit { retry_after, .. } => retry_after
            .map(Duration::from_secs)
            .unwrap_or(policy.default_rate_limit_wait),
        _ => {
            let factor = 1u32 << attempt.saturating_sub(1).min(16);
            policy.base_delay.saturating_mul(factor).min(policy.max_delay)
        }
    }
}

impl TodoistClient {
    /// Submit commands once, without retry.
    ///
    /// Meant for one-shot administrative commands such as shared label
    /// rename and removal.
    pub async fn sync(&self, commands: &[SyncCommand]) -> Result<SyncResponse> {
        if commands.is_empty() {
            return Err(TodoistError::Validation(
                "sync needs at least one command".to_string(),
            ));
        }

        let body = serde_json::to_value(SyncRequest { commands })?;
        let response: SyncResponse = self
            .execute(
                ApiRequest::post("/sync")
                    .json(body)
                    .billed_to(EndpointClass::Sync),
            )
            .await?;

        let missing = commands
            .iter()
            .filter(|c| !response.sync_status.contains_key(&c.uuid))
            .count();
        if missing > 0 {
            warn!(missing, "Sync response omitted status for some commands");
        }
        debug!(
            commands = commands.len(),
            temp_ids = response.temp_id_mapping.len(),
            "Sync batch applied"
        );

        Ok(response)
    }

    /// Submit commands with retry on rate limits, timeouts and 5xx.
    ///
    /// Makes at most `retry.attempts` tries; the last error is returned once
    /// they are spent. Other errors are returned immediately.
    pub async fn execute_batch(&self, commands: &[SyncCommand]) -> Result<SyncResponse> {
        let policy = self.retry_config().clone();
        let attempts = policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.sync(commands).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = retry_delay(&policy, &err, attempt);
                    warn!(
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Sync batch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

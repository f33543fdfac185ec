//! Fixed-window token bucket guarding each Todoist endpoint class.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::{Result, TodoistError};

/// Todoist budgets REST and Sync calls separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Rest,
    Sync,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Sync => "sync",
        }
    }
}

/// Snapshot returned by [`RateLimiter::status`].
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub class: EndpointClass,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    pub is_limited: bool,
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
    backoff_until: Option<Instant>,
    /// Backoffs since the last window rollover; drives the exponent.
    consecutive_backoffs: u32,
}

/// Token bucket that resets to full capacity once per window.
///
/// Clones share the same bucket.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    class: EndpointClass,
    config: RateLimitConfig,
    state: Arc<Mutex<BucketState>>,
}

impl RateLimiter {
    pub fn new(class: EndpointClass, config: RateLimitConfig) -> Self {
        let state = BucketState {
            tokens: config.capacity,
            last_refill: Instant::now(),
            backoff_until: None,
            consecutive_backoffs: 0,
        };
        Self {
            class,
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn class(&self) -> EndpointClass {
        self.class
    }

    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(class = self.class.as_str(), "Rate limiter lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        if now.duration_since(state.last_refill) >= self.config.window {
            state.tokens = self.config.capacity;
            state.last_refill = now;
            state.consecutive_backoffs = 0;
            debug!(class = self.class.as_str(), "Rate limit window rolled over");
        }
    }

    fn time_to_reset(&self, state: &BucketState, now: Instant) -> Duration {
        self.config
            .window
            .saturating_sub(now.duration_since(state.last_refill))
    }

    /// Take one token, waiting out any active backoff first.
    ///
    /// Fails with [`TodoistError::RateLimit`] when the window's budget is
    /// spent; `retry_after` is the time left until the window resets.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            let wait_until = {
                let state = self.lock();
                state.backoff_until.filter(|until| *until > Instant::now())
            };
            match wait_until {
                Some(until) => {
                    debug!(class = self.class.as_str(), "Waiting for backoff to expire");
                    tokio::time::sleep_until(until).await;
                }
                None => break,
            }
        }

        // Refill, check and decrement under one guard with no await in between.
        let mut state = self.lock();
        let now = Instant::now();
        self.refill(&mut state, now);

        if state.tokens == 0 {
            let reset_in = self.time_to_reset(&state, now);
            let retry_after = reset_in.as_secs() + u64::from(reset_in.subsec_nanos() > 0);
            warn!(
                class = self.class.as_str(),
                retry_after, "Local rate limit exhausted"
            );
            return Err(TodoistError::rate_limited(
                format!(
                    "{} budget of {} calls per {}s exhausted",
                    self.class.as_str(),
                    self.config.capacity,
                    self.config.window.as_secs()
                ),
                Some(retry_after.max(1)),
            ));
        }

        state.tokens -= 1;
        Ok(())
    }

    /// Delay for the given consecutive backoff: exponential from
    /// `backoff_base`, never above `backoff_cap`, with up to a quarter of
    /// the delay shaved off at random.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.backoff_base.as_millis() as u64;
        let cap_ms = self.config.backoff_cap.as_millis() as u64;

        let ceiling = base_ms.saturating_mul(1u64 << attempt.min(32)).min(cap_ms);
        let jitter = rand::thread_rng().gen_range(0..=ceiling / 4);
        Duration::from_millis(ceiling - jitter)
    }

    /// Suspend the caller for the next backoff delay. Every other caller's
    /// `acquire` waits until the same deadline.
    pub async fn backoff(&self) {
        let delay = {
            let mut state = self.lock();
            let attempt = state.consecutive_backoffs;
            state.consecutive_backoffs = attempt.saturating_add(1);

            let delay = self.backoff_delay(attempt);
            let until = Instant::now() + delay;
            state.backoff_until = Some(match state.backoff_until {
                Some(existing) if existing > until => existing,
                _ => until,
            });
            delay
        };

        warn!(
            class = self.class.as_str(),
            delay_ms = delay.as_millis() as u64,
            "Backing off after rate limit response"
        );
        tokio::time::sleep(delay).await;
    }

    pub fn status(&self) -> RateLimitStatus {
        let mut state = self.lock();
        let now = Instant::now();
        self.refill(&mut state, now);

        let reset_in = self.time_to_reset(&state, now);
        let reset_time = Utc::now()
            + chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero());
        let backing_off = state.backoff_until.is_some_and(|until| until > now);

        RateLimitStatus {
            class: self.class,
            remaining: state.tokens,
            reset_time,
            is_limited: state.tokens == 0 || backing_off,
        }
    }
}

//! Retry and polling combinators
//!
//! Every remote call goes through [`with_retry`], and every "wait until the
//! provider says so" loop goes through [`poll_until`], so the provisioners stay
//! linear and the backoff policy lives in one place.

use crate::error::{CloudError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Retry without sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Un-jittered delay before retry number `attempt + 1`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Polling configuration for asynchronous provider state changes
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the second check
    pub interval: Duration,

    /// Upper bound for the delay between checks
    pub max_interval: Duration,

    /// Growth factor applied to the delay after each check (1.0 = fixed)
    pub backoff: f64,

    /// Total time budget
    pub timeout: Duration,
}

impl PollConfig {
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: 1.0,
            timeout,
        }
    }

    pub fn backoff(interval: Duration, max_interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval,
            backoff: 1.5,
            timeout,
        }
    }
}

/// Outcome of a single poll check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending(String),
}

fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let factor = rand::thread_rng().gen_range(0.5..=1.0);
    delay.mul_f64(factor)
}

/// Run `operation`, retrying transient failures with capped exponential backoff
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_if(config, operation, CloudError::is_transient, f).await
}

/// Like [`with_retry`] with a caller-supplied retryable predicate
pub async fn with_retry_if<T, F, Fut, P>(
    config: &RetryConfig,
    operation: &str,
    retryable: P,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&CloudError) -> bool,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && attempt + 1 < config.max_attempts => {
                let delay = jittered(config.delay_for_attempt(attempt));
                tracing::debug!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation,
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Call `check` until it reports ready or the time budget is exhausted.
///
/// Returns `Ok(None)` on timeout; errors from `check` abort immediately.
pub async fn poll_until<T, F, Fut>(config: &PollConfig, mut check: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut delay = config.interval;
    loop {
        match check().await? {
            PollStatus::Ready(value) => return Ok(Some(value)),
            PollStatus::Pending(status) => {
                tracing::debug!("still waiting (status: {})", status);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(jittered(delay).min(deadline - now)).await;
        delay = delay.mul_f64(config.backoff).min(config.max_interval);
    }
}

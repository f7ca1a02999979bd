//! Retry with randomized exponential backoff.
//!
//! # Retry Policy
//!
//! - Max attempts: 3 (the first call plus 2 retries)
//! - Initial delay: 10 seconds, doubling per retry
//! - Delay bounds: 5 seconds to 60 seconds
//! - Jitter: full down-jitter (multiplier in [0.0, 1.0]) before the floor is applied
//!
//! The last error is returned unchanged once attempts run out.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, counting the first call. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Backoff delay before the first retry.
    pub initial_delay: Duration,
    /// Floor applied after jitter.
    pub min_delay: Duration,
    /// Maximum backoff delay.
    pub max_delay: Duration,
    /// Jitter factor for down-jitter (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(10),
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            jitter_factor: 1.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff with `max_attempts` total attempts.
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A single attempt, never retried.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::with_attempts(1)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Calculate retry delay with exponential backoff and jitter.
///
/// - `backoff_step`: 0 before first retry, 1 before second, etc.
#[must_use]
pub fn calculate_retry_delay(backoff_step: u32, config: &RetryConfig) -> Duration {
    // Exponential backoff: initial_delay * 2^backoff_step
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step.min(62) as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Down-jitter: multiply by random factor in [1 - jitter_factor, 1.0]
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor.clamp(0.0, 1.0);
    let delay = Duration::from_secs_f64(capped * jitter);

    delay.max(config.min_delay).min(config.max_delay)
}

/// Calls `call` until it succeeds or `config.max_attempts` calls have failed.
pub async fn retrying<F, Fut, T, E>(config: &RetryConfig, call: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retrying_if(config, |_: &E| true, call).await
}

/// Like [`retrying`], but only errors accepted by `should_retry` are retried.
///
/// A rejected error is returned at once, without sleeping.
pub async fn retrying_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut should_retry: P,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: FnMut(&E) -> bool,
{
    let attempts = config.attempts();

    // Attempts 1 through attempts-1: can retry on failure
    for attempt in 1..attempts {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if should_retry(&err) => {
                let delay = calculate_retry_delay(attempt - 1, config);
                tracing::debug!(
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying call after error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }

    // Final attempt: no more retries possible
    let result = call().await;
    if let Err(err) = &result
        && attempts > 1
    {
        tracing::warn!(error = %err, attempts, "Giving up after exhausting retries");
    }
    result
}

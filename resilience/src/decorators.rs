//! Single-concern wrappers around one call.
//!
//! Each wrapper takes the call as a future and only asks its error type for a `From`
//! conversion from the error it introduces, so `anyhow::Error` and
//! [`CallError`](quota_types::CallError) both work.

use std::future::Future;
use std::time::Duration;

use quota_budget::{check_before_spending, record_usage};
use quota_limiter::TokenBucket;
use quota_types::{BudgetError, LimiterError, TimedOut};

/// Cancels `call` once `deadline` elapses and returns [`TimedOut`] instead.
pub async fn timeboxed<F, T, E>(deadline: Duration, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimedOut>,
{
    quota_batch::within(deadline, call).await
}

/// Refuses to start `call` once any active budget scope is at its limit, and records
/// `usage(&output)` against every active scope when it succeeds.
///
/// Failed calls record nothing.
pub async fn budget_checked<F, T, E, U>(usage: U, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<BudgetError>,
    U: FnOnce(&T) -> f64,
{
    check_before_spending(0.0)?;
    let output = call.await?;
    record_usage(usage(&output))?;
    Ok(output)
}

/// Draws `amount` from `limiter` before starting `call`.
///
/// Resources already drawn are not returned if `call` later fails or is cancelled.
pub async fn rate_limited<F, T, E>(limiter: &TokenBucket, amount: f64, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<LimiterError>,
{
    limiter.acquire(amount).await?;
    call.await
}

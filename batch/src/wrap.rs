use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use quota_limiter::TokenBucket;
use quota_types::{Failure, LimiterError, TimedOut};

/// Awaits `fut`, cancelling it once `deadline` elapses.
pub async fn within<F, T, E>(deadline: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimedOut>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(TimedOut { after: deadline }.into()),
    }
}

/// Bounds every unit by `deadline`. A unit that overruns is dropped and resolves to
/// [`TimedOut`].
pub fn with_timeout<I, F, T, E>(
    units: I,
    deadline: Duration,
) -> Vec<impl Future<Output = Result<T, E>>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: From<TimedOut>,
{
    units
        .into_iter()
        .map(|unit| within(deadline, unit))
        .collect()
}

/// Makes every unit draw one resource from `limiter` before it starts.
///
/// Each unit holds its own handle to `limiter`, so the units may outlive the borrow.
pub fn with_rate_limit<I, F, T, E>(
    units: I,
    limiter: &Arc<TokenBucket>,
) -> Vec<impl Future<Output = Result<T, E>> + use<I, F, T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: From<LimiterError>,
{
    units
        .into_iter()
        .map(|unit| {
            let limiter = Arc::clone(limiter);
            async move {
                limiter.acquire(1.0).await.map_err(E::from)?;
                unit.await
            }
        })
        .collect()
}

/// Limits the batch to `calls` units started per `period`.
///
/// The limiter is private to this batch: two batches built this way do not throttle
/// each other.
pub fn with_rate_limit_per_period<I, F, T, E>(
    units: I,
    calls: f64,
    period: Duration,
) -> Result<Vec<impl Future<Output = Result<T, E>>>, LimiterError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: From<LimiterError>,
{
    let limiter = Arc::new(TokenBucket::per_period(calls, period)?);
    Ok(with_rate_limit(units, &limiter))
}

/// Turns every unit's error, or panic, into a value.
///
/// The wrapped units never fail, so [`run_all`](crate::run_all) runs the whole batch
/// to completion and yields one outcome per unit.
pub fn isolating_exceptions<I, F, T, E>(
    units: I,
) -> Vec<impl Future<Output = Result<Result<T, Failure<E>>, Infallible>>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    units
        .into_iter()
        .map(|unit| async move {
            let outcome = match AssertUnwindSafe(unit).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(Failure::Error(err)),
                Err(panic_payload) => Err(Failure::Panicked(panic_payload_to_string(
                    &panic_payload,
                ))),
            };
            Ok(outcome)
        })
        .collect()
}

/// Rate limit, then deadline, then isolation.
///
/// The deadline covers the time a unit spends waiting on `limiter`.
pub fn guarded<I, F, T, E>(
    units: I,
    limiter: &Arc<TokenBucket>,
    deadline: Duration,
) -> Vec<impl Future<Output = Result<Result<T, Failure<E>>, Infallible>> + use<I, F, T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: From<LimiterError> + From<TimedOut>,
{
    isolating_exceptions(with_timeout(with_rate_limit(units, limiter), deadline))
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Batch orchestration for independent async units of work.
//!
//! A unit is a not-yet-polled future resolving to a `Result`. The wrappers in this
//! crate take a batch of units and return a batch of wrapped units, so they compose
//! by nesting calls before the batch is handed to [`run_all`]:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use quota_limiter::TokenBucket;
//! # type FetchError = quota_types::CallError<std::io::Error>;
//! # async fn fetch(_: u32) -> Result<String, FetchError> { Ok(String::new()) }
//! # async fn example() -> Result<(), quota_types::LimiterError> {
//! let limiter = Arc::new(TokenBucket::per_period(10.0, Duration::from_secs(1))?);
//! let units = (0..50).map(fetch);
//! let pages = quota_batch::run_dropping_failures(quota_batch::with_timeout(
//!     quota_batch::with_rate_limit(units, &limiter),
//!     Duration::from_secs(30),
//! ))
//! .await;
//! # let _ = pages;
//! # Ok(())
//! # }
//! ```

mod run;
mod wrap;

pub use run::{log_failure, run_all, run_dropping_failures, run_dropping_failures_with};
pub use wrap::{
    guarded, isolating_exceptions, with_rate_limit, with_rate_limit_per_period, with_timeout,
    within,
};

pub use quota_types::{BatchError, Failure, TimedOut};

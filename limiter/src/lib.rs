//! Async token-bucket rate limiting.
//!
//! A [`TokenBucket`] guards one metered resource: requests per minute, tokens per
//! second, and so on. The capacity is a burst ceiling; the refresh rate bounds
//! sustained consumption.
//!
//! # Forced refill
//!
//! Once any acquisition cannot be satisfied immediately, the bucket switches into
//! forced-refill mode and no acquisition, however small, succeeds until the bucket
//! is full again. Without this, a steady trickle of small requests could keep the
//! bucket near empty and average out above the refresh rate after a burst.
//!
//! # Time
//!
//! All timestamps are [`tokio::time::Instant`]s, so tests can pause the runtime
//! clock and advance it deterministically.

mod bucket;
mod history;

pub use bucket::TokenBucket;
pub use history::UsageEntry;

pub use quota_types::{LimitPolicy, LimiterError};

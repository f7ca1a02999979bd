//! Resilience wrappers for calls to external, metered services.
//!
//! The building blocks ([`timeboxed`], [`budget_checked`], [`rate_limited`],
//! [`retrying`]) each add one concern around a call. [`CallPipeline`] stacks them in
//! a fixed order:
//!
//! ```text
//! request limiter -> token limiter -> retry -> budget check -> deadline -> raw call
//! ```
//!
//! Limiters gate admission before any attempt starts, and the deadline bounds each
//! attempt rather than the whole retry loop. [`ServiceRegistry`] builds one profile of
//! limiters, deadline, retry policy and pricing per configured service.

mod decorators;
mod pipeline;
mod registry;
mod retry;

pub use decorators::{budget_checked, rate_limited, timeboxed};
pub use pipeline::CallPipeline;
pub use registry::{ServiceProfile, ServiceRegistry};
pub use retry::{RetryConfig, calculate_retry_delay, retrying, retrying_if};

pub use quota_types::{CallError, TimedOut};

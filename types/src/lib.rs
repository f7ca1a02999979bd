//! Core domain types for quota.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Every other quota crate shares these so that a single call pipeline can surface
//! limiter, budget and timeout failures through one error type.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod errors;
pub mod pricing;

pub use errors::{BatchError, BudgetError, CallError, Failure, LimiterError, TimedOut};
pub use pricing::{MeteredResponse, Pricing, TokenUsage};

use serde::{Deserialize, Serialize};

// ============================================================================
// Limit Policy
// ============================================================================

/// What a limiter does when a request cannot be satisfied immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPolicy {
    /// Suspend the caller until the bucket has refilled.
    #[default]
    Wait,
    /// Fail immediately with [`LimiterError::ResourceUnavailable`].
    Raise,
}

impl LimitPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LimitPolicy::Wait => "wait",
            LimitPolicy::Raise => "raise",
        }
    }
}

impl std::fmt::Display for LimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Amount Validation
// ============================================================================

/// Returns `true` for amounts a limiter or budget can account for.
///
/// NaN and infinities are rejected along with negative values.
#[must_use]
pub fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}

//! Error types shared across the quota crates.
//!
//! Each concern gets its own enum. [`CallError`] aggregates them for call
//! pipelines that need a single error type around a raw call.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimiterError {
    #[error("capacity must be a finite number greater than 0 (got {0})")]
    InvalidCapacity(f64),
    #[error("refresh rate must be a finite, non-negative number (got {0})")]
    InvalidRefreshRate(f64),
    #[error("refill period must be greater than zero (got {0:?})")]
    InvalidPeriod(Duration),
    #[error("amount must be a finite, non-negative number (got {0})")]
    InvalidAmount(f64),
    #[error("requested {amount} exceeds bucket capacity {capacity}; the request could never succeed")]
    ExceedsCapacity { amount: f64, capacity: f64 },
    #[error("resources unavailable: requested {requested}, available {available:.3}")]
    ResourceUnavailable { requested: f64, available: f64 },
    #[error(
        "requested {requested} with {available:.3} available and a refresh rate of 0; waiting would never finish"
    )]
    WouldBlockForever { requested: f64, available: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("hard limit must be a finite, non-negative number (got {0})")]
    InvalidHardLimit(f64),
    #[error("usage amount must be a finite, non-negative number (got {0})")]
    InvalidAmount(f64),
    #[error(
        "spending {projected} would push scope {scope_id} to {} exceeding its hard limit of {hard_limit}",
        .current_usage + .projected
    )]
    BudgetExceeded {
        scope_id: u64,
        current_usage: f64,
        projected: f64,
        hard_limit: f64,
    },
    #[error("no ambient budget stack is bound to this task; enter scopes inside `scoped` or `fork`")]
    NoAmbientStack,
}

/// A deadline elapsed and the in-flight call was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {after:?}")]
pub struct TimedOut {
    pub after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("the number of inputs ({inputs}) must match the number of units ({units})")]
    InputCountMismatch { units: usize, inputs: usize },
}

/// Error tag carried by a unit whose failure was turned into a value.
#[derive(Debug, Error)]
pub enum Failure<E> {
    #[error("{0}")]
    Error(E),
    #[error("unit panicked: {0}")]
    Panicked(String),
}

impl<E> Failure<E> {
    /// Returns the unit's own error, or `None` if the unit panicked.
    pub fn into_error(self) -> Option<E> {
        match self {
            Failure::Error(err) => Some(err),
            Failure::Panicked(_) => None,
        }
    }

    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Failure::Panicked(_))
    }
}

/// Error surfaced by a call pipeline around a raw call failing with `E`.
#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error(transparent)]
    Limiter(#[from] LimiterError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
    #[error("{0}")]
    Call(E),
}

impl<E> CallError<E> {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Limiter and budget failures are permanent for the current attempt loop:
    /// retrying them would only burn the backoff delay.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, CallError::TimedOut(_) | CallError::Call(_))
    }

    #[must_use]
    pub const fn is_budget_exceeded(&self) -> bool {
        matches!(self, CallError::Budget(BudgetError::BudgetExceeded { .. }))
    }

    pub fn into_call_error(self) -> Option<E> {
        match self {
            CallError::Call(err) => Some(err),
            _ => None,
        }
    }
}

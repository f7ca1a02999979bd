//! Hierarchical budget tracking.
//!
//! A [`BudgetScope`] caps the usage (dollars, tokens, requests) of one logical
//! operation. Scopes nest: usage recorded anywhere inside a scope counts against it
//! and against every scope that was active around it.
//!
//! # Ambient stack
//!
//! Active scopes live on a task-local stack, so deeply nested calls can record usage
//! without threading a handle through every signature. The stack is copy-on-write:
//! entering or leaving a scope rebinds the current task's list instead of mutating a
//! shared one.
//!
//! Concurrent branches must each get their own binding. [`fork`] snapshots the
//! caller's stack for one future; the orchestration layer forks every unit it runs,
//! and [`spawn_forked`] does the same for `tokio::spawn`. A forked branch attributes
//! its usage to every scope active at the fork point and never sees scopes a sibling
//! enters afterwards.
//!
//! # Check, then record
//!
//! [`check_before_spending`] refuses new work once a scope is at its limit;
//! [`record_usage`] adds the real cost after the work finished. The first call past a
//! limit can therefore overshoot it: recording only warns, checking raises.
//!
//! ```no_run
//! # async fn forecast() -> Result<f64, quota_types::BudgetError> { Ok(0.0) }
//! # async fn example() -> Result<(), quota_types::BudgetError> {
//! let (result, scope) = quota_budget::scoped(5.0, async {
//!     quota_budget::check_before_spending(0.0)?;
//!     let cost = forecast().await?;
//!     quota_budget::record_usage(cost)
//! })
//! .await?;
//! result?;
//! println!("forecast cost ${:.2}", scope.current_usage());
//! # Ok(())
//! # }
//! ```

mod scope;
mod stack;
mod tracker;

pub use scope::{BudgetScope, ScopeBuilder};
pub use stack::{ScopeGuard, active_scopes, enter_scope, exit_scope, fork, scoped, spawn_forked};
pub use tracker::{check_before_spending, record_usage};

pub use quota_types::BudgetError;

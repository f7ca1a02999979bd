use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use quota_types::{BudgetError, is_valid_amount};

use crate::stack;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// One hierarchical spending cap.
///
/// A hard limit of `0` means unlimited: the scope still accumulates usage but is
/// never checked. Usage stays readable after the scope is left.
#[derive(Debug)]
pub struct BudgetScope {
    id: u64,
    hard_limit: f64,
    label: Option<String>,
    log_usage_when_called: bool,
    usage: Mutex<f64>,
}

/// Builder for scopes that need a label or per-increment logging.
#[derive(Debug, Clone)]
pub struct ScopeBuilder {
    hard_limit: f64,
    label: Option<String>,
    log_usage_when_called: bool,
}

impl ScopeBuilder {
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Log every recorded increment at info level.
    #[must_use]
    pub fn log_usage_when_called(mut self, enabled: bool) -> Self {
        self.log_usage_when_called = enabled;
        self
    }

    pub fn build(self) -> Result<Arc<BudgetScope>, BudgetError> {
        if !is_valid_amount(self.hard_limit) {
            return Err(BudgetError::InvalidHardLimit(self.hard_limit));
        }
        Ok(Arc::new(BudgetScope {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            hard_limit: self.hard_limit,
            label: self.label,
            log_usage_when_called: self.log_usage_when_called,
            usage: Mutex::new(0.0),
        }))
    }
}

impl BudgetScope {
    pub fn new(hard_limit: f64) -> Result<Arc<Self>, BudgetError> {
        Self::builder(hard_limit).build()
    }

    #[must_use]
    pub fn builder(hard_limit: f64) -> ScopeBuilder {
        ScopeBuilder {
            hard_limit,
            label: None,
            log_usage_when_called: false,
        }
    }

    /// Runs `fut` with this scope pushed on top of the caller's stack.
    ///
    /// The scope is active for exactly as long as `fut` is being polled, so it is
    /// released however `fut` ends: output, error, panic or cancellation.
    pub fn run<F: Future>(self: Arc<Self>, fut: F) -> impl Future<Output = F::Output> {
        stack::with_pushed(self, fut)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn hard_limit(&self) -> f64 {
        self.hard_limit
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.hard_limit == 0.0
    }

    #[must_use]
    pub fn current_usage(&self) -> f64 {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `hard_limit - current_usage`; negative once the scope has overshot.
    #[must_use]
    pub fn amount_left(&self) -> f64 {
        self.hard_limit - self.current_usage()
    }

    /// Returns the breach `projected` more usage would cause, if any.
    pub(crate) fn check_room_for(&self, projected: f64) -> Result<(), BudgetError> {
        if self.is_unlimited() {
            return Ok(());
        }
        let current_usage = self.current_usage();
        if current_usage + projected > self.hard_limit {
            return Err(BudgetError::BudgetExceeded {
                scope_id: self.id,
                current_usage,
                projected,
                hard_limit: self.hard_limit,
            });
        }
        Ok(())
    }

    pub(crate) fn add_usage(&self, amount: f64) {
        let total = {
            let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
            *usage += amount;
            *usage
        };

        if !self.is_unlimited() && total > self.hard_limit {
            tracing::warn!(
                scope_id = self.id,
                label = self.label.as_deref(),
                usage = total,
                hard_limit = self.hard_limit,
                "Usage increase exceeded the hard limit"
            );
        }
        if self.log_usage_when_called {
            tracing::info!(
                scope_id = self.id,
                label = self.label.as_deref(),
                usage = total,
                added = amount,
                "Recorded usage"
            );
        }
    }
}

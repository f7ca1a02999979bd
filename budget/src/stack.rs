//! The ambient, task-local scope stack.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use quota_types::BudgetError;
use tokio::task::JoinHandle;

use crate::scope::BudgetScope;

tokio::task_local! {
    static ACTIVE_SCOPES: RefCell<ScopeStack>;
}

/// Immutable list of active scopes, outermost first.
///
/// Pushing or removing builds a new list; existing snapshots never change.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeStack(Arc<[Arc<BudgetScope>]>);

impl ScopeStack {
    fn pushed(&self, scope: Arc<BudgetScope>) -> Self {
        let mut scopes = self.0.to_vec();
        scopes.push(scope);
        Self(scopes.into())
    }

    fn without(&self, id: u64) -> Self {
        let scopes: Vec<_> = self
            .0
            .iter()
            .filter(|scope| scope.id() != id)
            .cloned()
            .collect();
        Self(scopes.into())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<BudgetScope>> {
        self.0.iter()
    }
}

/// Snapshot of the caller's stack; empty outside any binding.
pub(crate) fn current() -> ScopeStack {
    ACTIVE_SCOPES
        .try_with(|stack| stack.borrow().clone())
        .unwrap_or_default()
}

pub(crate) fn with_pushed<F: Future>(
    scope: Arc<BudgetScope>,
    fut: F,
) -> impl Future<Output = F::Output> {
    let stack = current().pushed(scope);
    ACTIVE_SCOPES.scope(RefCell::new(stack), fut)
}

/// Active scopes visible to the caller, outermost first.
#[must_use]
pub fn active_scopes() -> Vec<Arc<BudgetScope>> {
    current().iter().cloned().collect()
}

/// Binds a snapshot of the caller's stack to `fut`.
///
/// The snapshot is taken when `fork` is called, not when `fut` is first polled.
/// Scopes `fut` enters stay private to it, and usage it records reaches every scope
/// that was active at the fork point.
pub fn fork<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    ACTIVE_SCOPES.scope(RefCell::new(current()), fut)
}

/// `tokio::spawn` that carries the caller's scopes into the new task.
pub fn spawn_forked<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fork(fut))
}

/// Creates a scope with `hard_limit` and runs `fut` inside it.
///
/// Returns the scope alongside the output so its usage can be read afterwards.
pub async fn scoped<F: Future>(
    hard_limit: f64,
    fut: F,
) -> Result<(F::Output, Arc<BudgetScope>), BudgetError> {
    let scope = BudgetScope::new(hard_limit)?;
    let output = Arc::clone(&scope).run(fut).await;
    Ok((output, scope))
}

/// Pushes a new scope onto the caller's current binding.
///
/// Needs an ambient binding (from [`scoped`], [`fork`], [`BudgetScope::run`] or the
/// orchestration layer). Prefer [`scoped`] where a block structure fits: the guard
/// only pops the scope when it is exited or dropped.
pub fn enter_scope(hard_limit: f64) -> Result<ScopeGuard, BudgetError> {
    let scope = BudgetScope::new(hard_limit)?;
    ScopeGuard::enter(scope)
}

/// Pops the guard's scope and hands it back for reading.
#[must_use]
pub fn exit_scope(guard: ScopeGuard) -> Arc<BudgetScope> {
    guard.exit()
}

/// Keeps a scope on the ambient stack until exited or dropped.
#[derive(Debug)]
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard {
    scope: Arc<BudgetScope>,
}

impl ScopeGuard {
    pub fn enter(scope: Arc<BudgetScope>) -> Result<Self, BudgetError> {
        ACTIVE_SCOPES
            .try_with(|stack| {
                let next = stack.borrow().pushed(Arc::clone(&scope));
                *stack.borrow_mut() = next;
            })
            .map_err(|_| BudgetError::NoAmbientStack)?;
        Ok(Self { scope })
    }

    #[must_use]
    pub fn scope(&self) -> &Arc<BudgetScope> {
        &self.scope
    }

    #[must_use]
    pub fn exit(self) -> Arc<BudgetScope> {
        Arc::clone(&self.scope)
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let id = self.scope.id();
        // A guard dropped outside any binding has nothing left to pop.
        let _ = ACTIVE_SCOPES.try_with(|stack| {
            let next = stack.borrow().without(id);
            *stack.borrow_mut() = next;
        });
    }
}

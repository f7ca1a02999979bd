use quota_types::{BudgetError, is_valid_amount};

use crate::stack;

/// Adds `amount` to every scope active for the caller.
///
/// Never refuses: a scope pushed past its hard limit only logs a warning.
/// Outside any scope the call validates `amount` and does nothing else.
pub fn record_usage(amount: f64) -> Result<(), BudgetError> {
    if !is_valid_amount(amount) {
        return Err(BudgetError::InvalidAmount(amount));
    }
    if amount == 0.0 {
        tracing::info!("Recorded a usage of zero, which may be a pricing mistake");
    }

    for scope in stack::current().iter() {
        scope.add_usage(amount);
    }
    Ok(())
}

/// Fails if spending `projected` would push any active scope past its hard limit.
///
/// Pass `0.0` to ask whether some scope is already over. Scopes with a hard limit of
/// `0` are unlimited and never fail the check.
pub fn check_before_spending(projected: f64) -> Result<(), BudgetError> {
    if !is_valid_amount(projected) {
        return Err(BudgetError::InvalidAmount(projected));
    }

    for scope in stack::current().iter() {
        if let Err(err) = scope.check_room_for(projected) {
            tracing::debug!(scope_id = scope.id(), %err, "Refusing to spend");
            return Err(err);
        }
    }
    Ok(())
}

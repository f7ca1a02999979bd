use std::fmt::{Debug, Display};
use std::future::Future;

use futures_util::future::try_join_all;
use quota_types::{BatchError, Failure};

use crate::wrap::isolating_exceptions;

/// Runs every unit concurrently and returns their outputs in submission order.
///
/// Each unit gets its own fork of the caller's budget stack: usage it records counts
/// against the scopes active here, and scopes it enters stay invisible to its
/// siblings. The first error cancels the remaining units and is returned.
pub async fn run_all<I, F, T, E>(units: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    try_join_all(units.into_iter().map(quota_budget::fork)).await
}

/// Runs the batch, logs every failure and keeps the successes.
pub async fn run_dropping_failures<I, F, T, E>(units: I) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let outcomes = run_isolated(units).await;
    let indices = 0..outcomes.len();
    keep_successes(outcomes, indices, log_failure).0
}

/// Runs the batch and returns the successes paired with the inputs that produced them.
///
/// `inputs[i]` must describe `units[i]`. Each failure is passed to `on_error` along
/// with its input; use [`log_failure`] for the default behavior. Successes keep
/// their relative submission order.
pub async fn run_dropping_failures_with<U, F, T, E, N, I, C>(
    units: U,
    inputs: N,
    on_error: C,
) -> Result<(Vec<T>, Vec<I>), BatchError>
where
    U: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    N: IntoIterator<Item = I>,
    C: FnMut(Failure<E>, &I),
{
    let units: Vec<F> = units.into_iter().collect();
    let inputs: Vec<I> = inputs.into_iter().collect();
    if units.len() != inputs.len() {
        return Err(BatchError::InputCountMismatch {
            units: units.len(),
            inputs: inputs.len(),
        });
    }

    let outcomes = run_isolated(units).await;
    Ok(keep_successes(outcomes, inputs, on_error))
}

/// Default failure callback: one error-level event per dropped unit.
pub fn log_failure<E: Display, I: Debug>(failure: Failure<E>, input: &I) {
    tracing::error!(input = ?input, panicked = failure.is_panic(), "Dropping failed unit: {failure}");
}

async fn run_isolated<I, F, T, E>(units: I) -> Vec<Result<T, Failure<E>>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    run_all(isolating_exceptions(units))
        .await
        .unwrap_or_else(|never| match never {})
}

fn keep_successes<T, E, I>(
    outcomes: Vec<Result<T, Failure<E>>>,
    inputs: impl IntoIterator<Item = I>,
    mut on_error: impl FnMut(Failure<E>, &I),
) -> (Vec<T>, Vec<I>) {
    let mut results = Vec::with_capacity(outcomes.len());
    let mut kept_inputs = Vec::with_capacity(outcomes.len());

    for (outcome, input) in outcomes.into_iter().zip(inputs) {
        match outcome {
            Ok(value) => {
                results.push(value);
                kept_inputs.push(input);
            }
            Err(failure) => on_error(failure, &input),
        }
    }

    (results, kept_inputs)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use quota_budget::{record_usage, scoped};
    use tokio::time::sleep;

    async fn settle(outcome: Result<u32, String>, delay_ms: u64) -> Result<u32, String> {
        sleep(Duration::from_millis(delay_ms)).await;
        outcome
    }

    async fn fails_on_odd(value: u32) -> Result<u32, String> {
        if value % 2 == 1 {
            Err(format!("{value} is odd"))
        } else {
            Ok(value * 10)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_submission_order() {
        let units = [settle(Ok(1), 300), settle(Ok(2), 100), settle(Ok(3), 200)];
        assert_eq!(run_all(units).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_propagates() {
        let units = [settle(Ok(1), 500), settle(Err("second failed".to_string()), 10)];
        assert_eq!(run_all(units).await.unwrap_err(), "second failed");
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_results() {
        let units: Vec<std::future::Ready<Result<u32, String>>> = Vec::new();
        assert!(run_all(units).await.unwrap().is_empty());
        assert!(run_dropping_failures(Vec::<std::future::Ready<Result<u32, String>>>::new())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn dropping_failures_pairs_survivors_with_inputs() {
        let inputs = vec![1, 2, 3, 4, 6];
        let mut failures = Vec::new();

        let (results, kept) = run_dropping_failures_with(
            inputs.iter().map(|&n| fails_on_odd(n)),
            inputs.clone(),
            |failure, input| failures.push((failure.to_string(), *input)),
        )
        .await
        .unwrap();

        assert_eq!(results, vec![20, 40, 60]);
        assert_eq!(kept, vec![2, 4, 6]);
        assert_eq!(
            failures,
            vec![("1 is odd".to_string(), 1), ("3 is odd".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn dropping_failures_without_inputs_logs_and_keeps_successes() {
        let results = run_dropping_failures((0..5).map(fails_on_odd)).await;
        assert_eq!(results, vec![0, 20, 40]);
    }

    #[tokio::test]
    async fn mismatched_inputs_are_rejected_before_running() {
        let err = run_dropping_failures_with([fails_on_odd(2)], ["a", "b"], log_failure)
            .await
            .unwrap_err();
        assert_eq!(err, BatchError::InputCountMismatch { units: 1, inputs: 2 });
    }

    #[tokio::test]
    async fn units_charge_the_submitting_scope() {
        let (results, scope) = scoped(0.0, async {
            let units = (1..=3).map(|n| async move {
                let (recorded, own) = scoped(0.0, async { record_usage(f64::from(n)) }).await?;
                recorded?;
                Ok::<_, quota_types::BudgetError>(own.current_usage())
            });
            run_all(units).await
        })
        .await
        .unwrap();

        assert_eq!(results.unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(scope.current_usage(), 6.0);
    }
}

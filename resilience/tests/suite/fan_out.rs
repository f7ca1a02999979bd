//! A budgeted operation fanning out into concurrent service calls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use quota_batch::{Failure, guarded, run_all, run_dropping_failures_with};
use quota_budget::{BudgetScope, active_scopes, record_usage, scoped, spawn_forked};
use quota_limiter::TokenBucket;
use quota_resilience::CallError;
use quota_types::TokenUsage;

use crate::common::{Completion, registry};

#[tokio::test(start_paused = true)]
async fn forecast_fan_out_charges_every_level() {
    let registry = registry();
    let pipeline = Arc::new(
        registry
            .get("chat")
            .unwrap()
            .pipeline(|question: &String| question.len() as f64),
    );
    let questions: Vec<String> = ["rain", "snow", "fail", "sun"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut dropped = Vec::new();
    let ((kept, per_question), forecast) = scoped(5.0, async {
        let units = questions.iter().map(|question| {
            let pipeline = Arc::clone(&pipeline);
            let question = question.clone();
            async move {
                let (result, scope) = scoped(0.0, async {
                    pipeline
                        .call(&question, |q| {
                            let q = q.clone();
                            async move {
                                if q == "fail" {
                                    bail!("no forecast for {q}");
                                }
                                Ok(Completion {
                                    text: format!("{q} tomorrow"),
                                    usage: TokenUsage::new(10, 10),
                                })
                            }
                        })
                        .await
                })
                .await?;
                result.map(|completion| (completion, scope.current_usage()))
            }
        });

        let (completions, kept) =
            run_dropping_failures_with(units, questions.clone(), |failure, input: &String| {
                dropped.push((input.clone(), failure.is_panic()));
            })
            .await
            .unwrap();
        let per_question: Vec<f64> = completions.iter().map(|(_, cost)| *cost).collect();
        (kept, per_question)
    })
    .await
    .unwrap();

    assert_eq!(kept, vec!["rain", "snow", "sun"]);
    assert_eq!(dropped, vec![("fail".to_string(), false)]);

    // 10 prompt tokens at 0.0001 plus 10 completion tokens at 0.0002.
    for cost in &per_question {
        assert!((cost - 0.003).abs() < 1e-12);
    }
    assert!((forecast.current_usage() - 0.009).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn guarded_batch_isolates_slow_and_failing_units() {
    let limiter = Arc::new(TokenBucket::per_period(10.0, Duration::from_secs(1)).unwrap());
    let units = (0..4_u64).map(|n| async move {
        match n {
            1 => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(n)
            }
            2 => Err(CallError::Call(anyhow::anyhow!("unit {n} failed"))),
            _ => Ok(n * 100),
        }
    });

    let outcomes = run_all(guarded(units, &limiter, Duration::from_secs(5)))
        .await
        .unwrap_or_else(|never| match never {});

    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0].as_ref().ok(), Some(&0));
    assert!(matches!(
        &outcomes[1],
        Err(Failure::Error(CallError::TimedOut(_)))
    ));
    assert!(matches!(&outcomes[2], Err(Failure::Error(CallError::Call(_)))));
    assert_eq!(outcomes[3].as_ref().ok(), Some(&300));
    assert_eq!(limiter.history().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_workers_share_the_parent_budget() {
    let parent = BudgetScope::new(100.0).unwrap();

    Arc::clone(&parent)
        .run(async {
            let handles: Vec<_> = (1..=4)
                .map(|n| {
                    spawn_forked(async move {
                        assert_eq!(active_scopes().len(), 1);
                        record_usage(f64::from(n))
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        })
        .await;

    assert_eq!(parent.current_usage(), 10.0);
    assert!(active_scopes().is_empty());
}

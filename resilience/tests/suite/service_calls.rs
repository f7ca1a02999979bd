//! Calls through service pipelines built from a limits file.

use std::time::Duration;

use anyhow::{Context, anyhow};
use quota_budget::scoped;
use quota_resilience::CallError;
use quota_types::{BudgetError, TokenUsage};
use tokio::time::{Instant, sleep};

use crate::common::{CallCounter, Completion, registry};

#[allow(clippy::ptr_arg)]
fn prompt_tokens(prompt: &String) -> f64 {
    prompt.split_whitespace().count() as f64
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_and_charged_once() {
    let registry = registry();
    let chat = registry.get("chat").unwrap();
    let pipeline = chat.pipeline(prompt_tokens);
    let calls = CallCounter::default();

    let (result, scope) = scoped(1.0, async {
        pipeline
            .call(&"what will happen next".to_string(), |prompt| {
                let attempt = calls.bump();
                let prompt = prompt.clone();
                async move {
                    if attempt < 3 {
                        return Err(anyhow!("503 from upstream"));
                    }
                    Ok(Completion {
                        text: format!("answer to {prompt}"),
                        usage: TokenUsage::new(100, 50),
                    })
                }
            })
            .await
    })
    .await
    .unwrap();

    let completion = result.unwrap();
    assert_eq!(completion.text, "answer to what will happen next");
    assert_eq!(calls.get(), 3);
    assert!((scope.current_usage() - 0.02).abs() < 1e-12);

    // One draw per call, however many attempts it took.
    let tokens = chat.token_limiter().unwrap().history();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].amount, 4.0);
}

#[tokio::test(start_paused = true)]
async fn request_limiter_spaces_out_a_burst() {
    let registry = registry();
    let chat = registry.get("chat").unwrap();
    let pipeline = chat.pipeline(|_: &u32| 1.0);

    let start = Instant::now();
    let mut finished_at = Vec::new();
    for n in 0..5_u32 {
        pipeline
            .call(&n, |_| async {
                Ok::<_, anyhow::Error>(Completion {
                    text: String::new(),
                    usage: TokenUsage::default(),
                })
            })
            .await
            .unwrap();
        finished_at.push(start.elapsed());
    }

    // Four fit in the burst; the fifth waits for a full refill at one request per second.
    assert!(finished_at[3] < Duration::from_millis(100));
    assert!(finished_at[4] >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn deadline_applies_per_attempt() {
    let registry = registry();
    let pipeline = registry.get("search").unwrap().pipeline(|_: &()| 0.0);
    let calls = CallCounter::default();

    let result = pipeline
        .call(&(), |_| {
            let attempt = calls.bump();
            async move {
                if attempt == 1 {
                    // Longer than the 10 second default deadline.
                    sleep(Duration::from_secs(60)).await;
                }
                Ok::<_, anyhow::Error>(TokenUsage::default())
            }
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn budget_refusal_converts_into_anyhow() {
    async fn search_twice() -> anyhow::Result<()> {
        let registry = registry();
        let pipeline = registry.get("search").unwrap().pipeline(|_: &&str| 0.0);

        for query in ["first", "second"] {
            pipeline
                .call(&query, |_| async { Ok::<_, anyhow::Error>(TokenUsage::default()) })
                .await
                .with_context(|| format!("searching for {query}"))?;
        }
        Ok(())
    }

    let (result, scope) = scoped(0.01, search_twice()).await.unwrap();

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "searching for second");
    let cause = err
        .downcast_ref::<CallError<anyhow::Error>>()
        .expect("pipeline error");
    assert!(matches!(
        cause,
        CallError::Budget(BudgetError::BudgetExceeded { .. })
    ));
    // The first search overshot the cap; recording never refuses.
    assert!((scope.current_usage() - 0.05).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn unthrottled_token_limiter_never_waits() {
    let mut registry = registry();
    assert!(registry.unthrottle("chat"));
    let pipeline = registry.get("chat").unwrap().pipeline(|n: &f64| *n);

    let start = Instant::now();
    for _ in 0..3 {
        pipeline
            .call(&1_000_000.0, |_| async {
                Ok::<_, anyhow::Error>(TokenUsage::default())
            })
            .await
            .unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(100));
}

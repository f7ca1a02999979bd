//! The full wrapper stack around a raw call.

use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quota_limiter::TokenBucket;
use quota_types::CallError;

use crate::decorators::{budget_checked, rate_limited, timeboxed};
use crate::retry::{RetryConfig, retrying_if};

type AmountFn<A> = Box<dyn Fn(&A) -> f64 + Send + Sync>;
type UsageFn<T> = Box<dyn Fn(&T) -> f64 + Send + Sync>;

/// Applies the enabled stages around a raw call, outermost first:
///
/// 1. request limiter (one unit per call)
/// 2. token limiter (`amount_fn(args)` units per call)
/// 3. retry
/// 4. budget check and usage recording
/// 5. per-attempt deadline
///
/// Limiters gate admission once per call, so retries never draw again. The deadline
/// bounds each attempt rather than the whole retry loop. Limiter and budget errors
/// are never retried.
pub struct CallPipeline<A, T> {
    request_limiter: Option<Arc<TokenBucket>>,
    token_limiter: Option<(Arc<TokenBucket>, AmountFn<A>)>,
    retry: Option<RetryConfig>,
    usage: Option<UsageFn<T>>,
    deadline: Option<Duration>,
}

impl<A, T> Default for CallPipeline<A, T> {
    fn default() -> Self {
        Self {
            request_limiter: None,
            token_limiter: None,
            retry: None,
            usage: None,
            deadline: None,
        }
    }
}

impl<A, T> fmt::Debug for CallPipeline<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPipeline")
            .field("request_limiter", &self.request_limiter)
            .field("token_limiter", &self.token_limiter.as_ref().map(|(l, _)| l))
            .field("retry", &self.retry)
            .field("budget_checked", &self.usage.is_some())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl<A, T> CallPipeline<A, T> {
    /// A pipeline with every stage disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.request_limiter = Some(limiter);
        self
    }

    pub fn token_limiter(
        mut self,
        limiter: Arc<TokenBucket>,
        amount_fn: impl Fn(&A) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.token_limiter = Some((limiter, Box::new(amount_fn)));
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Enables the budget stage, recording `usage(&output)` after each success.
    pub fn usage(mut self, usage: impl Fn(&T) -> f64 + Send + Sync + 'static) -> Self {
        self.usage = Some(Box::new(usage));
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Runs `raw(args)` through the enabled stages.
    ///
    /// `raw` is called once per attempt.
    pub async fn call<R, Fut, E>(&self, args: &A, raw: R) -> Result<T, CallError<E>>
    where
        R: Fn(&A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if let Some(limiter) = &self.request_limiter {
            limiter.acquire(1.0).await?;
        }
        if let Some((limiter, amount_fn)) = &self.token_limiter {
            return rate_limited(limiter, amount_fn(args), self.attempts(args, &raw)).await;
        }
        self.attempts(args, &raw).await
    }

    async fn attempts<R, Fut, E>(&self, args: &A, raw: &R) -> Result<T, CallError<E>>
    where
        R: Fn(&A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match &self.retry {
            Some(config) => {
                retrying_if(config, CallError::<E>::is_retryable, || self.attempt(args, raw)).await
            }
            None => self.attempt(args, raw).await,
        }
    }

    async fn attempt<R, Fut, E>(&self, args: &A, raw: &R) -> Result<T, CallError<E>>
    where
        R: Fn(&A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let bounded = async {
            let call = async { raw(args).await.map_err(CallError::Call) };
            match self.deadline {
                Some(deadline) => timeboxed(deadline, call).await,
                None => call.await,
            }
        };
        match &self.usage {
            Some(usage) => budget_checked(usage, bounded).await,
            None => bounded.await,
        }
    }
}

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quota_types::{LimitPolicy, LimiterError, is_valid_amount};
use tokio::time::Instant;

use crate::history::{UsageEntry, UsageHistory};

/// Capacity and refresh rate used by [`TokenBucket::unthrottled`].
const UNTHROTTLED_CAPACITY: f64 = 100_000_000.0;

/// Relative slack under which a bucket counts as full. Sleeping exactly the computed
/// refill time can land a few ulps short of capacity.
const FULL_TOLERANCE: f64 = 1e-9;

/// Shortest sleep between refill checks, so a vanishing deficit never busy-loops.
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// Longest single sleep. Slow buckets wake and re-check until they are full.
const MAX_SLEEP: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_replenish: Instant,
    refilling: bool,
}

impl BucketState {
    fn replenish(&mut self, capacity: f64, refresh_rate: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_replenish);
        let refilled = self.available + elapsed.as_secs_f64() * refresh_rate;
        self.available = if capacity - refilled <= capacity * FULL_TOLERANCE {
            capacity
        } else {
            refilled
        };
        self.last_replenish = now;

        if self.refilling && self.available >= capacity {
            tracing::debug!(capacity, "Bucket refilled, leaving forced-refill mode");
            self.refilling = false;
        }
    }
}

/// Single-resource async rate limiter.
///
/// Share one bucket per limited pool (wrap it in an `Arc`); every method takes `&self`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refresh_rate: f64,
    policy: LimitPolicy,
    state: Mutex<BucketState>,
    history: UsageHistory,
}

impl TokenBucket {
    /// Creates a full bucket that waits when exhausted.
    ///
    /// `refresh_rate` is in units per second. A rate of zero is allowed: the bucket
    /// then serves its initial capacity and nothing more.
    pub fn new(capacity: f64, refresh_rate: f64) -> Result<Self, LimiterError> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(LimiterError::InvalidCapacity(capacity));
        }
        if !is_valid_amount(refresh_rate) {
            return Err(LimiterError::InvalidRefreshRate(refresh_rate));
        }
        if refresh_rate == 0.0 {
            tracing::info!(capacity, "refresh_rate is 0, resources will not refresh");
        }

        Ok(Self {
            capacity,
            refresh_rate,
            policy: LimitPolicy::Wait,
            state: Mutex::new(BucketState {
                available: capacity,
                last_replenish: Instant::now(),
                refilling: false,
            }),
            history: UsageHistory::default(),
        })
    }

    /// Creates a bucket allowing `limit` units per `period`, with `limit` as the burst.
    pub fn per_period(limit: f64, period: Duration) -> Result<Self, LimiterError> {
        if period.is_zero() {
            return Err(LimiterError::InvalidPeriod(period));
        }
        Self::new(limit, limit / period.as_secs_f64())
    }

    /// A bucket so large that nothing realistic ever waits on it.
    #[must_use]
    pub fn unthrottled() -> Self {
        Self {
            capacity: UNTHROTTLED_CAPACITY,
            refresh_rate: UNTHROTTLED_CAPACITY,
            policy: LimitPolicy::Wait,
            state: Mutex::new(BucketState {
                available: UNTHROTTLED_CAPACITY,
                last_replenish: Instant::now(),
                refilling: false,
            }),
            history: UsageHistory::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: LimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    #[must_use]
    pub fn refresh_rate(&self) -> f64 {
        self.refresh_rate
    }

    #[must_use]
    pub fn policy(&self) -> LimitPolicy {
        self.policy
    }

    /// Whether the bucket is in forced-refill mode.
    #[must_use]
    pub fn is_refilling(&self) -> bool {
        let mut state = self.lock_state();
        state.replenish(self.capacity, self.refresh_rate, Instant::now());
        state.refilling
    }

    /// Suspends until `amount` units are available, then deducts them.
    ///
    /// Under [`LimitPolicy::Raise`] an unsatisfiable request fails with
    /// [`LimiterError::ResourceUnavailable`] instead of waiting. Either way the
    /// bucket enters forced-refill mode first.
    pub async fn acquire(&self, amount: f64) -> Result<(), LimiterError> {
        if !is_valid_amount(amount) {
            return Err(LimiterError::InvalidAmount(amount));
        }
        if amount > self.capacity {
            return Err(LimiterError::ExceedsCapacity {
                amount,
                capacity: self.capacity,
            });
        }

        while let Some(wait) = self.try_take(amount)? {
            tokio::time::sleep(wait).await;
        }

        self.history.record(amount, Instant::now());
        Ok(())
    }

    /// Takes `amount` if allowed right now; otherwise returns how long to sleep.
    fn try_take(&self, amount: f64) -> Result<Option<Duration>, LimiterError> {
        let mut state = self.lock_state();
        state.replenish(self.capacity, self.refresh_rate, Instant::now());

        if !state.refilling && amount <= state.available {
            state.available -= amount;
            return Ok(None);
        }

        if !state.refilling {
            tracing::debug!(
                requested = amount,
                available = state.available,
                "Request could not be satisfied, entering forced-refill mode"
            );
            state.refilling = true;
        }

        if self.refresh_rate == 0.0 {
            return Err(LimiterError::WouldBlockForever {
                requested: amount,
                available: state.available,
            });
        }
        if self.policy == LimitPolicy::Raise {
            return Err(LimiterError::ResourceUnavailable {
                requested: amount,
                available: state.available,
            });
        }

        let deficit = self.capacity - state.available;
        let wait = Duration::try_from_secs_f64(deficit / self.refresh_rate)
            .unwrap_or(MAX_SLEEP)
            .clamp(MIN_SLEEP, MAX_SLEEP);
        tracing::debug!(
            requested = amount,
            available = state.available,
            sleep_secs = wait.as_secs_f64(),
            "Waiting for bucket to refill"
        );
        Ok(Some(wait))
    }

    /// Current balance after replenishment.
    #[must_use]
    pub fn peek_available(&self) -> f64 {
        let mut state = self.lock_state();
        state.replenish(self.capacity, self.refresh_rate, Instant::now());
        state.available
    }

    /// Empties the bucket and enters forced-refill mode.
    pub fn reset_to_empty(&self) {
        let mut state = self.lock_state();
        state.available = 0.0;
        state.last_replenish = Instant::now();
        state.refilling = true;
    }

    /// Sum of acquisitions made strictly between `start` and `end`.
    #[must_use]
    pub fn usage_in_window(&self, start: Instant, end: Instant) -> f64 {
        self.history.sum_between(start, end)
    }

    /// Every successful acquisition so far, oldest first.
    ///
    /// The log keeps one entry per acquisition for the life of the bucket. Long-lived
    /// buckets should call [`take_history`](Self::take_history) periodically.
    #[must_use]
    pub fn history(&self) -> Vec<UsageEntry> {
        self.history.snapshot()
    }

    /// Removes and returns the acquisition log, oldest first.
    ///
    /// Only the log is cleared; the balance and refill mode are untouched.
    pub fn take_history(&self) -> Vec<UsageEntry> {
        self.history.drain()
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

use std::sync::{Mutex, PoisonError};

use tokio::time::Instant;

/// One successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageEntry {
    pub amount: f64,
    pub at: Instant,
}

/// Log of successful acquisitions. Grows until drained.
#[derive(Debug, Default)]
pub(crate) struct UsageHistory {
    entries: Mutex<Vec<UsageEntry>>,
}

impl UsageHistory {
    pub(crate) fn record(&self, amount: f64, at: Instant) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(UsageEntry { amount, at });
    }

    /// Sum of entries strictly between `start` and `end`.
    pub(crate) fn sum_between(&self, start: Instant, end: Instant) -> f64 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| start < entry.at && entry.at < end)
            .map(|entry| entry.amount)
            .sum()
    }

    pub(crate) fn drain(&self) -> Vec<UsageEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn snapshot(&self) -> Vec<UsageEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

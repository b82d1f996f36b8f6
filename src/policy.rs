//! Failure routing: one table decides what happens to a file after any stage
//! fails, instead of each stage choosing for itself.

use std::{collections::HashMap, time::Duration};

use crate::error::ErrorKind;

// ---

/// What to do with a file whose pipeline run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Move the file into the quarantine area and record the reason.
    Quarantine,
    /// Log the error and leave the file where it is.
    AbandonInPlace,
    /// Run the failed stage again with backoff, then abandon in place.
    Retry,
}

/// Attempt budget for stages routed to [`Disposition::Retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub attempts: u32,
    pub base_backoff: Duration,
}

impl RetrySettings {
    /// Delay before attempt `attempt + 1`, doubling from the base delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        // ---
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

#[derive(Debug, Clone)]
pub struct FailurePolicy {
    routes: HashMap<ErrorKind, Disposition>,
    pub retry: RetrySettings,
}

impl FailurePolicy {
    /// Default routing: bad input is quarantined, transformation failures stay
    /// in place, storage failures are retried.
    pub fn new(retry: RetrySettings) -> Self {
        // ---
        let routes = HashMap::from([
            (ErrorKind::Parse, Disposition::Quarantine),
            (ErrorKind::Validation, Disposition::Quarantine),
            (ErrorKind::Transform, Disposition::AbandonInPlace),
            (ErrorKind::Storage, Disposition::Retry),
        ]);
        FailurePolicy { routes, retry }
    }

    /// Override the disposition for one error kind.
    pub fn route(mut self, kind: ErrorKind, disposition: Disposition) -> Self {
        self.routes.insert(kind, disposition);
        self
    }

    pub fn disposition(&self, kind: ErrorKind) -> Disposition {
        self.routes
            .get(&kind)
            .copied()
            .unwrap_or(Disposition::AbandonInPlace)
    }
}

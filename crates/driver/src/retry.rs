//! Backoff and retry bookkeeping for OCC conflicts.
//!
//! Only [`LedgerError::OccConflict`] is retried. Every other error ends the
//! unit of work immediately.
//!
//! # Backoff Strategy
//!
//! - Base delay doubles with each retry: `base_delay * 2^retry`
//! - Delay is capped at `max_delay`
//! - Random jitter of 0–50% of the capped delay is added

use std::time::Duration;

use quickstart_ledger::LedgerError;
use rand::Rng;

use crate::{config::RetryConfig, error::DriverError};

/// What the driver should do after a failed attempt.
#[derive(Debug)]
pub(crate) enum RetryDecision {
    /// Sleep `delay`, then run the unit of work again.
    Retry {
        /// 1-based retry number handed to the observer.
        retry: u32,
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Give up with this error.
    Fail(DriverError),
}

/// Tracks attempts of one unit of work.
#[derive(Debug)]
pub(crate) struct RetryTracker<'a> {
    config: &'a RetryConfig,
    retries_used: u32,
}

impl<'a> RetryTracker<'a> {
    pub(crate) fn new(config: &'a RetryConfig) -> Self {
        Self { config, retries_used: 0 }
    }

    /// Number of attempts started so far (the first run counts as one).
    pub(crate) fn attempts(&self) -> u32 {
        self.retries_used + 1
    }

    /// Classifies the error that ended the current attempt.
    pub(crate) fn on_error(&mut self, err: LedgerError) -> RetryDecision {
        if !err.is_occ_conflict() {
            return RetryDecision::Fail(DriverError::Ledger(err));
        }
        if self.retries_used >= self.config.retry_limit() {
            return RetryDecision::Fail(DriverError::RetriesExhausted {
                attempts: self.attempts(),
                source: err,
            });
        }
        let delay = compute_backoff(self.config, self.retries_used);
        self.retries_used += 1;
        RetryDecision::Retry { retry: self.retries_used, delay }
    }
}

/// Computes the backoff before retry number `retry` (0-based).
///
/// `min(base_delay * 2^retry, max_delay) + random(0..=50% of that)`
pub(crate) fn compute_backoff(config: &RetryConfig, retry: u32) -> Duration {
    let base = config.base_delay().saturating_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX));
    let capped = base.min(config.max_delay());

    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}

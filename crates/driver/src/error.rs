//! Error types for the driver layer.
//!
//! [`DriverError`] wraps [`LedgerError`] for failures reported by the ledger
//! service and adds the failures the driver itself produces: exhausted retry
//! budgets, pool timeouts and provisioning outcomes.

use std::time::Duration;

use quickstart_ledger::{LedgerError, LedgerState};
use thiserror::Error;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors produced by the driver, the session pool and the provisioning waiter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// Error reported by the ledger service.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every attempt of a unit of work ended in an OCC conflict.
    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total number of attempts made (first run plus retries).
        attempts: u32,
        /// The conflict that ended the final attempt.
        #[source]
        source: LedgerError,
    },

    /// No pooled session became available in time.
    #[error("Timed out after {waited:?} waiting for a session on ledger {ledger}")]
    SessionAcquireTimeout {
        /// Ledger the pool is bound to.
        ledger: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The ledger did not become active before the provisioning timeout.
    #[error(
        "Ledger {ledger} not active after {waited:?} ({polls} polls, last state {})",
        display_state(.last_state)
    )]
    ProvisioningTimeout {
        /// Ledger being provisioned.
        ledger: String,
        /// Configured timeout that elapsed.
        waited: Duration,
        /// Describe calls completed before the timeout.
        polls: u32,
        /// State reported by the last completed describe, if any.
        last_state: Option<LedgerState>,
    },

    /// The provisioning wait was cancelled.
    #[error("Provisioning of ledger {ledger} cancelled")]
    Cancelled {
        /// Ledger being provisioned.
        ledger: String,
    },

    /// The ledger reached a state from which it can never become active.
    #[error("Ledger {ledger} is {state} and will never become active")]
    LedgerUnavailable {
        /// Ledger being provisioned.
        ledger: String,
        /// The terminal state observed.
        state: LedgerState,
    },
}

fn display_state(state: &Option<LedgerState>) -> String {
    state.map_or_else(|| "unknown".to_owned(), |state| state.to_string())
}

impl DriverError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if the error should stop every later stage of a run.
    ///
    /// Transport and authorization failures from the service are fatal, as
    /// is any failure to bring the ledger to `ACTIVE`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Ledger(err) => err.is_fatal(),
            Self::RetriesExhausted { .. } | Self::SessionAcquireTimeout { .. } => false,
            Self::Config(_)
            | Self::ProvisioningTimeout { .. }
            | Self::Cancelled { .. }
            | Self::LedgerUnavailable { .. } => true,
        }
    }

    /// Returns the underlying service error, if any.
    #[must_use]
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            Self::Ledger(err) | Self::RetriesExhausted { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

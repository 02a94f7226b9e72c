//! Error types returned by the ledger service seam.
//!
//! Every implementation of the service traits (the in-memory service, or a
//! client for the managed service) maps its internal failures onto
//! [`LedgerError`]. Callers classify errors with the `is_*` helpers rather
//! than matching on message text.
//!
//! # Classification
//!
//! | Variant                         | Retried by the driver | Fatal for a run |
//! |---------------------------------|-----------------------|-----------------|
//! | [`LedgerError::OccConflict`]    | yes                   | no              |
//! | [`LedgerError::Connection`]     | no                    | yes             |
//! | [`LedgerError::AccessDenied`]   | no                    | yes             |
//! | everything else                 | no                    | no              |

use std::sync::Arc;

use thiserror::Error;

use crate::types::LedgerState;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for ledger service operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors produced by the ledger service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// No ledger with the given name exists.
    #[error("Ledger not found: {name}")]
    LedgerNotFound {
        /// Name of the missing ledger.
        name: String,
    },

    /// A create request named a ledger that already exists.
    #[error("Ledger already exists: {name}")]
    LedgerAlreadyExists {
        /// Name of the existing ledger.
        name: String,
    },

    /// The ledger exists but its lifecycle state does not allow the operation.
    #[error("Ledger {name} is {state}")]
    InvalidLedgerState {
        /// Name of the ledger.
        name: String,
        /// State observed when the operation was attempted.
        state: LedgerState,
    },

    /// The request was rejected before reaching any ledger (bad name, bad parameter).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what was wrong with the request.
        message: String,
    },

    /// Optimistic concurrency check failed at commit time.
    ///
    /// Another transaction committed a change to data this transaction read
    /// or wrote. The whole unit of work should be retried.
    #[error("OCC conflict in transaction {transaction_id}")]
    OccConflict {
        /// Identifier of the transaction that lost the conflict.
        transaction_id: String,
    },

    /// The session is closed, expired, or already has an open transaction.
    #[error("Invalid session: {message}")]
    InvalidSession {
        /// Description of the session problem.
        message: String,
    },

    /// A statement was submitted to a transaction that already committed or aborted.
    #[error("Transaction {transaction_id} is closed")]
    TransactionClosed {
        /// Identifier of the closed transaction.
        transaction_id: String,
    },

    /// The service rejected a statement (syntax error, unknown table, duplicate table).
    #[error("Statement execution failed: {message}")]
    Execution {
        /// Service-provided description of the failure.
        message: String,
    },

    /// The caller is not authorized to perform the operation.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of the authorization failure.
        message: String,
    },

    /// Transport failure while talking to the service.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying transport error, when one exists.
        #[source]
        source: Option<BoxError>,
    },

    /// Unexpected failure inside the service.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl LedgerError {
    /// Creates a new `LedgerNotFound` error.
    #[must_use]
    pub fn ledger_not_found(name: impl Into<String>) -> Self {
        Self::LedgerNotFound { name: name.into() }
    }

    /// Creates a new `LedgerAlreadyExists` error.
    #[must_use]
    pub fn ledger_already_exists(name: impl Into<String>) -> Self {
        Self::LedgerAlreadyExists { name: name.into() }
    }

    /// Creates a new `InvalidLedgerState` error.
    #[must_use]
    pub fn invalid_ledger_state(name: impl Into<String>, state: LedgerState) -> Self {
        Self::InvalidLedgerState { name: name.into(), state }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Creates a new `OccConflict` error.
    #[must_use]
    pub fn occ_conflict(transaction_id: impl Into<String>) -> Self {
        Self::OccConflict { transaction_id: transaction_id.into() }
    }

    /// Creates a new `InvalidSession` error.
    #[must_use]
    pub fn invalid_session(message: impl Into<String>) -> Self {
        Self::InvalidSession { message: message.into() }
    }

    /// Creates a new `TransactionClosed` error.
    #[must_use]
    pub fn transaction_closed(transaction_id: impl Into<String>) -> Self {
        Self::TransactionClosed { transaction_id: transaction_id.into() }
    }

    /// Creates a new `Execution` error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution { message: message.into() }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied { message: message.into() }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns `true` for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_occ_conflict(&self) -> bool {
        matches!(self, Self::OccConflict { .. })
    }

    /// Returns `true` when the session that produced this error must not be reused.
    #[must_use]
    pub fn is_invalid_session(&self) -> bool {
        matches!(self, Self::InvalidSession { .. })
    }

    /// Returns `true` for transport and authorization failures.
    ///
    /// These cannot be fixed by retrying or by moving on to another
    /// statement, so a run should stop at the first one.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::AccessDenied { .. })
    }
}

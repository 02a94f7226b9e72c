//! The service seam: traits every ledger service implementation provides.
//!
//! The managed service exposes two planes:
//!
//! - the **control plane** ([`LedgerControl`]) creates and describes ledgers;
//! - the **session plane** ([`SessionService`] → [`Session`] → [`Transaction`])
//!   runs statements against one active ledger.
//!
//! Everything above this module (the session pool, the retry driver, the
//! provisioning waiter) is written against these traits only, so the same
//! code runs against [`MemoryLedgerService`](crate::MemoryLedgerService) in
//! tests and against a network client in production.
//!
//! # Sessions and transactions
//!
//! A session has at most one open transaction. A transaction buffers its
//! writes until [`commit`](Transaction::commit); the commit either applies
//! every buffered write or none of them. Conflicting commits fail with
//! [`LedgerError::OccConflict`](crate::LedgerError::OccConflict).

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::LedgerResult,
    results::StatementResult,
    types::{CreateLedgerRequest, CreateLedgerResponse, LedgerDescription},
};

/// Control-plane operations on ledgers.
#[async_trait]
pub trait LedgerControl: Send + Sync {
    /// Requests creation of a ledger.
    ///
    /// Creation is asynchronous: the response normally reports
    /// [`LedgerState::Creating`](crate::LedgerState::Creating) and the ledger
    /// becomes active some time later.
    ///
    /// # Errors
    ///
    /// - [`LedgerAlreadyExists`](crate::LedgerError::LedgerAlreadyExists) if the name is taken
    /// - [`InvalidRequest`](crate::LedgerError::InvalidRequest) for rejected parameters
    /// - transport and authorization errors
    async fn create_ledger(&self, request: CreateLedgerRequest)
    -> LedgerResult<CreateLedgerResponse>;

    /// Returns the current description of a ledger.
    ///
    /// # Errors
    ///
    /// - [`LedgerNotFound`](crate::LedgerError::LedgerNotFound) if no such ledger exists
    /// - transport and authorization errors
    async fn describe_ledger(&self, name: &str) -> LedgerResult<LedgerDescription>;
}

/// Session-plane entry point.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Opens a new session bound to `ledger`.
    ///
    /// # Errors
    ///
    /// - [`LedgerNotFound`](crate::LedgerError::LedgerNotFound) if the ledger does not exist
    /// - [`InvalidLedgerState`](crate::LedgerError::InvalidLedgerState) if it is not active
    async fn start_session(&self, ledger: &str) -> LedgerResult<Box<dyn Session>>;
}

/// A session bound to one ledger.
#[async_trait]
pub trait Session: Send + Sync {
    /// Returns the session identifier.
    fn id(&self) -> &str;

    /// Returns the ledger the session is bound to.
    fn ledger(&self) -> &str;

    /// Starts a transaction on this session.
    ///
    /// The returned handle is shared so that a unit of work and the code that
    /// commits it can both hold it.
    ///
    /// # Errors
    ///
    /// [`InvalidSession`](crate::LedgerError::InvalidSession) if the session
    /// is closed or already has an open transaction.
    async fn start_transaction(&self) -> LedgerResult<Arc<dyn Transaction>>;

    /// Closes the session. Further calls fail with
    /// [`InvalidSession`](crate::LedgerError::InvalidSession).
    async fn end(&self) -> LedgerResult<()>;
}

/// An open transaction.
///
/// All methods take `&self`; implementations guard their buffered state
/// internally. After `commit` or `abort` returns (successfully or not) the
/// transaction is closed.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Returns the transaction identifier.
    fn id(&self) -> &str;

    /// Executes one statement.
    ///
    /// Writes are buffered until commit. Reads see committed data plus this
    /// transaction's own buffered inserts.
    ///
    /// # Errors
    ///
    /// - [`Execution`](crate::LedgerError::Execution) for rejected statements
    /// - [`TransactionClosed`](crate::LedgerError::TransactionClosed) after commit or abort
    async fn execute(&self, statement: &str) -> LedgerResult<StatementResult>;

    /// Commits every buffered write atomically.
    ///
    /// # Errors
    ///
    /// - [`OccConflict`](crate::LedgerError::OccConflict) if data this transaction read or
    ///   wrote changed after it was read
    /// - [`TransactionClosed`](crate::LedgerError::TransactionClosed) if already closed
    async fn commit(&self) -> LedgerResult<()>;

    /// Discards every buffered write.
    async fn abort(&self) -> LedgerResult<()>;
}

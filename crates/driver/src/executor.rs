//! Handle a unit of work uses to run statements.

use std::{fmt, sync::Arc};

use quickstart_ledger::{LedgerResult, Statement, StatementResult, Transaction};

/// Runs statements inside the transaction of the current attempt.
///
/// Handed to the unit of work by [`LedgerDriver::execute`](crate::LedgerDriver::execute).
/// The driver commits or aborts the transaction; the unit of work only
/// executes statements. Cloning yields a handle to the same transaction.
#[derive(Clone)]
pub struct TransactionExecutor {
    transaction: Arc<dyn Transaction>,
}

impl TransactionExecutor {
    pub(crate) fn new(transaction: Arc<dyn Transaction>) -> Self {
        Self { transaction }
    }

    /// Executes raw statement text.
    ///
    /// # Errors
    ///
    /// Returns whatever the service reports; conflicts are retried by the
    /// driver when they end the unit of work.
    pub async fn execute(&self, statement: &str) -> LedgerResult<StatementResult> {
        tracing::debug!(transaction = self.transaction.id(), statement, "executing statement");
        self.transaction.execute(statement).await
    }

    /// Renders and executes a [`Statement`].
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_statement(&self, statement: &Statement) -> LedgerResult<StatementResult> {
        self.execute(&statement.to_string()).await
    }
}

impl fmt::Debug for TransactionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionExecutor").field("transaction", &self.transaction.id()).finish()
    }
}

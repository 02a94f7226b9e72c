//! Statement helpers used by the quickstart stages.
//!
//! These only format statement text and submit it. Table names and
//! documents are not validated here; the service rejects bad statements
//! with [`LedgerError::Execution`](quickstart_ledger::LedgerError::Execution).

use quickstart_ledger::{Document, LedgerResult, Statement, StatementResult};

use crate::executor::TransactionExecutor;

/// Creates `table`.
///
/// # Errors
///
/// Returns the service's error, for example when the table already exists.
pub async fn create_table(
    executor: &TransactionExecutor,
    table: &str,
) -> LedgerResult<StatementResult> {
    tracing::info!(table, "creating table");
    executor.execute(&format!("CREATE TABLE {table}")).await
}

/// Inserts one document into `table`.
///
/// Returns the service's result, which carries the generated document id.
///
/// # Errors
///
/// Returns the service's error, for example when the table does not exist.
pub async fn insert_document(
    executor: &TransactionExecutor,
    table: &str,
    document: Document,
) -> LedgerResult<StatementResult> {
    let statement = Statement::insert(table, document);
    tracing::info!(table, %statement, "inserting document");
    executor.execute_statement(&statement).await
}

/// Reads every document of `table`.
///
/// # Errors
///
/// Returns the service's error, for example when the table does not exist.
pub async fn select_all(
    executor: &TransactionExecutor,
    table: &str,
) -> LedgerResult<StatementResult> {
    tracing::info!(table, "querying table");
    executor.execute(&format!("SELECT * FROM {table}")).await
}

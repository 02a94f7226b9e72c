//! Transactional unit-of-work runner with OCC retry.
//!
//! [`LedgerDriver::execute`] runs a closure inside a transaction on a pooled
//! session. If the attempt ends in an OCC conflict (raised by a statement or
//! by the commit) the whole closure runs again in a fresh transaction, up to
//! the configured retry limit. Every other error is returned as-is.

use std::{future::Future, sync::Arc};

use quickstart_ledger::{LedgerResult, SessionService};

use crate::{
    config::DriverConfig,
    error::DriverResult,
    executor::TransactionExecutor,
    pool::{PooledSession, SessionPool},
    retry::{RetryDecision, RetryTracker},
};

/// Runs units of work against one ledger.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use quickstart_driver::{DriverConfig, LedgerDriver, statements};
/// use quickstart_ledger::{
///     CreateLedgerRequest, LedgerControl, LedgerName, MemoryLedgerConfig, MemoryLedgerService,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service =
///     MemoryLedgerService::with_config(MemoryLedgerConfig::builder().activation_polls(0).build());
/// let name = LedgerName::new("MyLedger")?;
/// service.create_ledger(CreateLedgerRequest::builder().name(name).build()).await?;
/// service.describe_ledger("MyLedger").await?;
///
/// let config = DriverConfig::builder().ledger_name("MyLedger").build()?;
/// let driver = LedgerDriver::new(Arc::new(service), config);
/// driver
///     .execute(
///         |txn| async move { statements::create_table(&txn, "MyTable").await.map(|_| ()) },
///         |retry| println!("retrying ({retry})"),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LedgerDriver {
    pool: SessionPool,
    config: DriverConfig,
}

impl LedgerDriver {
    /// Creates a driver whose sessions are opened through `service`.
    #[must_use]
    pub fn new(service: Arc<dyn SessionService>, config: DriverConfig) -> Self {
        let pool = SessionPool::new(service, config.ledger_name().clone(), config.pool().clone());
        Self { pool, config }
    }

    /// Returns the driver configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Returns the session pool.
    #[must_use]
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Runs `work` in a transaction and commits it.
    ///
    /// One pooled session serves every attempt. Each attempt starts a new
    /// transaction and calls `work` with an executor for it. When `work`
    /// succeeds the transaction is committed; when it fails the transaction
    /// is aborted.
    ///
    /// On an OCC conflict `on_retry` is called with the 1-based retry number,
    /// the driver backs off, and `work` runs again. `on_retry` observes
    /// retries; it cannot stop them.
    ///
    /// # Errors
    ///
    /// - [`DriverError::RetriesExhausted`](crate::DriverError::RetriesExhausted) if every
    ///   attempt conflicted
    /// - [`DriverError::Ledger`](crate::DriverError::Ledger) for any other service error,
    ///   returned after the first occurrence
    /// - pool errors from acquiring the session
    #[tracing::instrument(
        skip_all,
        fields(ledger = %self.config.ledger_name(), retry_limit = self.config.retry().retry_limit())
    )]
    pub async fn execute<T, F, Fut, R>(&self, mut work: F, mut on_retry: R) -> DriverResult<T>
    where
        F: FnMut(TransactionExecutor) -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
        R: FnMut(u32),
    {
        let mut session = self.pool.acquire().await?;
        let mut tracker = RetryTracker::new(self.config.retry());

        loop {
            let err = match attempt(&session, &mut work).await {
                Ok(value) => {
                    if tracker.attempts() > 1 {
                        tracing::debug!(attempts = tracker.attempts(), "committed after retry");
                    }
                    return Ok(value);
                },
                Err(err) => err,
            };

            if err.is_invalid_session() {
                session.discard();
            }

            match tracker.on_error(err) {
                RetryDecision::Retry { retry, delay } => {
                    on_retry(retry);
                    tracing::debug!(
                        attempt = retry,
                        delay_ms = delay.as_millis() as u64,
                        "OCC conflict, retrying after backoff",
                    );
                    tokio::time::sleep(delay).await;
                },
                RetryDecision::Fail(err) => {
                    tracing::debug!(error = %err, "unit of work failed");
                    return Err(err);
                },
            }
        }
    }

    /// Closes the session pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn attempt<T, F, Fut>(session: &PooledSession, work: &mut F) -> LedgerResult<T>
where
    F: FnMut(TransactionExecutor) -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let transaction = session.start_transaction().await?;
    let executor = TransactionExecutor::new(Arc::clone(&transaction));

    let outcome = match work(executor).await {
        Ok(value) => transaction.commit().await.map(|()| value),
        Err(err) => Err(err),
    };

    if outcome.is_err()
        && let Err(abort_err) = transaction.abort().await
    {
        tracing::debug!(error = %abort_err, "abort after failed attempt also failed");
    }
    outcome
}

//! The quickstart run: provision, create table, insert, query.
//!
//! Each stage produces a [`StageOutcome`]. A failed provisioning stage or a
//! fatal error (transport, authorization) skips every later stage. Any other
//! failure is logged and the next stage still runs.

use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use quickstart_driver::{
    DriverError, DriverResult, LedgerDriver, ProvisioningWaiter, print_documents, statements,
};
use quickstart_ledger::{Document, LedgerControl, MemoryLedgerService, SessionService};
use tokio_util::sync::CancellationToken;

use crate::config::QuickstartConfig;

/// A step of the run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Create the ledger and wait until it is active.
    Provision,
    /// Create the table.
    CreateTable,
    /// Insert the timestamp document.
    Insert,
    /// Query the table and print every document.
    Query,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 4] = [Stage::Provision, Stage::CreateTable, Stage::Insert, Stage::Query];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision => write!(f, "provision"),
            Self::CreateTable => write!(f, "create-table"),
            Self::Insert => write!(f, "insert"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage completed.
    Succeeded {
        /// Human-readable summary.
        detail: String,
    },
    /// The stage ran and failed.
    Failed {
        /// Rendered error.
        error: String,
        /// Whether the failure stopped the run.
        fatal: bool,
    },
    /// The stage did not run.
    Skipped {
        /// Why it did not run.
        reason: String,
    },
}

/// Result of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Which stage.
    pub stage: Stage,
    /// How it ended.
    pub status: StageStatus,
    /// Wall-clock time spent in the stage.
    pub elapsed: Duration,
}

impl StageOutcome {
    /// Returns `true` if the stage succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.status, StageStatus::Succeeded { .. })
    }

    /// Returns `true` if the stage was skipped.
    #[must_use]
    pub fn skipped(&self) -> bool {
        matches!(self.status, StageStatus::Skipped { .. })
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            StageStatus::Succeeded { detail } => {
                write!(f, "{:<12} ok       {detail} ({:?})", self.stage, self.elapsed)
            },
            StageStatus::Failed { error, .. } => {
                write!(f, "{:<12} FAILED   {error} ({:?})", self.stage, self.elapsed)
            },
            StageStatus::Skipped { reason } => write!(f, "{:<12} skipped  {reason}", self.stage),
        }
    }
}

/// Outcomes of every stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    outcomes: Vec<StageOutcome>,
}

impl RunReport {
    /// Returns the outcomes in execution order.
    #[must_use]
    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.outcomes
    }

    /// Returns the outcome of `stage`, if it was recorded.
    #[must_use]
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|outcome| outcome.stage == stage)
    }

    /// Returns `true` only if every stage ran and succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.len() == Stage::ALL.len() && self.outcomes.iter().all(StageOutcome::succeeded)
    }

    fn push(&mut self, stage: Stage, status: StageStatus, elapsed: Duration) {
        self.outcomes.push(StageOutcome { stage, status, elapsed });
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{outcome}")?;
        }
        Ok(())
    }
}

/// Runs the quickstart stages against a ledger service.
pub struct Quickstart {
    config: QuickstartConfig,
    control: Arc<dyn LedgerControl>,
    sessions: Arc<dyn SessionService>,
}

impl fmt::Debug for Quickstart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quickstart").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Quickstart {
    /// Creates a run over the given control and session planes.
    #[must_use]
    pub fn new(
        config: QuickstartConfig,
        control: Arc<dyn LedgerControl>,
        sessions: Arc<dyn SessionService>,
    ) -> Self {
        Self { config, control, sessions }
    }

    /// Creates a run over `service`, which serves both planes.
    #[must_use]
    pub fn with_service(config: QuickstartConfig, service: MemoryLedgerService) -> Self {
        Self::new(config, Arc::new(service.clone()), Arc::new(service))
    }

    /// Runs every stage and reports how each ended.
    ///
    /// # Errors
    ///
    /// Fails only if the configuration is invalid; stage failures are
    /// recorded in the report.
    #[tracing::instrument(skip_all, fields(ledger = %self.config.ledger_name))]
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<RunReport> {
        let ledger = self.config.ledger()?;
        let driver = LedgerDriver::new(Arc::clone(&self.sessions), self.config.driver_config()?);
        let waiter =
            ProvisioningWaiter::new(Arc::clone(&self.control), self.config.provisioning.clone());

        let mut run = StageRunner::default();

        let provision = async {
            let provisioned = waiter.ensure_ledger_active(&ledger, cancel).await?;
            Ok::<_, DriverError>(format!(
                "ledger {} is {} after {} polls",
                provisioned.description.name, provisioned.description.state, provisioned.polls
            ))
        };
        if !run.stage(Stage::Provision, provision).await {
            run.halt("ledger is not active");
        }

        let created = run.stage(Stage::CreateTable, self.create_table(&driver)).await;
        if created && !self.config.table_settle_delay.is_zero() {
            tracing::info!(
                delay_ms = self.config.table_settle_delay.as_millis() as u64,
                "waiting for the table to settle"
            );
            tokio::select! {
                () = cancel.cancelled() => run.halt("run cancelled"),
                () = tokio::time::sleep(self.config.table_settle_delay) => {},
            }
        }

        run.stage(Stage::Insert, self.insert(&driver)).await;
        run.stage(Stage::Query, self.query(&driver)).await;

        driver.close().await;
        Ok(run.report)
    }

    async fn create_table(&self, driver: &LedgerDriver) -> DriverResult<String> {
        let table = self.config.table_name.as_str();
        driver
            .execute(
                |txn| async move { statements::create_table(&txn, table).await.map(|_| ()) },
                |retry| log_retry(Stage::CreateTable, retry),
            )
            .await?;
        Ok(format!("table {table} created"))
    }

    async fn insert(&self, driver: &LedgerDriver) -> DriverResult<String> {
        let table = self.config.table_name.as_str();
        let field = self.config.timestamp_field.as_str();
        let timestamp = Utc::now().timestamp_millis();

        let ids: Vec<Document> = driver
            .execute(
                |txn| async move {
                    let document = Document::with_field(field, timestamp);
                    Ok(statements::insert_document(&txn, table, document).await?.collect())
                },
                |retry| log_retry(Stage::Insert, retry),
            )
            .await?;

        let ids: Vec<String> = ids
            .iter()
            .filter_map(|doc| doc.get("documentId").and_then(|id| id.as_str()).map(str::to_owned))
            .collect();
        Ok(format!("inserted {{ '{field}': {timestamp} }} as {}", ids.join(", ")))
    }

    async fn query(&self, driver: &LedgerDriver) -> DriverResult<String> {
        let table = self.config.table_name.as_str();
        let documents: Vec<Document> = driver
            .execute(
                |txn| async move { Ok(statements::select_all(&txn, table).await?.collect()) },
                |retry| log_retry(Stage::Query, retry),
            )
            .await?;

        let printed = print_documents(documents);
        Ok(format!("{printed} documents in {table}"))
    }
}

fn log_retry(stage: Stage, retry: u32) {
    tracing::info!(%stage, retry, "Retrying due to OCC conflict...");
}

/// Records outcomes and tracks whether later stages must be skipped.
#[derive(Default)]
struct StageRunner {
    report: RunReport,
    halted: Option<String>,
}

impl StageRunner {
    fn halt(&mut self, reason: &str) {
        self.halted.get_or_insert_with(|| reason.to_owned());
    }

    /// Runs `work` unless the run was halted. Returns `true` on success.
    async fn stage<F>(&mut self, stage: Stage, work: F) -> bool
    where
        F: Future<Output = DriverResult<String>>,
    {
        if let Some(reason) = &self.halted {
            tracing::warn!(%stage, reason, "stage skipped");
            let status = StageStatus::Skipped { reason: reason.clone() };
            self.report.push(stage, status, Duration::ZERO);
            return false;
        }

        let started = Instant::now();
        let result = work.await;
        let elapsed = started.elapsed();

        match result {
            Ok(detail) => {
                tracing::info!(%stage, detail, "stage succeeded");
                self.report.push(stage, StageStatus::Succeeded { detail }, elapsed);
                true
            },
            Err(err) => {
                let fatal = err.is_fatal();
                tracing::error!(%stage, fatal, error = %err, "stage failed");
                if fatal {
                    self.halt(&format!("{stage} failed: {err}"));
                }
                let status = StageStatus::Failed { error: err.to_string(), fatal };
                self.report.push(stage, status, elapsed);
                false
            },
        }
    }
}

//! In-memory ledger service.
//!
//! [`MemoryLedgerService`] implements both [`LedgerControl`] and
//! [`SessionService`] entirely in process. It backs the quickstart binary
//! and every test in the workspace.
//!
//! # Behaviour
//!
//! - **Lifecycle**: a new ledger reports `CREATING` for the first
//!   [`activation_polls`](MemoryLedgerConfig::activation_polls) describe calls and
//!   `ACTIVE` from then on.
//! - **Transactions**: writes are buffered per transaction and applied under a
//!   single write lock at commit, so a commit is all-or-nothing.
//! - **Optimistic concurrency**: every table a transaction reads or writes is
//!   stamped with the table version it first observed. Commit fails with
//!   [`LedgerError::OccConflict`] if any of those versions moved, or if a table
//!   the transaction creates was created by someone else first.
//! - **Append-only**: documents are never updated or deleted.
//!
//! # Fault injection
//!
//! Tests can force the failure modes the orchestration has to handle:
//!
//! | Method | Effect |
//! |--------|--------|
//! | [`inject_conflicts`](MemoryLedgerService::inject_conflicts) | next N commits fail with `OccConflict` |
//! | [`set_unreachable`](MemoryLedgerService::set_unreachable) | every call fails with `Connection` |
//! | [`set_access_denied`](MemoryLedgerService::set_access_denied) | every call fails with `AccessDenied` |
//! | [`set_ledger_state`](MemoryLedgerService::set_ledger_state) | force a lifecycle state |

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, LedgerResult},
    results::StatementResult,
    service::{LedgerControl, Session, SessionService, Transaction},
    statement::Statement,
    types::{
        CreateLedgerRequest, CreateLedgerResponse, Document, LedgerDescription, LedgerName,
        LedgerState,
    },
};

/// Length of generated ledger, session, transaction and document identifiers.
const ID_LEN: usize = 22;

fn new_id() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(ID_LEN).map(char::from).collect()
}

/// Configuration for [`MemoryLedgerService`].
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryLedgerConfig {
    /// Number of describe calls that report `CREATING` before a new ledger
    /// turns `ACTIVE`.
    #[serde(default = "default_activation_polls")]
    #[builder(default = default_activation_polls())]
    pub activation_polls: u32,
}

fn default_activation_polls() -> u32 {
    2
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        Self { activation_polls: default_activation_polls() }
    }
}

#[derive(Debug, Default)]
struct Faults {
    pending_conflicts: u32,
    unreachable: bool,
    access_denied: bool,
}

#[derive(Debug)]
struct LedgerRecord {
    description: LedgerDescription,
    polls_until_active: u32,
    tables: BTreeMap<String, TableRecord>,
}

#[derive(Debug, Default)]
struct TableRecord {
    documents: Vec<Document>,
    /// Bumped on every committed write to the table.
    version: u64,
}

#[derive(Debug)]
struct Inner {
    config: MemoryLedgerConfig,
    ledgers: RwLock<BTreeMap<String, LedgerRecord>>,
    faults: Mutex<Faults>,
}

/// In-process implementation of the ledger service.
///
/// Cloning is cheap; all clones share the same ledgers.
///
/// # Example
///
/// ```
/// use quickstart_ledger::{
///     CreateLedgerRequest, LedgerControl, LedgerName, LedgerState, MemoryLedgerConfig,
///     MemoryLedgerService,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let service =
///     MemoryLedgerService::with_config(MemoryLedgerConfig::builder().activation_polls(1).build());
/// let name = LedgerName::new("MyLedger").unwrap();
/// service.create_ledger(CreateLedgerRequest::builder().name(name).build()).await.unwrap();
///
/// assert_eq!(service.describe_ledger("MyLedger").await.unwrap().state, LedgerState::Creating);
/// assert_eq!(service.describe_ledger("MyLedger").await.unwrap().state, LedgerState::Active);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerService {
    inner: Arc<Inner>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            config: MemoryLedgerConfig::default(),
            ledgers: RwLock::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
        }
    }
}

impl MemoryLedgerService {
    /// Creates a service with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service with the given configuration.
    #[must_use]
    pub fn with_config(config: MemoryLedgerConfig) -> Self {
        Self { inner: Arc::new(Inner { config, ..Inner::default() }) }
    }

    /// Makes the next `count` commits fail with [`LedgerError::OccConflict`].
    pub fn inject_conflicts(&self, count: u32) {
        let mut faults = self.inner.faults.lock();
        faults.pending_conflicts = faults.pending_conflicts.saturating_add(count);
    }

    /// Returns the number of injected conflicts not yet consumed.
    #[must_use]
    pub fn pending_conflicts(&self) -> u32 {
        self.inner.faults.lock().pending_conflicts
    }

    /// Makes every subsequent call fail with [`LedgerError::Connection`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.faults.lock().unreachable = unreachable;
    }

    /// Makes every subsequent call fail with [`LedgerError::AccessDenied`].
    pub fn set_access_denied(&self, denied: bool) {
        self.inner.faults.lock().access_denied = denied;
    }

    /// Forces a ledger into `state`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LedgerNotFound`] if the ledger does not exist.
    pub fn set_ledger_state(&self, name: &str, state: LedgerState) -> LedgerResult<()> {
        let mut ledgers = self.inner.ledgers.write();
        let record = ledgers.get_mut(name).ok_or_else(|| LedgerError::ledger_not_found(name))?;
        record.description.state = state;
        record.polls_until_active = 0;
        Ok(())
    }

    /// Returns the committed documents of a table, or `None` if the ledger or
    /// table does not exist.
    #[must_use]
    pub fn table_documents(&self, ledger: &str, table: &str) -> Option<Vec<Document>> {
        let ledgers = self.inner.ledgers.read();
        let table = ledgers.get(ledger)?.tables.get(table)?;
        Some(table.documents.clone())
    }

    /// Returns the names of the tables committed in a ledger.
    #[must_use]
    pub fn table_names(&self, ledger: &str) -> Vec<String> {
        let ledgers = self.inner.ledgers.read();
        ledgers
            .get(ledger)
            .map(|record| record.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check_reachable(&self) -> LedgerResult<()> {
        let faults = self.inner.faults.lock();
        if faults.unreachable {
            let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
            return Err(LedgerError::connection_with_source(
                "ledger service endpoint unreachable",
                refused,
            ));
        }
        if faults.access_denied {
            return Err(LedgerError::access_denied("caller is not authorized"));
        }
        Ok(())
    }

    fn require_active(record: &LedgerRecord) -> LedgerResult<()> {
        let state = record.description.state;
        if state.is_active() {
            Ok(())
        } else {
            Err(LedgerError::invalid_ledger_state(record.description.name.as_str(), state))
        }
    }
}

#[async_trait]
impl LedgerControl for MemoryLedgerService {
    #[tracing::instrument(skip(self, request), fields(ledger = %request.name))]
    async fn create_ledger(
        &self,
        request: CreateLedgerRequest,
    ) -> LedgerResult<CreateLedgerResponse> {
        self.check_reachable()?;

        let mut ledgers = self.inner.ledgers.write();
        if let Some(existing) = ledgers.get(request.name.as_str())
            && existing.description.state != LedgerState::Deleted
        {
            return Err(LedgerError::ledger_already_exists(request.name.as_str()));
        }

        let description = LedgerDescription {
            name: request.name.clone(),
            id: new_id(),
            state: LedgerState::Creating,
            permissions_mode: request.permissions_mode,
            deletion_protection: request.deletion_protection,
            creation_time: Utc::now(),
        };
        let response = CreateLedgerResponse {
            name: description.name.clone(),
            id: description.id.clone(),
            state: description.state,
            creation_time: description.creation_time,
        };
        ledgers.insert(
            request.name.as_str().to_owned(),
            LedgerRecord {
                description,
                polls_until_active: self.inner.config.activation_polls,
                tables: BTreeMap::new(),
            },
        );
        tracing::debug!(id = %response.id, "ledger created");
        Ok(response)
    }

    #[tracing::instrument(skip(self))]
    async fn describe_ledger(&self, name: &str) -> LedgerResult<LedgerDescription> {
        self.check_reachable()?;

        let mut ledgers = self.inner.ledgers.write();
        let record = ledgers.get_mut(name).ok_or_else(|| LedgerError::ledger_not_found(name))?;
        if record.description.state == LedgerState::Creating {
            if record.polls_until_active == 0 {
                record.description.state = LedgerState::Active;
            } else {
                record.polls_until_active -= 1;
            }
        }
        Ok(record.description.clone())
    }
}

#[async_trait]
impl SessionService for MemoryLedgerService {
    #[tracing::instrument(skip(self))]
    async fn start_session(&self, ledger: &str) -> LedgerResult<Box<dyn Session>> {
        self.check_reachable()?;

        {
            let ledgers = self.inner.ledgers.read();
            let record =
                ledgers.get(ledger).ok_or_else(|| LedgerError::ledger_not_found(ledger))?;
            Self::require_active(record)?;
        }

        let session = MemorySession {
            id: new_id(),
            ledger: ledger.to_owned(),
            service: self.clone(),
            state: Arc::new(Mutex::new(SessionState::default())),
        };
        tracing::debug!(session = %session.id, "session started");
        Ok(Box::new(session))
    }
}

#[derive(Debug, Default)]
struct SessionState {
    closed: bool,
    open_transaction: Option<String>,
}

/// Session handed out by [`MemoryLedgerService`].
struct MemorySession {
    id: String,
    ledger: String,
    service: MemoryLedgerService,
    state: Arc<Mutex<SessionState>>,
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn ledger(&self) -> &str {
        &self.ledger
    }

    async fn start_transaction(&self) -> LedgerResult<Arc<dyn Transaction>> {
        self.service.check_reachable()?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(LedgerError::invalid_session(format!("session {} is closed", self.id)));
        }
        if let Some(open) = &state.open_transaction {
            return Err(LedgerError::invalid_session(format!(
                "session {} already has open transaction {open}",
                self.id
            )));
        }

        let transaction = MemoryTransaction {
            id: new_id(),
            ledger: self.ledger.clone(),
            service: self.service.clone(),
            session: Arc::clone(&self.state),
            state: Mutex::new(TransactionState::default()),
        };
        state.open_transaction = Some(transaction.id.clone());
        Ok(Arc::new(transaction))
    }

    async fn end(&self) -> LedgerResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.open_transaction = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TransactionState {
    closed: bool,
    /// Table version first observed by this transaction, per table.
    read_versions: HashMap<String, u64>,
    created_tables: Vec<String>,
    pending_inserts: Vec<(String, Document)>,
}

impl TransactionState {
    fn creates(&self, table: &str) -> bool {
        self.created_tables.iter().any(|created| created == table)
    }

    /// Records the table version this transaction depends on, or fails if the
    /// table is neither committed nor created by this transaction.
    fn observe(&mut self, record: &LedgerRecord, table: &str) -> LedgerResult<()> {
        if let Some(committed) = record.tables.get(table) {
            self.read_versions.entry(table.to_owned()).or_insert(committed.version);
            Ok(())
        } else if self.creates(table) {
            Ok(())
        } else {
            Err(LedgerError::execution(format!("table {table} does not exist")))
        }
    }
}

/// Transaction handed out by [`MemorySession`].
struct MemoryTransaction {
    id: String,
    ledger: String,
    service: MemoryLedgerService,
    session: Arc<Mutex<SessionState>>,
    state: Mutex<TransactionState>,
}

impl MemoryTransaction {
    fn release_session(&self) {
        let mut session = self.session.lock();
        if session.open_transaction.as_deref() == Some(self.id.as_str()) {
            session.open_transaction = None;
        }
    }

    fn run(
        &self,
        state: &mut TransactionState,
        statement: Statement,
    ) -> LedgerResult<StatementResult> {
        let ledgers = self.service.inner.ledgers.read();
        let record =
            ledgers.get(&self.ledger).ok_or_else(|| LedgerError::ledger_not_found(&self.ledger))?;
        MemoryLedgerService::require_active(record)?;

        match statement {
            Statement::CreateTable { table } => {
                if record.tables.contains_key(&table) || state.creates(&table) {
                    return Err(LedgerError::execution(format!("table {table} already exists")));
                }
                state.created_tables.push(table);
                Ok(StatementResult::new([Document::with_field("tableId", new_id())]))
            },
            Statement::Insert { table, documents } => {
                state.observe(record, &table)?;
                let ids: Vec<_> = documents
                    .into_iter()
                    .map(|document| {
                        state.pending_inserts.push((table.clone(), document));
                        Document::with_field("documentId", new_id())
                    })
                    .collect();
                Ok(StatementResult::new(ids))
            },
            Statement::SelectAll { table } => {
                state.observe(record, &table)?;
                let committed =
                    record.tables.get(&table).map(|t| t.documents.clone()).unwrap_or_default();
                let pending = state
                    .pending_inserts
                    .iter()
                    .filter(|(target, _)| *target == table)
                    .map(|(_, document)| document.clone());
                Ok(StatementResult::new(committed.into_iter().chain(pending)))
            },
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    #[tracing::instrument(skip(self), fields(transaction = %self.id))]
    async fn execute(&self, statement: &str) -> LedgerResult<StatementResult> {
        self.service.check_reachable()?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(LedgerError::transaction_closed(&self.id));
        }
        let parsed = Statement::parse(statement)?;
        tracing::debug!(table = parsed.table(), write = parsed.is_write(), "statement parsed");
        self.run(&mut state, parsed)
    }

    #[tracing::instrument(skip(self), fields(transaction = %self.id))]
    async fn commit(&self) -> LedgerResult<()> {
        self.service.check_reachable()?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(LedgerError::transaction_closed(&self.id));
        }
        state.closed = true;
        self.release_session();

        {
            let mut faults = self.service.inner.faults.lock();
            if faults.pending_conflicts > 0 {
                faults.pending_conflicts -= 1;
                tracing::debug!("injected OCC conflict");
                return Err(LedgerError::occ_conflict(&self.id));
            }
        }

        let mut ledgers = self.service.inner.ledgers.write();
        let record = ledgers
            .get_mut(&self.ledger)
            .ok_or_else(|| LedgerError::ledger_not_found(&self.ledger))?;
        MemoryLedgerService::require_active(record)?;

        // Validate every dependency before touching anything
        for (table, observed) in &state.read_versions {
            let current = record.tables.get(table).map(|t| t.version);
            if current != Some(*observed) {
                tracing::debug!(table = %table, "table changed since read");
                return Err(LedgerError::occ_conflict(&self.id));
            }
        }
        if state.created_tables.iter().any(|table| record.tables.contains_key(table)) {
            return Err(LedgerError::occ_conflict(&self.id));
        }

        for table in state.created_tables.drain(..) {
            record.tables.insert(table, TableRecord::default());
        }
        let mut written = HashSet::new();
        for (table, document) in state.pending_inserts.drain(..) {
            if let Some(target) = record.tables.get_mut(&table) {
                target.documents.push(document);
                written.insert(table);
            }
        }
        for table in &written {
            if let Some(target) = record.tables.get_mut(table) {
                target.version += 1;
            }
        }

        tracing::debug!(tables_written = written.len(), "transaction committed");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(transaction = %self.id))]
    async fn abort(&self) -> LedgerResult<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.created_tables.clear();
            state.pending_inserts.clear();
            self.release_session();
        }
        Ok(())
    }
}

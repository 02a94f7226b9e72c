//! Shared test utilities for code written against the ledger service seam.
//!
//! Feature-gated behind `testutil`. Enable it in `[dev-dependencies]`:
//!
//! ```toml
//! [dev-dependencies]
//! quickstart-ledger = { path = "../ledger", features = ["testutil"] }
//! ```

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    error::{LedgerError, LedgerResult},
    memory::{MemoryLedgerConfig, MemoryLedgerService},
    service::LedgerControl,
    types::{
        CreateLedgerRequest, CreateLedgerResponse, LedgerDescription, LedgerName, LedgerState,
        PermissionsMode,
    },
};

/// Validates a ledger name, panicking on invalid input.
///
/// # Panics
///
/// Panics if `name` is not a valid ledger name.
#[must_use]
pub fn ledger_name(name: &str) -> LedgerName {
    LedgerName::new(name).expect("test ledger name must be valid")
}

/// Creates a [`MemoryLedgerService`] holding one ledger that is already
/// `ACTIVE`.
///
/// # Panics
///
/// Panics if the ledger cannot be created (should not happen).
pub async fn active_service(ledger: &str) -> MemoryLedgerService {
    let service =
        MemoryLedgerService::with_config(MemoryLedgerConfig::builder().activation_polls(0).build());
    service
        .create_ledger(CreateLedgerRequest::builder().name(ledger_name(ledger)).build())
        .await
        .expect("create ledger failed");
    let description = service.describe_ledger(ledger).await.expect("describe ledger failed");
    assert_eq!(description.state, LedgerState::Active);
    service
}

/// How a [`ScriptedControl`] answers create requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreateBehavior {
    /// Accept the request and report `CREATING`.
    #[default]
    Accept,
    /// Reject the request because the ledger already exists.
    AlreadyExists,
    /// Fail with a connection error.
    Unreachable,
}

/// A [`LedgerControl`] that reports a fixed sequence of states.
///
/// Each describe call pops the next state from the script. Once the script is
/// exhausted the last state repeats forever, so `[Creating]` models a ledger
/// that never activates.
#[derive(Debug, Clone)]
pub struct ScriptedControl {
    inner: Arc<ScriptedInner>,
}

#[derive(Debug)]
struct ScriptedInner {
    states: Mutex<VecDeque<LedgerState>>,
    last: Mutex<LedgerState>,
    create: CreateBehavior,
    creates: AtomicUsize,
    describes: AtomicUsize,
}

impl ScriptedControl {
    /// Creates a control that reports `states` in order.
    #[must_use]
    pub fn new(states: impl IntoIterator<Item = LedgerState>) -> Self {
        Self::with_create(states, CreateBehavior::Accept)
    }

    /// Creates a control with an explicit create behaviour.
    #[must_use]
    pub fn with_create(
        states: impl IntoIterator<Item = LedgerState>,
        create: CreateBehavior,
    ) -> Self {
        let states: VecDeque<_> = states.into_iter().collect();
        let last = states.front().copied().unwrap_or(LedgerState::Creating);
        Self {
            inner: Arc::new(ScriptedInner {
                states: Mutex::new(states),
                last: Mutex::new(last),
                create,
                creates: AtomicUsize::new(0),
                describes: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of create calls received.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.inner.creates.load(Ordering::SeqCst)
    }

    /// Number of describe calls received.
    #[must_use]
    pub fn describe_calls(&self) -> usize {
        self.inner.describes.load(Ordering::SeqCst)
    }

    fn next_state(&self) -> LedgerState {
        let mut last = self.inner.last.lock();
        if let Some(state) = self.inner.states.lock().pop_front() {
            *last = state;
        }
        *last
    }
}

#[async_trait]
impl LedgerControl for ScriptedControl {
    async fn create_ledger(
        &self,
        request: CreateLedgerRequest,
    ) -> LedgerResult<CreateLedgerResponse> {
        self.inner.creates.fetch_add(1, Ordering::SeqCst);
        match self.inner.create {
            CreateBehavior::Accept => Ok(CreateLedgerResponse {
                name: request.name,
                id: "scripted".to_owned(),
                state: LedgerState::Creating,
                creation_time: Utc::now(),
            }),
            CreateBehavior::AlreadyExists => {
                Err(LedgerError::ledger_already_exists(request.name.as_str()))
            },
            CreateBehavior::Unreachable => Err(LedgerError::connection("scripted outage")),
        }
    }

    async fn describe_ledger(&self, name: &str) -> LedgerResult<LedgerDescription> {
        self.inner.describes.fetch_add(1, Ordering::SeqCst);
        Ok(LedgerDescription {
            name: LedgerName::new(name)?,
            id: "scripted".to_owned(),
            state: self.next_state(),
            permissions_mode: PermissionsMode::AllowAll,
            deletion_protection: false,
            creation_time: Utc::now(),
        })
    }
}

/// Assert that a [`LedgerResult`] is a [`LedgerError::OccConflict`].
#[macro_export]
macro_rules! assert_occ_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::LedgerError::OccConflict { .. })),
            "expected LedgerError::OccConflict, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`LedgerResult`] is a [`LedgerError::Execution`].
#[macro_export]
macro_rules! assert_execution_error {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::LedgerError::Execution { .. })),
            "expected LedgerError::Execution, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`LedgerResult`] is `Ok`, returning the inner value.
#[macro_export]
macro_rules! assert_ledger_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got LedgerError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got LedgerError: {e:?}", $msg),
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SessionService;

    #[tokio::test]
    async fn test_scripted_states_repeat_last() {
        let control = ScriptedControl::new([LedgerState::Creating, LedgerState::Active]);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(control.describe_ledger("MyLedger").await.unwrap().state);
        }

        assert_eq!(seen, [LedgerState::Creating, LedgerState::Active, LedgerState::Active]);
        assert_eq!(control.describe_calls(), 3);
        assert_eq!(control.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_scripted_create_behaviors() {
        let exists =
            ScriptedControl::with_create([LedgerState::Creating], CreateBehavior::AlreadyExists);
        let request = CreateLedgerRequest::builder().name(ledger_name("L")).build();
        let result = exists.create_ledger(request).await;
        assert!(matches!(result, Err(LedgerError::LedgerAlreadyExists { .. })));
        assert_eq!(exists.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_active_service_accepts_sessions() {
        let service = active_service("MyLedger").await;
        let session = assert_ledger_ok!(service.start_session("MyLedger").await);
        let txn = assert_ledger_ok!(session.start_transaction().await);
        assert_execution_error!(txn.execute("SELECT * FROM Missing").await);

        service.inject_conflicts(1);
        assert_occ_conflict!(txn.commit().await);
    }
}

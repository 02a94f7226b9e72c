//! Ledger provisioning: create, then poll until `ACTIVE`.
//!
//! The wait is bounded by [`ProvisioningConfig::timeout`] and stops early when
//! the [`CancellationToken`] fires or the ledger reaches a state it can never
//! leave (`DELETING`, `DELETED`). A ledger that already exists counts as
//! created.

use std::sync::Arc;

use parking_lot::Mutex;
use quickstart_ledger::{
    CreateLedgerRequest, LedgerControl, LedgerDescription, LedgerError, LedgerName, LedgerState,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ProvisioningConfig,
    error::{DriverError, DriverResult},
};

/// Outcome of [`ProvisioningWaiter::ensure_ledger_active`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedLedger {
    /// Description returned by the poll that observed `ACTIVE`.
    pub description: LedgerDescription,
    /// Number of describe calls made.
    pub polls: u32,
    /// `false` if the ledger already existed.
    pub created: bool,
}

/// Progress of a wait, readable after the wait was cut short.
#[derive(Debug, Default)]
struct PollProgress {
    polls: u32,
    last_state: Option<LedgerState>,
}

/// Creates ledgers and waits for them to become active.
pub struct ProvisioningWaiter {
    control: Arc<dyn LedgerControl>,
    config: ProvisioningConfig,
}

impl std::fmt::Debug for ProvisioningWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningWaiter").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ProvisioningWaiter {
    /// Creates a waiter using `control` for create and describe calls.
    #[must_use]
    pub fn new(control: Arc<dyn LedgerControl>, config: ProvisioningConfig) -> Self {
        Self { control, config }
    }

    /// Requests creation of `name` and waits until it is `ACTIVE`.
    ///
    /// # Errors
    ///
    /// - any create error other than [`LedgerError::LedgerAlreadyExists`]
    /// - every error of [`wait_until_active`](Self::wait_until_active)
    #[tracing::instrument(skip(self, cancel), fields(ledger = %name))]
    pub async fn ensure_ledger_active(
        &self,
        name: &LedgerName,
        cancel: &CancellationToken,
    ) -> DriverResult<ProvisionedLedger> {
        let created = self.create(name, cancel).await?;
        let (description, polls) = self.wait(name, cancel).await?;
        tracing::info!(polls, created, "ledger is active");
        Ok(ProvisionedLedger { description, polls, created })
    }

    /// Polls `name` until it reports `ACTIVE`.
    ///
    /// Returns after a single describe call if the ledger is already active.
    ///
    /// # Errors
    ///
    /// - [`DriverError::LedgerUnavailable`] if the ledger is `DELETING` or `DELETED`
    /// - [`DriverError::ProvisioningTimeout`] when the configured timeout elapses
    /// - [`DriverError::Cancelled`] when `cancel` fires
    /// - describe errors, unchanged
    #[tracing::instrument(skip(self, cancel), fields(ledger = %name))]
    pub async fn wait_until_active(
        &self,
        name: &LedgerName,
        cancel: &CancellationToken,
    ) -> DriverResult<LedgerDescription> {
        self.wait(name, cancel).await.map(|(description, _)| description)
    }

    async fn create(&self, name: &LedgerName, cancel: &CancellationToken) -> DriverResult<bool> {
        let request = CreateLedgerRequest::builder()
            .name(name.clone())
            .permissions_mode(self.config.permissions_mode())
            .deletion_protection(self.config.deletion_protection())
            .build();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(DriverError::Cancelled { ledger: name.to_string() });
            },
            response = self.control.create_ledger(request) => response,
        };

        match response {
            Ok(response) => {
                tracing::info!(
                    id = %response.id,
                    state = %response.state,
                    "ledger creation requested"
                );
                Ok(true)
            },
            Err(LedgerError::LedgerAlreadyExists { .. }) => {
                tracing::info!("ledger already exists");
                Ok(false)
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn wait(
        &self,
        name: &LedgerName,
        cancel: &CancellationToken,
    ) -> DriverResult<(LedgerDescription, u32)> {
        let progress = Mutex::new(PollProgress::default());
        let timeout = self.config.timeout();
        let bounded = tokio::time::timeout(timeout, self.poll_until_active(name, &progress));

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!(polls = progress.lock().polls, "provisioning cancelled");
                Err(DriverError::Cancelled { ledger: name.to_string() })
            },
            result = bounded => match result {
                Ok(result) => result.map(|description| (description, progress.lock().polls)),
                Err(_elapsed) => {
                    let progress = progress.lock();
                    tracing::warn!(polls = progress.polls, "provisioning timed out");
                    Err(DriverError::ProvisioningTimeout {
                        ledger: name.to_string(),
                        waited: timeout,
                        polls: progress.polls,
                        last_state: progress.last_state,
                    })
                },
            },
        }
    }

    async fn poll_until_active(
        &self,
        name: &LedgerName,
        progress: &Mutex<PollProgress>,
    ) -> DriverResult<LedgerDescription> {
        loop {
            let description = self.control.describe_ledger(name.as_str()).await?;
            let polls = {
                let mut progress = progress.lock();
                progress.polls += 1;
                progress.last_state = Some(description.state);
                progress.polls
            };
            tracing::info!(polls, state = %description.state, "{description}");

            let state = description.state;
            if state.is_active() {
                return Ok(description);
            }
            if state.is_terminal() {
                return Err(DriverError::LedgerUnavailable { ledger: name.to_string(), state });
            }

            tracing::info!(
                poll_interval_ms = self.config.poll_interval().as_millis() as u64,
                "ledger is still creating, waiting"
            );
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use quickstart_ledger::{
        MemoryLedgerConfig, MemoryLedgerService,
        testutil::{CreateBehavior, ScriptedControl, ledger_name},
    };

    use super::*;

    fn config(poll_secs: u64, timeout_secs: u64) -> ProvisioningConfig {
        ProvisioningConfig::builder()
            .poll_interval(Duration::from_secs(poll_secs))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_creating_creating_active_polls_three_times() {
        let control = ScriptedControl::new([
            LedgerState::Creating,
            LedgerState::Creating,
            LedgerState::Active,
        ]);
        let waiter = ProvisioningWaiter::new(Arc::new(control.clone()), config(15, 600));

        let start = tokio::time::Instant::now();
        let provisioned = waiter
            .ensure_ledger_active(&ledger_name("MyLedger"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provisioned.polls, 3);
        assert!(provisioned.created);
        assert_eq!(provisioned.description.state, LedgerState::Active);
        assert_eq!(control.describe_calls(), 3);
        assert_eq!(control.create_calls(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_active_polls_once_without_sleeping() {
        let control = ScriptedControl::new([LedgerState::Active]);
        let waiter = ProvisioningWaiter::new(Arc::new(control.clone()), config(15, 600));

        let start = tokio::time::Instant::now();
        waiter
            .wait_until_active(&ledger_name("MyLedger"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(control.describe_calls(), 1);
        assert_eq!(control.create_calls(), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_exists_is_success() {
        let control =
            ScriptedControl::with_create([LedgerState::Active], CreateBehavior::AlreadyExists);
        let waiter = ProvisioningWaiter::new(Arc::new(control), config(15, 600));

        let provisioned = waiter
            .ensure_ledger_active(&ledger_name("MyLedger"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!provisioned.created);
        assert_eq!(provisioned.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_create_errors_are_returned() {
        let control =
            ScriptedControl::with_create([LedgerState::Active], CreateBehavior::Unreachable);
        let waiter = ProvisioningWaiter::new(Arc::new(control.clone()), config(15, 600));

        let result =
            waiter.ensure_ledger_active(&ledger_name("MyLedger"), &CancellationToken::new()).await;

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, DriverError::Ledger(LedgerError::Connection { .. })));
        assert_eq!(control.describe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_active_times_out_with_context() {
        let control = ScriptedControl::new([LedgerState::Creating]);
        let waiter = ProvisioningWaiter::new(Arc::new(control), config(15, 50));

        let result =
            waiter.wait_until_active(&ledger_name("MyLedger"), &CancellationToken::new()).await;

        match result {
            Err(DriverError::ProvisioningTimeout { polls, last_state, waited, .. }) => {
                assert_eq!(polls, 4);
                assert_eq!(last_state, Some(LedgerState::Creating));
                assert_eq!(waited, Duration::from_secs(50));
            },
            other => unreachable!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let control = ScriptedControl::new([LedgerState::Creating]);
        let waiter = ProvisioningWaiter::new(Arc::new(control.clone()), config(15, 600));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let result = waiter.wait_until_active(&ledger_name("MyLedger"), &cancel).await;

        assert!(matches!(result, Err(DriverError::Cancelled { .. })));
        assert_eq!(control.describe_calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleting_ledger_is_unavailable() {
        for state in [LedgerState::Deleting, LedgerState::Deleted] {
            let control = ScriptedControl::new([LedgerState::Creating, state]);
            let waiter = ProvisioningWaiter::new(Arc::new(control.clone()), config(15, 600));

            let result =
                waiter.wait_until_active(&ledger_name("MyLedger"), &CancellationToken::new()).await;

            assert!(
                matches!(result, Err(DriverError::LedgerUnavailable { state: s, .. }) if s == state)
            );
            assert_eq!(control.describe_calls(), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_service_activates_after_configured_polls() {
        let service = MemoryLedgerService::with_config(
            MemoryLedgerConfig::builder().activation_polls(2).build(),
        );
        let waiter = ProvisioningWaiter::new(Arc::new(service.clone()), config(15, 600));

        let provisioned = waiter
            .ensure_ledger_active(&ledger_name("MyLedger"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provisioned.polls, 3);

        // Second run finds the ledger already there and active
        let again = waiter
            .ensure_ledger_active(&ledger_name("MyLedger"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.polls, 1);
    }
}

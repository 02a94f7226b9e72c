//! Configuration for the driver, the session pool and the provisioning waiter.
//!
//! Every section deserializes with defaults for omitted fields, so an empty
//! TOML table is a valid configuration. Builders validate on `build()`;
//! deserialized values are checked with `validate()`.

use std::time::Duration;

use quickstart_ledger::{LedgerName, PermissionsMode};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{DriverError, DriverResult};

/// Default number of retries after an OCC conflict.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default backoff before the first retry (10 milliseconds).
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);

/// Default backoff cap (5 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Default maximum number of sessions checked out at once.
const DEFAULT_MAX_SESSIONS: usize = 10;

/// Default wait for a free session (30 seconds).
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between provisioning polls (15 seconds).
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default bound on the whole provisioning wait (10 minutes).
const DEFAULT_PROVISIONING_TIMEOUT: Duration = Duration::from_secs(600);

/// Retry policy for units of work that hit OCC conflicts.
///
/// A unit of work runs at most `retry_limit + 1` times. Before retry `n`
/// (0-based) the driver sleeps `min(base_delay * 2^n, max_delay)` plus up to
/// 50% jitter.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use quickstart_driver::RetryConfig;
///
/// let config = RetryConfig::builder()
///     .retry_limit(5)
///     .base_delay(Duration::from_millis(50))
///     .build()?;
/// assert_eq!(config.retry_limit(), 5);
/// # Ok::<(), quickstart_driver::DriverError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_retry_limit")]
    pub(crate) retry_limit: u32,

    /// Backoff before the first retry.
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub(crate) base_delay: Duration,

    /// Upper bound on a single backoff (before jitter).
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub(crate) max_delay: Duration,
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

fn default_base_delay() -> Duration {
    DEFAULT_BASE_DELAY
}

fn default_max_delay() -> Duration {
    DEFAULT_MAX_DELAY
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

#[bon::bon]
impl RetryConfig {
    /// Creates a retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if `max_delay` is shorter than `base_delay`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_RETRY_LIMIT)] retry_limit: u32,
        #[builder(default = DEFAULT_BASE_DELAY)] base_delay: Duration,
        #[builder(default = DEFAULT_MAX_DELAY)] max_delay: Duration,
    ) -> DriverResult<Self> {
        let config = Self { retry_limit, base_delay, max_delay };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants of a deserialized policy.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if `max_delay` is shorter than `base_delay`.
    pub fn validate(&self) -> DriverResult<()> {
        if self.max_delay < self.base_delay {
            return Err(DriverError::config(format!(
                "retry max_delay ({:?}) must not be shorter than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }

    /// Returns the maximum number of retries.
    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Returns the backoff before the first retry.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the backoff cap.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

/// Session pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum sessions checked out at once.
    #[serde(default = "default_max_sessions")]
    pub(crate) max_sessions: usize,

    /// How long `acquire` waits for a free session.
    #[serde(with = "humantime_serde", default = "default_acquire_timeout")]
    pub(crate) acquire_timeout: Duration,
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

fn default_acquire_timeout() -> Duration {
    DEFAULT_ACQUIRE_TIMEOUT
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_sessions: DEFAULT_MAX_SESSIONS, acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT }
    }
}

#[bon::bon]
impl PoolConfig {
    /// Creates pool limits.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if either limit is zero or
    /// `max_sessions` exceeds [`Semaphore::MAX_PERMITS`].
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_SESSIONS)] max_sessions: usize,
        #[builder(default = DEFAULT_ACQUIRE_TIMEOUT)] acquire_timeout: Duration,
    ) -> DriverResult<Self> {
        let config = Self { max_sessions, acquire_timeout };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants of deserialized limits.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if either limit is zero or
    /// `max_sessions` exceeds [`Semaphore::MAX_PERMITS`].
    pub fn validate(&self) -> DriverResult<()> {
        if self.max_sessions == 0 {
            return Err(DriverError::config("pool max_sessions must be at least 1"));
        }
        if self.max_sessions > Semaphore::MAX_PERMITS {
            return Err(DriverError::config(format!(
                "pool max_sessions must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(DriverError::config("pool acquire_timeout must be non-zero"));
        }
        Ok(())
    }

    /// Returns the maximum number of sessions checked out at once.
    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Returns how long `acquire` waits for a free session.
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }
}

/// Configuration for [`LedgerDriver`](crate::LedgerDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Ledger every session is bound to.
    pub(crate) ledger_name: LedgerName,

    /// Session pool limits.
    #[serde(default)]
    pub(crate) pool: PoolConfig,

    /// OCC retry policy.
    #[serde(default)]
    pub(crate) retry: RetryConfig,
}

#[bon::bon]
impl DriverConfig {
    /// Creates a driver configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if the ledger name is invalid or a
    /// section fails validation.
    #[builder]
    pub fn new(
        #[builder(into)] ledger_name: String,
        #[builder(default)] pool: PoolConfig,
        #[builder(default)] retry: RetryConfig,
    ) -> DriverResult<Self> {
        let ledger_name =
            LedgerName::new(ledger_name).map_err(|e| DriverError::config(e.to_string()))?;
        let config = Self { ledger_name, pool, retry };
        config.validate()?;
        Ok(config)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first section's validation error.
    pub fn validate(&self) -> DriverResult<()> {
        self.pool.validate()?;
        self.retry.validate()
    }

    /// Returns the ledger name.
    #[must_use]
    pub fn ledger_name(&self) -> &LedgerName {
        &self.ledger_name
    }

    /// Returns the pool limits.
    #[must_use]
    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Configuration for [`ProvisioningWaiter`](crate::ProvisioningWaiter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisioningConfig {
    /// Sleep between describe calls while the ledger is `CREATING`.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub(crate) poll_interval: Duration,

    /// Bound on the whole wait.
    #[serde(with = "humantime_serde", default = "default_provisioning_timeout")]
    pub(crate) timeout: Duration,

    /// Permissions mode requested at creation.
    #[serde(default)]
    pub(crate) permissions_mode: PermissionsMode,

    /// Deletion protection requested at creation.
    #[serde(default)]
    pub(crate) deletion_protection: bool,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_provisioning_timeout() -> Duration {
    DEFAULT_PROVISIONING_TIMEOUT
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_PROVISIONING_TIMEOUT,
            permissions_mode: PermissionsMode::AllowAll,
            deletion_protection: false,
        }
    }
}

#[bon::bon]
impl ProvisioningConfig {
    /// Creates a provisioning configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if `poll_interval` or `timeout` is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_POLL_INTERVAL)] poll_interval: Duration,
        #[builder(default = DEFAULT_PROVISIONING_TIMEOUT)] timeout: Duration,
        #[builder(default)] permissions_mode: PermissionsMode,
        #[builder(default)] deletion_protection: bool,
    ) -> DriverResult<Self> {
        let config = Self { poll_interval, timeout, permissions_mode, deletion_protection };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants of a deserialized configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if `poll_interval` or `timeout` is zero.
    pub fn validate(&self) -> DriverResult<()> {
        if self.poll_interval.is_zero() {
            return Err(DriverError::config("provisioning poll_interval must be non-zero"));
        }
        if self.timeout.is_zero() {
            return Err(DriverError::config("provisioning timeout must be non-zero"));
        }
        Ok(())
    }

    /// Returns the poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the bound on the whole wait.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the permissions mode requested at creation.
    #[must_use]
    pub fn permissions_mode(&self) -> PermissionsMode {
        self.permissions_mode
    }

    /// Returns whether deletion protection is requested.
    #[must_use]
    pub fn deletion_protection(&self) -> bool {
        self.deletion_protection
    }

    /// Returns a copy with a different poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] if `poll_interval` is zero.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> DriverResult<Self> {
        self.poll_interval = poll_interval;
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_builder_defaults_match_default_impl() {
        let built = RetryConfig::builder().build().unwrap();
        assert_eq!(built, RetryConfig::default());
        assert_eq!(built.retry_limit(), 3);
    }

    #[test]
    fn test_retry_rejects_inverted_delays() {
        let result = RetryConfig::builder()
            .base_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(1))
            .build();
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_retry_limit_zero_is_allowed() {
        let config = RetryConfig::builder().retry_limit(0).build().unwrap();
        assert_eq!(config.retry_limit(), 0);
    }

    #[test]
    fn test_pool_rejects_zero_limits() {
        assert!(PoolConfig::builder().max_sessions(0).build().is_err());
        assert!(PoolConfig::builder().acquire_timeout(Duration::ZERO).build().is_err());
        assert_eq!(PoolConfig::builder().build().unwrap(), PoolConfig::default());
    }

    #[test]
    fn test_pool_rejects_more_sessions_than_semaphore_permits() {
        let json = format!(r#"{{"max_sessions": {}}}"#, usize::MAX);
        let config: PoolConfig = serde_json::from_str(&json).unwrap();
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));

        let over = PoolConfig::builder().max_sessions(Semaphore::MAX_PERMITS + 1).build();
        assert!(matches!(over, Err(DriverError::Config(_))));
        assert!(PoolConfig::builder().max_sessions(Semaphore::MAX_PERMITS).build().is_ok());
    }

    #[test]
    fn test_driver_config_validates_ledger_name() {
        let config = DriverConfig::builder().ledger_name("MyLedger").build().unwrap();
        assert_eq!(config.ledger_name().as_str(), "MyLedger");
        assert_eq!(config.retry(), &RetryConfig::default());

        let result = DriverConfig::builder().ledger_name("bad--name").build();
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_provisioning_defaults() {
        let config = ProvisioningConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.timeout(), Duration::from_secs(600));
        assert_eq!(config.permissions_mode(), PermissionsMode::AllowAll);
        assert!(!config.deletion_protection());
    }

    #[test]
    fn test_provisioning_rejects_zero_interval() {
        assert!(ProvisioningConfig::builder().poll_interval(Duration::ZERO).build().is_err());
        assert!(ProvisioningConfig::default().with_poll_interval(Duration::ZERO).is_err());
    }

    #[test]
    fn test_deserialization_with_defaults() {
        let config: DriverConfig = serde_json::from_str(r#"{"ledger_name": "MyLedger"}"#).unwrap();
        assert_eq!(config.pool(), &PoolConfig::default());
        assert_eq!(config.retry(), &RetryConfig::default());
    }

    #[test]
    fn test_deserialization_humantime_durations() {
        let json = r#"{"poll_interval": "2s", "timeout": "1m", "permissions_mode": "STANDARD"}"#;
        let config: ProvisioningConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.permissions_mode(), PermissionsMode::Standard);
    }

    #[test]
    fn test_deserialization_rejects_unknown_fields() {
        let result = serde_json::from_str::<RetryConfig>(r#"{"retries": 3}"#);
        assert!(result.is_err());

        let result = serde_json::from_str::<DriverConfig>(r#"{"ledger_name": "9bad"}"#);
        assert!(result.is_err());
    }
}

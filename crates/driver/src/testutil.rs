//! Shared test utilities for driver and provisioning tests.
//!
//! Feature-gated behind `testutil`. The configurations here keep the default
//! retry limit but shrink every delay so tests run fast without paused time.

use std::time::Duration;

use crate::config::{DriverConfig, PoolConfig, ProvisioningConfig, RetryConfig};

/// Driver configuration with millisecond backoff and the default retry limit.
///
/// # Panics
///
/// Panics if `ledger` is not a valid ledger name.
#[must_use]
pub fn fast_driver_config(ledger: &str) -> DriverConfig {
    let retry = RetryConfig::builder()
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(10))
        .build()
        .expect("valid retry config");
    let pool =
        PoolConfig::builder().acquire_timeout(Duration::from_secs(1)).build().expect("valid pool");
    DriverConfig::builder()
        .ledger_name(ledger)
        .retry(retry)
        .pool(pool)
        .build()
        .expect("valid driver config")
}

/// Provisioning configuration polling every 10 milliseconds for at most 5 seconds.
#[must_use]
pub fn fast_provisioning_config() -> ProvisioningConfig {
    ProvisioningConfig::builder()
        .poll_interval(Duration::from_millis(10))
        .timeout(Duration::from_secs(5))
        .build()
        .expect("valid provisioning config")
}

/// Assert that a [`DriverResult`](crate::DriverResult) is a
/// [`DriverError::RetriesExhausted`](crate::DriverError::RetriesExhausted)
/// with the given number of attempts.
#[macro_export]
macro_rules! assert_retries_exhausted {
    ($result:expr, $attempts:expr) => {
        match $result {
            Err($crate::DriverError::RetriesExhausted { attempts, .. }) => {
                assert_eq!(attempts, $attempts, "unexpected attempt count");
            },
            other => panic!("expected DriverError::RetriesExhausted, got: {other:?}"),
        }
    };
}

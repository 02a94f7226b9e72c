//! Session pool, OCC retry driver and provisioning waiter for the ledger
//! quickstart.
//!
//! Everything here is written against the service traits of
//! [`quickstart_ledger`], so it runs unchanged against any implementation of
//! them.
//!
//! - [`ProvisioningWaiter`] creates a ledger and polls until it is `ACTIVE`,
//!   bounded by a timeout and cancellable.
//! - [`LedgerDriver`] runs units of work in transactions on pooled sessions
//!   and reruns them on OCC conflicts.
//! - [`statements`] and [`results`] format statements and render results.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with fast configurations and assertion macros.

#![deny(unsafe_code)]

pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod pool;
pub mod provisioning;
pub mod results;
mod retry;
pub mod statements;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;

pub use config::{DEFAULT_RETRY_LIMIT, DriverConfig, PoolConfig, ProvisioningConfig, RetryConfig};
pub use driver::LedgerDriver;
pub use error::{DriverError, DriverResult};
pub use executor::TransactionExecutor;
pub use pool::{PooledSession, SessionPool};
pub use provisioning::{ProvisionedLedger, ProvisioningWaiter};
pub use results::{print_documents, render_documents};

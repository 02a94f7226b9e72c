//! Ledger service seam for the ledger quickstart.
//!
//! This crate defines the traits a ledger service implementation provides,
//! the value types exchanged with it, and an in-memory implementation used by
//! the quickstart binary and by every test in the workspace.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 quickstart-cli (binary)                     │
//! │        provision → create table → insert → query            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 quickstart-driver                           │
//! │   ProvisioningWaiter │ SessionPool │ LedgerDriver (retry)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 quickstart-ledger                           │
//! │   LedgerControl │ SessionService → Session → Transaction    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 MemoryLedgerService                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use quickstart_ledger::{
//!     CreateLedgerRequest, LedgerControl, LedgerName, MemoryLedgerConfig, MemoryLedgerService,
//!     SessionService,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MemoryLedgerConfig::builder().activation_polls(0).build();
//!     let service = MemoryLedgerService::with_config(config);
//!
//!     let name = LedgerName::new("MyLedger")?;
//!     service.create_ledger(CreateLedgerRequest::builder().name(name).build()).await?;
//!     assert!(service.describe_ledger("MyLedger").await?.state.is_active());
//!
//!     let session = service.start_session("MyLedger").await?;
//!     let txn = session.start_transaction().await?;
//!     txn.execute("CREATE TABLE MyTable").await?;
//!     txn.execute("INSERT INTO MyTable VALUE { 'mytabledate': 1700000000000 }").await?;
//!     txn.commit().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with a scripted control plane, service
//!   factories and assertion macros. Enable this in `[dev-dependencies]`.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod results;
pub mod service;
pub mod statement;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use error::{BoxError, LedgerError, LedgerResult};
pub use memory::{MemoryLedgerConfig, MemoryLedgerService};
pub use results::StatementResult;
pub use service::{LedgerControl, Session, SessionService, Transaction};
pub use statement::{MAX_TABLE_NAME_LEN, Statement, is_valid_table_name};
pub use types::{
    CreateLedgerRequest, CreateLedgerResponse, Document, LedgerDescription, LedgerName,
    LedgerState, MAX_LEDGER_NAME_LEN, PermissionsMode,
};

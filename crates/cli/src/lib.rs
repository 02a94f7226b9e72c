//! Ledger quickstart.
//!
//! Provisions a ledger, waits until it is active, creates a table, inserts a
//! timestamp document and prints every document in the table. Each step is a
//! [`workflow::Stage`]; the run returns a [`workflow::RunReport`] instead of
//! stopping at the first error.

#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod workflow;

pub use config::{Overrides, QuickstartConfig};
pub use workflow::{Quickstart, RunReport, Stage, StageOutcome, StageStatus};

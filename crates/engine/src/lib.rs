//! Store engine for TicToc
//!
//! This crate ties the layers together:
//! - TransactionalStore: the public transaction API over a storage engine
//! - TransactionCoordinator: lifecycle metrics around the commit protocol
//! - StoreConfig / StoreBuilder: `tictoc.toml` and fluent configuration
//! - RetryConfig: closure transactions retried on conflict

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod database;

pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use database::{RetryConfig, StoreBuilder, StoreConfig, TransactionalStore, CONFIG_FILE_NAME};

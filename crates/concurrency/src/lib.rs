//! Concurrency layer for TicToc
//!
//! This crate implements TicToc optimistic concurrency control with:
//! - Transaction: read/write set tracking, read-your-own-writes
//! - LockTable: per-key try-lock used only during commit
//! - Validation: data-driven commit timestamps, read-set validation
//! - TransactionManager: commit orchestration, write phase, abort

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock_table;
pub mod manager;
pub mod rw_set;
pub mod transaction;
pub mod validation;

pub use lock_table::{LockOutcome, LockTable};
pub use manager::{CommitOutcome, TransactionManager, DEFAULT_LOCK_BACKOFF};
pub use rw_set::{ReadEntry, ReadSet, WriteEntry, WriteSet};
pub use transaction::{AbortReason, Transaction, TransactionStatus};
pub use validation::{fetch_timestamps, ConflictType, ValidationResult};

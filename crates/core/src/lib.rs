//! Core types and traits for TicToc
//!
//! This crate defines the foundational types used throughout the system:
//! - Key / TxnId: keys and transaction identifiers
//! - TimestampSet: per-record `(wts, rts)` pair
//! - Tuple: the header-prefixed record layout written to storage
//! - Message / WriteOp: buffered local writes
//! - IsolationLevel: per-store / per-transaction commit policy
//! - Error: error type hierarchy
//! - Traits: Storage and MergeOperator seams

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod isolation;
pub mod message;
pub mod timestamp;
pub mod traits;
pub mod tuple;
pub mod types;

pub use error::{Error, Result};
pub use isolation::IsolationLevel;
pub use message::{Message, WriteOp};
pub use timestamp::{Timestamp, TimestampSet, TIMESTAMP_SET_SIZE, TIMESTAMP_SIZE};
pub use traits::{MergeOperator, Storage};
pub use tuple::{Tuple, TUPLE_HEADER_SIZE};
pub use types::{Key, TxnId};

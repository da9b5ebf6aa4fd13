//! Storage layer for TicToc
//!
//! This crate implements the reference point-operation engine with:
//! - MemoryStore: DashMap + FxHash sharded key/value map
//! - Merge operators: replace, append, counter
//! - TupleMerge: header-aware merge installed under the transaction layer
//!
//! The transaction layer only depends on the `Storage` trait; any engine
//! configured with a `TupleMerge` can replace `MemoryStore`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod sharded;

pub use merge::{merge_operator_by_name, AppendMerge, CounterMerge, ReplaceMerge, TupleMerge};
pub use sharded::MemoryStore;

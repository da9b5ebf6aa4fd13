//! TicToc DB - serializable multi-key transactions over a point-operation
//! key/value engine
//!
//! Transactions read without locks, buffer their writes, and validate at
//! commit using per-record `(wts, rts)` timestamps (TicToc optimistic
//! concurrency control).
//!
//! # Quick Start
//!
//! ```ignore
//! use tictoc_db::{CommitOutcome, StoreConfig, TransactionalStore};
//!
//! let store = TransactionalStore::open(StoreConfig::default())?;
//!
//! let mut txn = store.begin();
//! store.insert(&mut txn, "user:123", b"Alice")?;
//! assert_eq!(store.lookup(&mut txn, "user:123")?, Some(b"Alice".to_vec()));
//!
//! match store.commit(&mut txn)? {
//!     CommitOutcome::Committed { commit_ts } => println!("committed at {}", commit_ts),
//!     CommitOutcome::Aborted(reason) => println!("aborted: {}", reason),
//! }
//! ```
//!
//! # Architecture
//!
//! - `tictoc-core`: keys, timestamps, tuple layout, errors, storage traits
//! - `tictoc-storage`: in-memory engine and merge operators
//! - `tictoc-concurrency`: lock table, transactions, validation, commit
//! - `tictoc-engine`: the store facade, configuration and metrics

pub use tictoc_concurrency::{
    AbortReason, CommitOutcome, ConflictType, LockOutcome, LockTable, Transaction,
    TransactionManager, TransactionStatus,
};
pub use tictoc_core::{
    Error, IsolationLevel, Key, Message, MergeOperator, Result, Storage, Timestamp, TimestampSet,
    Tuple, TxnId, WriteOp,
};
pub use tictoc_engine::{
    RetryConfig, StoreBuilder, StoreConfig, TransactionCoordinator, TransactionMetrics,
    TransactionalStore,
};
pub use tictoc_storage::{AppendMerge, CounterMerge, MemoryStore, ReplaceMerge, TupleMerge};

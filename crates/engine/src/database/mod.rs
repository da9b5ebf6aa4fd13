//! Transactional store facade
//!
//! [`TransactionalStore`] ties a storage engine, its application merge
//! operator and a [`TransactionCoordinator`] together and exposes the
//! transaction API:
//!
//! ```text
//! let store = TransactionalStore::open(StoreConfig::default())?;
//! let mut txn = store.begin();
//! store.insert(&mut txn, "a", b"1")?;
//! let v = store.lookup(&mut txn, "a")?;   // Some(b"1"), read-your-own-writes
//! store.commit(&mut txn)?;                // CommitOutcome::Committed { commit_ts: 1 }
//! ```
//!
//! The storage engine must be configured with a
//! [`TupleMerge`](tictoc_storage::TupleMerge) wrapping the same application
//! merge operator the store is given, so that transactional updates and
//! read-timestamp refreshes merge correctly.

mod builder;
mod config;
mod transactions;

pub use builder::StoreBuilder;
pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use transactions::RetryConfig;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use tictoc_concurrency::{fetch_timestamps, CommitOutcome, Transaction};
use tictoc_core::{
    Error, IsolationLevel, Key, MergeOperator, Message, Result, Storage, TimestampSet, Tuple,
};
use tictoc_storage::{MemoryStore, TupleMerge};
use tracing::{debug, info};

use crate::coordinator::{TransactionCoordinator, TransactionMetrics};

/// ACID multi-key transactions over a single-key storage engine
pub struct TransactionalStore<S: Storage = MemoryStore> {
    storage: Arc<S>,
    merge: Arc<dyn MergeOperator>,
    coordinator: TransactionCoordinator,
    /// Default isolation for `begin`, as `IsolationLevel::as_u8`
    isolation: AtomicU8,
    retry: RetryConfig,
}

impl TransactionalStore<MemoryStore> {
    /// Open an in-memory store
    ///
    /// # Errors
    /// `Error::InvalidConfig` if the isolation level or merge operator in
    /// `config` is unknown.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let merge = config.merge_operator()?;
        let storage = Arc::new(MemoryStore::new(Arc::new(TupleMerge::new(Arc::clone(
            &merge,
        )))));
        Self::with_storage(storage, merge, &config)
    }

    /// Builder for fluent configuration
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }
}

impl<S: Storage> TransactionalStore<S> {
    /// Layer transactions over an existing storage engine
    ///
    /// `storage` must merge updates with a `TupleMerge` wrapping `merge`.
    /// `config.merge` is ignored in favor of `merge`.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if the isolation level in `config` is unknown.
    pub fn with_storage(
        storage: Arc<S>,
        merge: Arc<dyn MergeOperator>,
        config: &StoreConfig,
    ) -> Result<Self> {
        let isolation = config.isolation_level()?;
        info!(
            target: "tictoc::db",
            %isolation,
            merge = merge.name(),
            lock_backoff_ns = config.lock_backoff_ns,
            "Transactional store opened"
        );
        Ok(TransactionalStore {
            storage,
            merge,
            coordinator: TransactionCoordinator::new(config.lock_backoff()),
            isolation: AtomicU8::new(isolation.as_u8()),
            retry: config.retry.clone(),
        })
    }

    /// Underlying storage engine
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Application merge operator
    pub fn merge_operator(&self) -> &Arc<dyn MergeOperator> {
        &self.merge
    }

    /// Transaction coordinator
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Retry policy used by [`TransactionalStore::transaction`]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    // ========================================================================
    // Isolation
    // ========================================================================

    /// Default isolation level for new transactions
    pub fn isolation_level(&self) -> IsolationLevel {
        // Only valid discriminants are ever stored
        IsolationLevel::try_from(self.isolation.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Change the default isolation level
    ///
    /// Transactions already begun keep the level they started with.
    pub fn set_isolation_level(&self, level: IsolationLevel) {
        self.isolation.store(level.as_u8(), Ordering::Release);
        debug!(target: "tictoc::db", isolation = %level, "Isolation level changed");
    }

    // ========================================================================
    // Transaction lifecycle
    // ========================================================================

    /// Begin a transaction at the store's isolation level
    pub fn begin(&self) -> Transaction {
        self.coordinator.start_transaction(self.isolation_level())
    }

    /// Begin a transaction at `level`, overriding the store default
    pub fn begin_with_isolation(&self, level: IsolationLevel) -> Transaction {
        self.coordinator.start_transaction(level)
    }

    /// Commit `txn`
    ///
    /// An abort caused by a conflict is `Ok(CommitOutcome::Aborted(_))`.
    ///
    /// # Errors
    /// `Error::TransactionNotActive`, or a storage error during commit.
    pub fn commit(&self, txn: &mut Transaction) -> Result<CommitOutcome> {
        self.coordinator.commit(&*self.storage, txn)
    }

    /// Abort `txn`; no-op if it already finished
    pub fn abort(&self, txn: &mut Transaction) {
        self.coordinator.abort(txn);
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Buffer a full-value write of `key`
    pub fn insert(&self, txn: &mut Transaction, key: impl Into<Key>, value: &[u8]) -> Result<()> {
        txn.write(&*self.merge, key.into(), Message::Insert(value.to_vec()))
    }

    /// Buffer a partial update of `key`, merged with the store's operator
    pub fn update(&self, txn: &mut Transaction, key: impl Into<Key>, delta: &[u8]) -> Result<()> {
        txn.write(&*self.merge, key.into(), Message::Update(delta.to_vec()))
    }

    /// Buffer a deletion of `key`
    pub fn delete(&self, txn: &mut Transaction, key: impl Into<Key>) -> Result<()> {
        txn.write(&*self.merge, key.into(), Message::Delete)
    }

    /// Read `key` within `txn`, seeing its own buffered writes
    pub fn lookup(&self, txn: &mut Transaction, key: impl Into<Key>) -> Result<Option<Vec<u8>>> {
        txn.read(&*self.storage, &*self.merge, &key.into())
    }

    // ========================================================================
    // Closure transactions
    // ========================================================================

    /// Run `f` in a transaction, retrying on conflict per the store's
    /// retry policy
    ///
    /// # Returns
    /// * `Ok(T)` - Closure return value on successful commit
    /// * `Err` - Closure error (the transaction is aborted), storage error,
    ///   or `Error::TransactionAborted` once retries are exhausted
    ///
    /// # Example
    /// ```text
    /// store.transaction(|txn| {
    ///     let n = store.lookup(txn, "n")?.map(decode).unwrap_or(0);
    ///     store.insert(txn, "n", &encode(n + 1))
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Result<T>,
    {
        self.transaction_with_retry(&self.retry, f)
    }

    /// Run `f` in a transaction with an explicit retry policy
    pub fn transaction_with_retry<F, T>(&self, config: &RetryConfig, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let mut txn = self.begin();
            let value = match f(&mut txn) {
                Ok(value) => value,
                Err(e) => {
                    self.abort(&mut txn);
                    return Err(e);
                }
            };

            match self.commit(&mut txn)? {
                CommitOutcome::Committed { .. } => return Ok(value),
                CommitOutcome::Aborted(reason) if config.should_retry(attempt, &reason) => {
                    debug!(target: "tictoc::db", attempt, %reason, "Retrying transaction");
                    thread::sleep(config.backoff(attempt));
                    attempt += 1;
                }
                CommitOutcome::Aborted(reason) => {
                    return Err(Error::TransactionAborted(format!(
                        "{} after {} attempt(s)",
                        reason,
                        attempt + 1
                    )))
                }
            }
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Committed value of `key`, outside of any transaction
    pub fn get_committed(&self, key: impl Into<Key>) -> Result<Option<Vec<u8>>> {
        let key = key.into();
        match self.storage.lookup(&key)? {
            Some(record) => Ok(Some(Tuple::from_record(&key, record)?.into_value())),
            None => Ok(None),
        }
    }

    /// Stored timestamps of `key`
    pub fn timestamps(&self, key: impl Into<Key>) -> Result<Option<TimestampSet>> {
        fetch_timestamps(&*self.storage, &key.into())
    }

    /// Transaction metrics
    pub fn stats(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }
}

impl<S: Storage> std::fmt::Debug for TransactionalStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalStore")
            .field("isolation", &self.isolation_level())
            .field("merge", &self.merge.name())
            .field("active", &self.coordinator.active_count())
            .finish()
    }
}

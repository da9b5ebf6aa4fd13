//! Store builder for fluent configuration

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tictoc_core::{IsolationLevel, MergeOperator, Result, Storage};
use tictoc_storage::{MemoryStore, TupleMerge};

use super::config::StoreConfig;
use super::transactions::RetryConfig;
use super::TransactionalStore;

// ============================================================================
// Store Builder Pattern
// ============================================================================

/// Builder for TransactionalStore configuration
///
/// # Ways to Open a Store
///
/// ```ignore
/// use tictoc_engine::{StoreConfig, TransactionalStore};
///
/// // 1. Defaults: serializable, replace merge, in-memory engine
/// let store = TransactionalStore::open(StoreConfig::default())?;
///
/// // 2. Builder
/// let store = TransactionalStore::builder()
///     .snapshot_isolation()
///     .merge("counter")
///     .open()?;
///
/// // 3. Config file
/// let store = StoreBuilder::from_config_file("tictoc.toml")?.open()?;
/// ```
#[derive(Clone, Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    /// Overrides `config.merge` when set
    merge: Option<Arc<dyn MergeOperator>>,
}

impl StoreBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            merge: None,
        }
    }

    /// Start from a `tictoc.toml` file
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        StoreConfig::from_file(path.as_ref()).map(Self::with_config)
    }

    /// Set the default isolation level
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.config.isolation = level.as_str().to_string();
        self
    }

    /// Default to Serializable
    pub fn serializable(self) -> Self {
        self.isolation(IsolationLevel::Serializable)
    }

    /// Default to SnapshotIsolation
    pub fn snapshot_isolation(self) -> Self {
        self.isolation(IsolationLevel::SnapshotIsolation)
    }

    /// Default to RepeatableRead
    pub fn repeatable_read(self) -> Self {
        self.isolation(IsolationLevel::RepeatableRead)
    }

    /// Sleep between write-set lock attempts
    pub fn lock_backoff(mut self, backoff: Duration) -> Self {
        self.config.lock_backoff_ns = u64::try_from(backoff.as_nanos()).unwrap_or(u64::MAX);
        self
    }

    /// Select a built-in merge operator by name
    pub fn merge<N: Into<String>>(mut self, name: N) -> Self {
        self.config.merge = name.into();
        self.merge = None;
        self
    }

    /// Use a custom merge operator
    pub fn merge_operator(mut self, merge: Arc<dyn MergeOperator>) -> Self {
        self.merge = Some(merge);
        self
    }

    /// Retry policy for closure transactions
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Config accumulated so far
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Open over a fresh in-memory engine
    ///
    /// # Errors
    /// `Error::InvalidConfig` for an unknown isolation level or merge name.
    pub fn open(self) -> Result<TransactionalStore<MemoryStore>> {
        let merge = self.resolve_merge()?;
        let storage = Arc::new(MemoryStore::new(Arc::new(TupleMerge::new(Arc::clone(
            &merge,
        )))));
        TransactionalStore::with_storage(storage, merge, &self.config)
    }

    /// Open over an existing engine
    ///
    /// `storage` must merge updates with a `TupleMerge` wrapping the
    /// operator this builder resolves to.
    pub fn open_with_storage<S: Storage>(self, storage: Arc<S>) -> Result<TransactionalStore<S>> {
        let merge = self.resolve_merge()?;
        TransactionalStore::with_storage(storage, merge, &self.config)
    }

    fn resolve_merge(&self) -> Result<Arc<dyn MergeOperator>> {
        match &self.merge {
            Some(merge) => Ok(Arc::clone(merge)),
            None => self.config.merge_operator(),
        }
    }
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("config", &self.config)
            .field("merge", &self.merge.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

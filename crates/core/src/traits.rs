//! Core traits for the storage engine seam
//!
//! The transaction layer never owns durability. It talks to a point-operation
//! key/value engine through [`Storage`], and value composition for partial
//! updates is delegated to a [`MergeOperator`].

use crate::error::Result;
use crate::types::Key;

/// Point-operation key/value engine
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync). Each call is atomic with respect
/// to the single key it touches; nothing more is assumed.
pub trait Storage: Send + Sync {
    /// Current record stored under `key`, with pending updates merged
    ///
    /// Returns None if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn lookup(&self, key: &Key) -> Result<Option<Vec<u8>>>;

    /// Byte-level read of the current record, used to extract the
    /// timestamp header without going through application value handling
    ///
    /// Engines that keep headers separate from merged values can override
    /// this; the default is a plain lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn lookup_raw(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.lookup(key)
    }

    /// Store `record` under `key`, replacing any existing record
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn insert(&self, key: &Key, record: &[u8]) -> Result<()>;

    /// Merge `delta` into the record under `key` with the engine's merge
    /// operator
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation or the merge fails.
    fn update(&self, key: &Key, delta: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete(&self, key: &Key) -> Result<()>;
}

/// Composes partial updates with existing values
///
/// `full_merge` applies a delta onto a base value (or onto nothing when the
/// key is absent). `partial_merge` folds two deltas, older first, into one
/// delta equivalent to applying both in order.
pub trait MergeOperator: Send + Sync {
    /// Operator name, for logs and config
    fn name(&self) -> &str;

    /// Apply `delta` onto `base`
    ///
    /// # Errors
    ///
    /// Returns `Error::Merge` if the inputs are malformed for this operator.
    fn full_merge(&self, key: &Key, base: Option<&[u8]>, delta: &[u8]) -> Result<Vec<u8>>;

    /// Combine `older` and `newer` deltas
    ///
    /// # Errors
    ///
    /// Returns `Error::Merge` if the inputs are malformed for this operator.
    fn partial_merge(&self, key: &Key, older: &[u8], newer: &[u8]) -> Result<Vec<u8>>;

    /// Check a value or delta before it is buffered
    ///
    /// Called when a write enters a transaction, so an operand this
    /// operator cannot merge is refused before commit rather than in the
    /// middle of the Write Phase. Accepts everything by default.
    ///
    /// # Errors
    ///
    /// Returns `Error::Merge` if `operand` is malformed for this operator.
    fn validate_operand(&self, _key: &Key, _operand: &[u8]) -> Result<()> {
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    fn lookup(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        (**self).lookup(key)
    }

    fn lookup_raw(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        (**self).lookup_raw(key)
    }

    fn insert(&self, key: &Key, record: &[u8]) -> Result<()> {
        (**self).insert(key, record)
    }

    fn update(&self, key: &Key, delta: &[u8]) -> Result<()> {
        (**self).update(key, delta)
    }

    fn delete(&self, key: &Key) -> Result<()> {
        (**self).delete(key)
    }
}

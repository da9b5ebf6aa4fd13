//! Sharded in-memory storage engine
//!
//! DashMap + FxHash: lock-free reads, only the target shard is locked for a
//! write. Updates are merged eagerly under the shard lock through the
//! engine's configured [`MergeOperator`], so `lookup` always returns a fully
//! merged record.
//!
//! This engine is not durable. It stands in for a real point-operation
//! engine behind the [`Storage`] trait.

use std::hash::BuildHasherDefault;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use tictoc_core::{Key, MergeOperator, Result, Storage};
use tracing::trace;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// In-memory point-operation engine
pub struct MemoryStore {
    data: DashMap<Key, Vec<u8>, FxBuildHasher>,
    merge: Arc<dyn MergeOperator>,
}

impl MemoryStore {
    /// Create an empty store that merges updates with `merge`
    pub fn new(merge: Arc<dyn MergeOperator>) -> Self {
        Self {
            data: DashMap::with_hasher(FxBuildHasher::default()),
            merge,
        }
    }

    /// Create an empty store with a fixed shard count (power of two)
    pub fn with_shard_amount(merge: Arc<dyn MergeOperator>, shards: usize) -> Self {
        Self {
            data: DashMap::with_hasher_and_shard_amount(FxBuildHasher::default(), shards),
            merge,
        }
    }

    /// Merge operator applied by `update`
    pub fn merge_operator(&self) -> &Arc<dyn MergeOperator> {
        &self.merge
    }

    /// Number of keys stored
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if `key` is present
    pub fn contains_key(&self, key: &Key) -> bool {
        self.data.contains_key(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.data.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.data.len())
            .field("merge", &self.merge.name())
            .finish()
    }
}

impl Storage for MemoryStore {
    fn lookup(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    fn insert(&self, key: &Key, record: &[u8]) -> Result<()> {
        self.data.insert(key.clone(), record.to_vec());
        Ok(())
    }

    fn update(&self, key: &Key, delta: &[u8]) -> Result<()> {
        // The entry guard holds the shard lock across read-merge-write.
        match self.data.entry(key.clone()) {
            Entry::Occupied(mut e) => {
                let merged = self.merge.full_merge(key, Some(e.get().as_slice()), delta)?;
                *e.get_mut() = merged;
            }
            Entry::Vacant(e) => {
                let merged = self.merge.full_merge(key, None, delta)?;
                e.insert(merged);
            }
        }
        trace!(target: "tictoc::storage", key = %key, delta_len = delta.len(), "update merged");
        Ok(())
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }
}

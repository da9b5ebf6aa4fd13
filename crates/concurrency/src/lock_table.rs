//! Per-key advisory lock table
//!
//! Locks are held only during commit: write-set keys for the whole
//! Validation + Write Phase, read-set keys for the duration of a single
//! entry's validation. Nothing ever blocks inside the table; callers retry
//! or abort.
//!
//! # Outcomes
//!
//! - `Acquired`: the caller now owns the key
//! - `Busy`: another owner holds the key
//! - `Deadlock`: the caller already owns the key. Waiting would wait on
//!   itself, so the request is reported instead of granted a second time.

use std::hash::BuildHasherDefault;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use tictoc_core::{Key, TxnId};
use tracing::trace;

/// Result of a non-blocking lock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Lock granted
    Acquired,
    /// Held by another owner
    Busy,
    /// Already held by the requesting owner
    Deadlock,
}

impl LockOutcome {
    /// True if this call took the lock (and so must release it)
    #[inline]
    pub fn acquired(self) -> bool {
        matches!(self, LockOutcome::Acquired)
    }
}

/// Lock table keyed by record key
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<Key, TxnId, BuildHasherDefault<FxHasher>>,
}

impl LockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to lock `key` for `owner` without blocking
    pub fn try_acquire(&self, key: &Key, owner: TxnId) -> LockOutcome {
        match self.locks.entry(key.clone()) {
            Entry::Vacant(e) => {
                e.insert(owner);
                LockOutcome::Acquired
            }
            Entry::Occupied(e) if *e.get() == owner => LockOutcome::Deadlock,
            Entry::Occupied(_) => LockOutcome::Busy,
        }
    }

    /// Release `key` if `owner` holds it
    ///
    /// Returns false when the key was not held by `owner`; releasing twice
    /// never frees a lock taken by someone else.
    pub fn release(&self, key: &Key, owner: TxnId) -> bool {
        self.locks
            .remove_if(key, |_, holder| *holder == owner)
            .is_some()
    }

    /// Lock every key, in the given order, all-or-nothing
    ///
    /// Callers pass keys in a global fixed order so concurrent batches can
    /// not wait on each other in a cycle. On the first `Busy` (or
    /// `Deadlock`) every lock taken by this call is released, in the order
    /// it was taken, and false is returned.
    pub fn lock_all<'a, I>(&self, keys: I, owner: TxnId) -> bool
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let mut taken: SmallVec<[&Key; 16]> = SmallVec::new();
        for key in keys {
            match self.try_acquire(key, owner) {
                LockOutcome::Acquired => taken.push(key),
                outcome => {
                    trace!(target: "tictoc::lock", txn_id = owner, key = %key, ?outcome, "batch lock failed");
                    for k in taken {
                        self.release(k, owner);
                    }
                    return false;
                }
            }
        }
        true
    }

    /// Release every key held by `owner`, in the given order
    pub fn release_all<'a, I>(&self, keys: I, owner: TxnId)
    where
        I: IntoIterator<Item = &'a Key>,
    {
        for key in keys {
            self.release(key, owner);
        }
    }

    /// Current holder of `key`
    pub fn holder(&self, key: &Key) -> Option<TxnId> {
        self.locks.get(key).map(|r| *r.value())
    }

    /// Check if `key` is locked by anyone
    pub fn is_locked(&self, key: &Key) -> bool {
        self.locks.contains_key(key)
    }

    /// Number of keys currently locked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no key is locked
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn keys(names: &[&str]) -> Vec<Key> {
        names.iter().map(|n| Key::from(*n)).collect()
    }

    #[test]
    fn test_try_acquire_outcomes() {
        let table = LockTable::new();
        let k = Key::from("k");

        assert_eq!(table.try_acquire(&k, 1), LockOutcome::Acquired);
        assert_eq!(table.try_acquire(&k, 1), LockOutcome::Deadlock);
        assert_eq!(table.try_acquire(&k, 2), LockOutcome::Busy);
        assert_eq!(table.holder(&k), Some(1));

        assert!(table.release(&k, 1));
        assert!(!table.is_locked(&k));
        assert_eq!(table.try_acquire(&k, 2), LockOutcome::Acquired);
    }

    #[test]
    fn test_release_by_non_owner_is_ignored() {
        let table = LockTable::new();
        let k = Key::from("k");
        table.try_acquire(&k, 1);

        assert!(!table.release(&k, 2));
        assert_eq!(table.holder(&k), Some(1));
        assert!(table.release(&k, 1));
        assert!(!table.release(&k, 1));
    }

    #[test]
    fn test_lock_all_success() {
        let table = LockTable::new();
        let ks = keys(&["a", "b", "c"]);
        assert!(table.lock_all(&ks, 7));
        assert_eq!(table.len(), 3);
        table.release_all(&ks, 7);
        assert!(table.is_empty());
    }

    #[test]
    fn test_lock_all_is_all_or_nothing() {
        let table = LockTable::new();
        table.try_acquire(&Key::from("c"), 99);

        let ks = keys(&["a", "b", "c", "d"]);
        assert!(!table.lock_all(&ks, 7));

        // Only the foreign lock remains
        assert_eq!(table.len(), 1);
        assert_eq!(table.holder(&Key::from("c")), Some(99));
        assert!(!table.is_locked(&Key::from("a")));
        assert!(!table.is_locked(&Key::from("b")));
    }

    #[test]
    fn test_lock_all_empty() {
        let table = LockTable::new();
        assert!(table.lock_all(std::iter::empty(), 1));
        assert!(table.is_empty());
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        let table = Arc::new(LockTable::new());
        let in_critical = Arc::new(AtomicUsize::new(0));
        let violations = Arc::new(AtomicUsize::new(0));
        let num_threads = 8;
        let barrier = Arc::new(Barrier::new(num_threads));
        let k = Key::from("hot");

        let handles: Vec<_> = (0..num_threads)
            .map(|i| {
                let table = Arc::clone(&table);
                let in_critical = Arc::clone(&in_critical);
                let violations = Arc::clone(&violations);
                let barrier = Arc::clone(&barrier);
                let k = k.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let owner = i as TxnId + 1;
                    let mut entered = 0;
                    while entered < 200 {
                        if table.try_acquire(&k, owner).acquired() {
                            if in_critical.fetch_add(1, Ordering::SeqCst) != 0 {
                                violations.fetch_add(1, Ordering::SeqCst);
                            }
                            in_critical.fetch_sub(1, Ordering::SeqCst);
                            assert!(table.release(&k, owner));
                            entered += 1;
                        } else {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
        assert!(table.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #[test]
            fn lock_all_takes_everything_or_nothing(
                wanted in proptest::collection::btree_set(0u8..32, 0..12),
                foreign in proptest::collection::btree_set(0u8..32, 0..4),
            ) {
                let table = LockTable::new();
                for k in &foreign {
                    table.try_acquire(&Key::from(vec![*k]), 99);
                }

                let keys: Vec<Key> = wanted.iter().map(|k| Key::from(vec![*k])).collect();
                let ok = table.lock_all(&keys, 1);
                let overlap: BTreeSet<_> = wanted.intersection(&foreign).collect();

                prop_assert_eq!(ok, overlap.is_empty());
                for k in &wanted {
                    let holder = table.holder(&Key::from(vec![*k]));
                    if foreign.contains(k) {
                        prop_assert_eq!(holder, Some(99));
                    } else if ok {
                        prop_assert_eq!(holder, Some(1));
                    } else {
                        prop_assert_eq!(holder, None);
                    }
                }

                table.release_all(&keys, 1);
                prop_assert_eq!(table.len(), foreign.len());
            }
        }
    }
}

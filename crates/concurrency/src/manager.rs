//! Transaction manager for coordinating commit operations
//!
//! Owns the lock table and drives the TicToc commit protocol against a
//! storage engine passed in per call.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Active -> Validating
//! 2. commit_rts = max read wts (collapsed with commit_wts if required)
//! 3. Sort write set by key; lock all or back off and retry
//! 4. commit_wts = max(commit_wts, rts + 1) over the locked write set
//! 5. commit_ts = commit_rts (snapshot) or commit_wts (otherwise)
//! 6. Validate the read set at commit_ts; first conflict aborts
//! 7. Stamp every write with (commit_wts, commit_wts) and apply it
//! 8. Release write-set locks; Validating -> Committed
//! ```
//!
//! A read-only transaction runs the same sequence with an empty lock set,
//! so its reads are validated like any other.
//!
//! Write-set locks are released on every exit path, including errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tictoc_core::{Error, IsolationLevel, Key, Result, Storage, Timestamp, TimestampSet, TxnId, WriteOp};
use tracing::{debug, error, trace};

use crate::lock_table::LockTable;
use crate::transaction::{AbortReason, Transaction};
use crate::validation::{compute_commit_wts, preliminary_commit_rts, validate_read_set};

/// Default sleep between write-set lock attempts
pub const DEFAULT_LOCK_BACKOFF: Duration = Duration::from_micros(1);

/// How a commit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All writes are installed
    Committed {
        /// Timestamp stamped on the writes, or the validation timestamp
        /// when there were none
        commit_ts: Timestamp,
    },
    /// Nothing was written
    Aborted(AbortReason),
}

impl CommitOutcome {
    /// Check if the transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// Commit timestamp, if committed
    pub fn commit_ts(&self) -> Option<Timestamp> {
        match self {
            CommitOutcome::Committed { commit_ts } => Some(*commit_ts),
            CommitOutcome::Aborted(_) => None,
        }
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            CommitOutcome::Committed { .. } => None,
            CommitOutcome::Aborted(reason) => Some(reason),
        }
    }
}

/// Write-set locks held for the rest of a commit
struct WriteSetLocks<'a> {
    table: &'a LockTable,
    keys: Vec<Key>,
    owner: TxnId,
}

impl Drop for WriteSetLocks<'_> {
    fn drop(&mut self) {
        self.table.release_all(&self.keys, self.owner);
    }
}

/// Manages transaction lifecycle and commits
pub struct TransactionManager {
    /// Per-key locks used during commit
    locks: LockTable,

    /// Next transaction ID, also the lock owner
    next_txn_id: AtomicU64,

    /// Sleep between failed write-set lock attempts
    lock_backoff: Duration,

    /// Failed write-set lock attempts, all transactions
    lock_retries: AtomicU64,
}

impl TransactionManager {
    /// Create a manager with the default lock backoff
    pub fn new() -> Self {
        Self::with_lock_backoff(DEFAULT_LOCK_BACKOFF)
    }

    /// Create a manager with a custom lock backoff
    pub fn with_lock_backoff(lock_backoff: Duration) -> Self {
        TransactionManager {
            locks: LockTable::new(),
            next_txn_id: AtomicU64::new(1),
            lock_backoff,
            lock_retries: AtomicU64::new(0),
        }
    }

    /// Lock table shared by every transaction of this manager
    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    /// Sleep between failed write-set lock attempts
    pub fn lock_backoff(&self) -> Duration {
        self.lock_backoff
    }

    /// Total failed write-set lock attempts
    pub fn lock_retries(&self) -> u64 {
        self.lock_retries.load(Ordering::Relaxed)
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> TxnId {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Begin a transaction at `isolation`
    pub fn begin(&self, isolation: IsolationLevel) -> Transaction {
        let txn = Transaction::new(self.next_txn_id(), isolation);
        trace!(target: "tictoc::txn", txn_id = txn.txn_id(), %isolation, "begin");
        txn
    }

    /// Commit `txn` against `storage`
    ///
    /// # Returns
    /// - `Ok(CommitOutcome::Committed)` when every write was installed
    /// - `Ok(CommitOutcome::Aborted)` when validation failed; storage is
    ///   unchanged apart from extended read timestamps
    ///
    /// # Errors
    /// `Error::TransactionNotActive` if `txn` is not active. A storage error
    /// before the Write Phase leaves storage untouched and marks the
    /// transaction aborted with `AbortReason::StorageFault`. A storage error
    /// inside the Write Phase is returned as `Error::IncompleteCommit` and
    /// marks the transaction `PartiallyApplied`, since the writes installed
    /// before it cannot be withdrawn.
    pub fn commit<S>(&self, storage: &S, txn: &mut Transaction) -> Result<CommitOutcome>
    where
        S: Storage + ?Sized,
    {
        txn.ensure_active()?;
        txn.mark_validating();

        match self.run_commit(storage, txn) {
            Ok(CommitOutcome::Committed { commit_ts }) => {
                debug!(target: "tictoc::txn", txn_id = txn.txn_id(), commit_ts, "committed");
                txn.mark_committed();
                Ok(CommitOutcome::Committed { commit_ts })
            }
            Ok(CommitOutcome::Aborted(reason)) => {
                debug!(target: "tictoc::txn", txn_id = txn.txn_id(), %reason, "aborted at validation");
                txn.mark_aborted(reason.clone());
                Ok(CommitOutcome::Aborted(reason))
            }
            Err(e) => {
                let (applied, total) = match &e {
                    Error::IncompleteCommit { applied, total, .. } => (*applied, *total),
                    _ => {
                        error!(target: "tictoc::txn", txn_id = txn.txn_id(), error = %e, "commit failed");
                        txn.mark_aborted(AbortReason::StorageFault);
                        return Err(e);
                    }
                };
                error!(
                    target: "tictoc::txn",
                    txn_id = txn.txn_id(),
                    applied,
                    total,
                    error = %e,
                    "write phase failed, commit partially applied"
                );
                txn.mark_partially_applied(applied, total);
                Err(e)
            }
        }
    }

    /// Abort `txn`
    ///
    /// No-op on a transaction that already committed or aborted.
    pub fn abort(&self, txn: &mut Transaction) {
        if !txn.is_active() {
            return;
        }
        debug!(target: "tictoc::txn", txn_id = txn.txn_id(), "abort requested");
        txn.mark_aborted(AbortReason::Requested);
    }

    fn run_commit<S>(&self, storage: &S, txn: &mut Transaction) -> Result<CommitOutcome>
    where
        S: Storage + ?Sized,
    {
        preliminary_commit_rts(txn);
        txn.write_set.sort();
        let _locks = self.lock_write_set(txn);

        if let Some(conflict) = compute_commit_wts(storage, txn)?.into_conflict() {
            return Ok(CommitOutcome::Aborted(AbortReason::Conflict(conflict)));
        }

        let commit_ts = if txn.isolation().validates_at_read_timestamp() {
            txn.commit_rts
        } else {
            txn.commit_wts
        };
        trace!(
            target: "tictoc::txn",
            txn_id = txn.txn_id(),
            commit_rts = txn.commit_rts,
            commit_wts = txn.commit_wts,
            commit_ts,
            "validating read set"
        );

        let result = validate_read_set(storage, &self.locks, txn, commit_ts)?;
        if let Some(conflict) = result.into_conflict() {
            return Ok(CommitOutcome::Aborted(AbortReason::Conflict(conflict)));
        }

        let read_only = txn.write_set.is_empty();
        self.write_phase(storage, txn)?;
        Ok(CommitOutcome::Committed {
            commit_ts: if read_only { commit_ts } else { txn.commit_wts },
        })
    }

    /// Lock the (sorted) write set, retrying until every key is held
    fn lock_write_set(&self, txn: &Transaction) -> WriteSetLocks<'_> {
        let keys: Vec<Key> = txn.write_set.keys().cloned().collect();
        let owner = txn.txn_id();
        let mut attempts: u64 = 0;
        while !self.locks.lock_all(&keys, owner) {
            attempts += 1;
            self.lock_retries.fetch_add(1, Ordering::Relaxed);
            trace!(target: "tictoc::lock", txn_id = owner, attempts, "write set busy, backing off");
            thread::sleep(self.lock_backoff);
        }
        WriteSetLocks {
            table: &self.locks,
            keys,
            owner,
        }
    }

    /// Install the write set in key order, every entry stamped
    /// `(commit_wts, commit_wts)`
    ///
    /// A delete removes the record and its timestamps together. A later
    /// insert of the same key starts again from `(0, 0)`, so its new `wts`
    /// can equal one the key carried before the delete. A transaction that
    /// read the old version and validates after the reinsert sees a
    /// matching `wts` and is not aborted; the same holds for a read of an
    /// absent key (`wts` 0) when the key is inserted and deleted again.
    ///
    /// # Errors
    /// `Error::IncompleteCommit` wrapping the first storage error, with the
    /// number of writes installed before it.
    fn write_phase<S>(&self, storage: &S, txn: &mut Transaction) -> Result<()>
    where
        S: Storage + ?Sized,
    {
        let stamp = TimestampSet::committed_at(txn.commit_wts);
        let txn_id = txn.txn_id();
        let total = txn.write_set.len();
        for (applied, entry) in txn.write_set.iter_mut().enumerate() {
            entry.tuple.set_timestamps(stamp);
            let written = match entry.op {
                WriteOp::Insert => storage.insert(&entry.key, entry.tuple.as_bytes()),
                WriteOp::Update => storage.update(&entry.key, entry.tuple.as_bytes()),
                WriteOp::Delete => storage.delete(&entry.key),
            };
            if let Err(source) = written {
                return Err(Error::IncompleteCommit {
                    txn_id,
                    applied,
                    total,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

//! TicToc validation
//!
//! Commit timestamps are derived from the data rather than from a global
//! counter:
//! - `commit_rts` is the largest `wts` the transaction read
//! - `commit_wts` is one past the largest `rts` of any key it writes,
//!   computed only once the write set is locked
//!
//! A read entry is still valid at `commit_ts` if its `wts` has not changed.
//! Entries whose recorded `rts` already covers `commit_ts` need no check;
//! the others are re-checked under the key's lock and, where the isolation
//! level allows, have their `rts` extended to `commit_ts`.
//!
//! Rules:
//! - Any `wts` change of a read key aborts (first committer wins)
//! - A read key locked by another committer aborts; there is no waiting
//! - Read-only transactions are validated the same way, with no write-set
//!   locks of their own

use thiserror::Error;
use tictoc_core::timestamp::encode_rts;
use tictoc_core::{Key, Result, Storage, Timestamp, TimestampSet, Tuple};
use tracing::trace;

use crate::lock_table::{LockOutcome, LockTable};
use crate::rw_set::ReadEntry;
use crate::transaction::Transaction;

/// Types of conflicts that abort a commit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictType {
    /// A read key was overwritten after it was read
    #[error("write timestamp of {key} changed from {read_wts} to {current_wts}")]
    WriteTimestampMismatch {
        /// The key that has a conflict
        key: Key,
        /// `wts` recorded at read time
        read_wts: Timestamp,
        /// `wts` in storage at validation time
        current_wts: Timestamp,
    },

    /// A read key is locked by another committing transaction
    #[error("{key} is locked by another transaction")]
    LockBusy {
        /// The contended key
        key: Key,
    },

    /// `rts + 1` of a written key does not fit in a timestamp
    #[error("timestamps of {key} are exhausted")]
    TimestampExhausted {
        /// The key whose `rts` is at the maximum
        key: Key,
    },
}

/// Result of transaction validation
///
/// TicToc stops at the first conflict, so at most one is ever recorded.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// First conflict, consuming the result
    pub fn into_conflict(self) -> Option<ConflictType> {
        self.conflicts.into_iter().next()
    }
}

/// Current timestamps of `key`, or None if the key is absent
///
/// # Errors
/// Storage errors, or `Error::Corruption` for a record shorter than the
/// header.
pub fn fetch_timestamps<S>(storage: &S, key: &Key) -> Result<Option<TimestampSet>>
where
    S: Storage + ?Sized,
{
    storage
        .lookup_raw(key)?
        .map(|record| Tuple::from_record(key, record).map(|t| t.timestamps()))
        .transpose()
}

/// Pre-lock estimate of the commit timestamps
///
/// Sets `commit_rts` to the largest `wts` read. Under isolation levels that
/// collapse timestamps, `commit_wts` is raised to match and both take the
/// larger value.
pub fn preliminary_commit_rts(txn: &mut Transaction) {
    txn.commit_rts = txn.read_set.max_wts();
    if txn.isolation().collapses_timestamps() {
        let ts = txn.commit_rts.max(txn.commit_wts);
        txn.commit_rts = ts;
        txn.commit_wts = ts;
    }
}

/// Raise `commit_wts` past every written key's `rts`
///
/// Must be called with the whole write set locked.
///
/// # Errors
/// Storage or corruption errors while fetching timestamps.
pub fn compute_commit_wts<S>(storage: &S, txn: &mut Transaction) -> Result<ValidationResult>
where
    S: Storage + ?Sized,
{
    let mut commit_wts = txn.commit_wts;
    for entry in txn.write_set.iter() {
        let current = fetch_timestamps(storage, &entry.key)?.unwrap_or_default();
        match current.rts.checked_add(1) {
            Some(next) => commit_wts = commit_wts.max(next),
            None => {
                return Ok(ValidationResult::conflict(ConflictType::TimestampExhausted {
                    key: entry.key.clone(),
                }))
            }
        }
    }
    txn.commit_wts = commit_wts;
    Ok(ValidationResult::ok())
}

/// Validate every read entry at `commit_ts`
///
/// Write-set keys must already be locked by the transaction; a read of such
/// a key reports `Deadlock` from the lock table and is checked without
/// taking or releasing the lock.
///
/// # Errors
/// Storage or corruption errors. Any lock taken here is released first.
pub fn validate_read_set<S>(
    storage: &S,
    locks: &LockTable,
    txn: &Transaction,
    commit_ts: Timestamp,
) -> Result<ValidationResult>
where
    S: Storage + ?Sized,
{
    let extend = txn.isolation().extends_read_timestamps();

    for entry in txn.read_set.iter() {
        let recorded = entry.tuple.timestamps();
        if recorded.rts >= commit_ts {
            continue;
        }

        let current = fetch_timestamps(storage, &entry.key)?;
        if let Some(conflict) = wts_conflict(entry, current) {
            return Ok(ValidationResult::conflict(conflict));
        }

        let outcome = locks.try_acquire(&entry.key, txn.txn_id());
        if outcome == LockOutcome::Busy {
            return Ok(ValidationResult::conflict(ConflictType::LockBusy {
                key: entry.key.clone(),
            }));
        }

        let checked = validate_locked_entry(storage, entry, current, outcome, commit_ts, extend);
        if outcome.acquired() {
            locks.release(&entry.key, txn.txn_id());
        }
        if let Some(conflict) = checked? {
            return Ok(ValidationResult::conflict(conflict));
        }
    }

    Ok(ValidationResult::ok())
}

fn validate_locked_entry<S>(
    storage: &S,
    entry: &ReadEntry,
    mut current: Option<TimestampSet>,
    outcome: LockOutcome,
    commit_ts: Timestamp,
    extend: bool,
) -> Result<Option<ConflictType>>
where
    S: Storage + ?Sized,
{
    // Already ours through the write set: nothing could have changed.
    if outcome != LockOutcome::Deadlock {
        current = fetch_timestamps(storage, &entry.key)?;
        if let Some(conflict) = wts_conflict(entry, current) {
            return Ok(Some(conflict));
        }
    }

    if extend {
        if let Some(ts) = current {
            let rts = commit_ts.max(ts.rts);
            if rts > ts.rts {
                storage.update(&entry.key, &encode_rts(rts))?;
                trace!(target: "tictoc::txn", key = %entry.key, from = ts.rts, to = rts, "extended rts");
            }
        }
    }
    Ok(None)
}

fn wts_conflict(entry: &ReadEntry, current: Option<TimestampSet>) -> Option<ConflictType> {
    let read_wts = entry.tuple.timestamps().wts;
    let current_wts = current.map_or(0, |ts| ts.wts);
    (read_wts != current_wts).then(|| ConflictType::WriteTimestampMismatch {
        key: entry.key.clone(),
        read_wts,
        current_wts,
    })
}

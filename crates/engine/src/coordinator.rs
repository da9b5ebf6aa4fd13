//! Commit coordination and lifecycle counters
//!
//! `TransactionCoordinator` sits between the store facade and the
//! `TransactionManager`. Every transaction that passes through it is
//! counted once when it starts and once when it finishes, and finished
//! transactions are classified by how they ended: committed (read-only or
//! with writes), aborted on request, aborted by a validation conflict,
//! aborted by a storage fault before any write, or left partially applied
//! by a storage fault inside the Write Phase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tictoc_concurrency::{AbortReason, CommitOutcome, Transaction, TransactionManager};
use tictoc_core::{IsolationLevel, Result, Storage};
use tracing::{debug, warn};

/// How a transaction left the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Committed { read_only: bool },
    Requested,
    Conflict,
    StorageFault,
    PartiallyApplied,
}

impl From<&AbortReason> for Finish {
    fn from(reason: &AbortReason) -> Self {
        match reason {
            AbortReason::Requested => Finish::Requested,
            AbortReason::Conflict(_) => Finish::Conflict,
            AbortReason::StorageFault => Finish::StorageFault,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    in_flight: AtomicU64,
    committed: AtomicU64,
    read_only: AtomicU64,
    requested: AtomicU64,
    conflicts: AtomicU64,
    faults: AtomicU64,
    partial: AtomicU64,
}

impl Counters {
    fn start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, how: Finish) {
        // Saturating: a finish without a matching start must not wrap.
        let _ = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        let counter = match how {
            Finish::Committed { read_only } => {
                if read_only {
                    self.read_only.fetch_add(1, Ordering::Relaxed);
                }
                &self.committed
            }
            Finish::Requested => &self.requested,
            Finish::Conflict => &self.conflicts,
            Finish::StorageFault => &self.faults,
            Finish::PartiallyApplied => &self.partial,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives commits through the manager and keeps lifecycle counters
///
/// Counters are observational only and use Relaxed ordering; a metrics
/// snapshot taken while transactions run may be momentarily inconsistent.
pub struct TransactionCoordinator {
    manager: TransactionManager,
    counters: Counters,
}

impl TransactionCoordinator {
    /// Create a coordinator whose manager sleeps `lock_backoff` between
    /// write-set lock attempts
    pub fn new(lock_backoff: Duration) -> Self {
        Self {
            manager: TransactionManager::with_lock_backoff(lock_backoff),
            counters: Counters::default(),
        }
    }

    /// Underlying transaction manager
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    /// Begin a transaction at `isolation`
    pub fn start_transaction(&self, isolation: IsolationLevel) -> Transaction {
        let txn = self.manager.begin(isolation);
        self.counters.start();
        debug!(target: "tictoc::txn", txn_id = txn.txn_id(), %isolation, "Transaction started");
        txn
    }

    /// Commit `txn` and classify the outcome
    ///
    /// # Errors
    /// `Error::TransactionNotActive` if `txn` already finished (nothing is
    /// counted), `Error::IncompleteCommit` when the Write Phase stopped
    /// partway (counted as partially applied), or any other storage error
    /// (counted as a storage fault).
    pub fn commit<S>(&self, storage: &S, txn: &mut Transaction) -> Result<CommitOutcome>
    where
        S: Storage + ?Sized,
    {
        txn.ensure_active()?;
        let read_only = txn.write_set().is_empty();
        match self.manager.commit(storage, txn) {
            Ok(outcome) => {
                match &outcome {
                    CommitOutcome::Committed { .. } => {
                        self.counters.finish(Finish::Committed { read_only })
                    }
                    CommitOutcome::Aborted(reason) => {
                        debug!(target: "tictoc::txn", txn_id = txn.txn_id(), %reason, "Transaction aborted");
                        self.counters.finish(Finish::from(reason));
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(target: "tictoc::txn", txn_id = txn.txn_id(), error = %e, "Commit failed");
                self.counters.finish(if txn.is_partially_applied() {
                    Finish::PartiallyApplied
                } else {
                    Finish::StorageFault
                });
                Err(e)
            }
        }
    }

    /// Abort `txn` on request; finished transactions are left alone and
    /// not counted again
    pub fn abort(&self, txn: &mut Transaction) {
        if txn.is_active() {
            self.manager.abort(txn);
            self.counters.finish(Finish::Requested);
        }
    }

    /// Snapshot of the lifecycle counters
    pub fn metrics(&self) -> TransactionMetrics {
        let c = &self.counters;
        let aborted_requested = c.requested.load(Ordering::Relaxed);
        let aborted_conflict = c.conflicts.load(Ordering::Relaxed);
        let aborted_fault = c.faults.load(Ordering::Relaxed);
        TransactionMetrics {
            active_count: c.in_flight.load(Ordering::Relaxed),
            total_started: c.started.load(Ordering::Relaxed),
            total_committed: c.committed.load(Ordering::Relaxed),
            read_only_commits: c.read_only.load(Ordering::Relaxed),
            total_aborted: aborted_requested + aborted_conflict + aborted_fault,
            aborted_requested,
            aborted_conflict,
            aborted_fault,
            partially_applied: c.partial.load(Ordering::Relaxed),
            lock_retries: self.manager.lock_retries(),
        }
    }

    /// Transactions begun and not yet finished
    pub fn active_count(&self) -> u64 {
        self.counters.in_flight.load(Ordering::Relaxed)
    }
}

/// Point-in-time lifecycle counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionMetrics {
    /// Begun and not yet finished
    pub active_count: u64,
    /// Ever begun
    pub total_started: u64,
    /// Committed, read-only ones included
    pub total_committed: u64,
    /// Commits with an empty write set
    pub read_only_commits: u64,
    /// Sum of the three abort causes below
    pub total_aborted: u64,
    /// Aborted by the caller
    pub aborted_requested: u64,
    /// Aborted by validation or lock contention
    pub aborted_conflict: u64,
    /// Aborted by a storage error before the Write Phase
    pub aborted_fault: u64,
    /// Stopped by a storage error inside the Write Phase; neither committed
    /// nor aborted
    pub partially_applied: u64,
    /// Failed write-set lock attempts, summed across commits
    pub lock_retries: u64,
}

impl TransactionMetrics {
    /// Committed, aborted, or partially applied
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted + self.partially_applied
    }

    /// Fraction of finished transactions that aborted by conflict
    pub fn conflict_rate(&self) -> f64 {
        match self.total_completed() {
            0 => 0.0,
            n => self.aborted_conflict as f64 / n as f64,
        }
    }
}

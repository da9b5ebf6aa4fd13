//! Transaction state for TicToc
//!
//! A [`Transaction`] owns its read and write sets and runs the Read Phase
//! and Local Write Buffering. Commit is driven by the
//! [`TransactionManager`](crate::manager::TransactionManager), which needs
//! the shared lock table.
//!
//! # Read-Your-Writes
//!
//! When reading a key, the transaction checks its write set first:
//! 1. **Insert** (including updates already folded onto an insert): returns
//!    the buffered value. The read entry carries the buffered value but the
//!    timestamps currently in storage, so validation checks the real record.
//! 2. **Delete**: returns None, records nothing.
//! 3. **Update** (a delta with no local base): reads storage and applies the
//!    buffered delta to the returned value. The read entry records the
//!    stored tuple unchanged.
//!
//! Otherwise the value comes from storage and the stored tuple is recorded.
//!
//! # Lifecycle
//!
//! `Active` → `Validating` → `Committed | Aborted | PartiallyApplied`, or
//! `Active` → `Aborted` on a requested abort. All terminal states drop the
//! read and write sets.
//!
//! `PartiallyApplied` is reached only when storage fails inside the Write
//! Phase. Installed writes cannot be taken back, so the transaction is not
//! reported as aborted.

use std::fmt;
use std::time::{Duration, Instant};

use tictoc_core::{
    Error, IsolationLevel, Key, MergeOperator, Message, Result, Storage, Timestamp, Tuple,
    TxnId, WriteOp,
};

use crate::rw_set::{ReadSet, WriteSet};
use crate::validation::{fetch_timestamps, ConflictType};

/// Why a transaction ended in `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The caller asked for it
    Requested,
    /// Validation failed
    Conflict(ConflictType),
    /// Storage failed before the Write Phase; nothing was installed
    StorageFault,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Requested => write!(f, "abort requested"),
            AbortReason::Conflict(c) => write!(f, "conflict: {}", c),
            AbortReason::StorageFault => write!(f, "storage fault during commit"),
        }
    }
}

/// Status of a transaction in its lifecycle
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `Aborted`
/// - `PartiallyApplied`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Commit in progress
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Why it aborted
        reason: AbortReason,
    },
    /// Storage failed inside the Write Phase after `applied` of `total`
    /// writes were installed
    PartiallyApplied {
        /// Writes installed, in key order
        applied: usize,
        /// Size of the write set
        total: usize,
    },
}

impl TransactionStatus {
    /// Short state name
    pub fn name(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Validating => "validating",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted { .. } => "aborted",
            TransactionStatus::PartiallyApplied { .. } => "partially applied",
        }
    }
}

/// A TicToc transaction
///
/// Single owner, single thread. Created by
/// [`TransactionManager::begin`](crate::manager::TransactionManager::begin).
pub struct Transaction {
    txn_id: TxnId,
    isolation: IsolationLevel,
    pub(crate) read_set: ReadSet,
    pub(crate) write_set: WriteSet,
    pub(crate) commit_wts: Timestamp,
    pub(crate) commit_rts: Timestamp,
    status: TransactionStatus,
    start_time: Instant,
}

impl Transaction {
    /// Create an active transaction
    ///
    /// The isolation level is fixed for the life of the transaction.
    pub fn new(txn_id: TxnId, isolation: IsolationLevel) -> Self {
        Transaction {
            txn_id,
            isolation,
            read_set: ReadSet::new(),
            write_set: WriteSet::new(),
            commit_wts: 0,
            commit_rts: 0,
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    /// Transaction id, also the lock owner
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Isolation level chosen at begin
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Recorded reads
    pub fn read_set(&self) -> &ReadSet {
        &self.read_set
    }

    /// Buffered writes
    pub fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    /// Write timestamp chosen at commit (0 before commit)
    pub fn commit_wts(&self) -> Timestamp {
        self.commit_wts
    }

    /// Read timestamp chosen at commit (0 before commit)
    pub fn commit_rts(&self) -> Timestamp {
        self.commit_rts
    }

    /// Check if the transaction can still read and write
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Check if the transaction committed
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }

    /// Check if the transaction aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Check if the Write Phase stopped partway
    pub fn is_partially_applied(&self) -> bool {
        matches!(self.status, TransactionStatus::PartiallyApplied { .. })
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Time since begin
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Ensure the transaction is active
    ///
    /// # Errors
    /// `Error::TransactionNotActive` once commit has started or after abort.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionNotActive {
                txn_id: self.txn_id,
                state: self.status.name().to_string(),
            })
        }
    }

    /// Read `key`, honoring this transaction's buffered writes
    ///
    /// `merge` is the application merge operator, used to apply a buffered
    /// partial update to the value returned.
    ///
    /// # Errors
    /// Storage errors, `Error::Corruption` for a record shorter than the
    /// header, merge errors, or `Error::TransactionNotActive`.
    pub fn read<S>(&mut self, storage: &S, merge: &dyn MergeOperator, key: &Key) -> Result<Option<Vec<u8>>>
    where
        S: Storage + ?Sized,
    {
        self.ensure_active()?;

        let mut pending_delta = None;
        if let Some(entry) = self.write_set.find(key) {
            match entry.op {
                WriteOp::Delete => return Ok(None),
                WriteOp::Insert => {
                    let mut tuple = entry.tuple.clone();
                    let current = fetch_timestamps(storage, key)?.unwrap_or_default();
                    tuple.set_timestamps(current);
                    let value = tuple.value().to_vec();
                    self.read_set.push(key.clone(), tuple);
                    return Ok(Some(value));
                }
                WriteOp::Update => pending_delta = Some(entry.tuple.value().to_vec()),
            }
        }

        let record = match storage.lookup(key)? {
            Some(record) => record,
            None => {
                // The delta alone is what commit would install.
                return match pending_delta {
                    Some(delta) => Ok(Some(merge.full_merge(key, None, &delta)?)),
                    None => Ok(None),
                };
            }
        };

        let tuple = Tuple::from_record(key, record)?;
        let value = match pending_delta {
            Some(delta) => merge.full_merge(key, Some(tuple.value()), &delta)?,
            None => tuple.value().to_vec(),
        };
        self.read_set.push(key.clone(), tuple);
        Ok(Some(value))
    }

    /// Buffer a write
    ///
    /// # Panics
    /// On `Message::Update` for a key this transaction already deleted.
    ///
    /// The payload of an insert or update is checked with
    /// [`MergeOperator::validate_operand`] first; a rejected write leaves the
    /// write set untouched.
    ///
    /// # Errors
    /// Merge errors, or `Error::TransactionNotActive`.
    pub fn write(&mut self, merge: &dyn MergeOperator, key: Key, message: Message) -> Result<()> {
        self.ensure_active()?;
        if message.op() != WriteOp::Delete {
            merge.validate_operand(&key, message.payload())?;
        }

        match self.write_set.find_mut(&key) {
            Some(entry) => match message {
                Message::Insert(value) => {
                    entry.op = WriteOp::Insert;
                    entry.tuple = Tuple::unstamped(&value);
                }
                Message::Delete => {
                    entry.op = WriteOp::Delete;
                    entry.tuple = Tuple::unstamped(&[]);
                }
                Message::Update(delta) => {
                    let merged = match entry.op {
                        WriteOp::Insert => merge.full_merge(&key, Some(entry.tuple.value()), &delta)?,
                        WriteOp::Update => merge.partial_merge(&key, entry.tuple.value(), &delta)?,
                        WriteOp::Delete => {
                            panic!("update of {} after delete in transaction {}", key, self.txn_id)
                        }
                    };
                    entry.tuple.set_value(&merged);
                }
            },
            None => {
                let tuple = Tuple::unstamped(message.payload());
                self.write_set.insert(key, message.op(), tuple);
            }
        }
        Ok(())
    }

    pub(crate) fn mark_validating(&mut self) {
        debug_assert!(self.is_active());
        self.status = TransactionStatus::Validating;
    }

    pub(crate) fn mark_committed(&mut self) {
        self.status = TransactionStatus::Committed;
        self.release_sets();
    }

    pub(crate) fn mark_aborted(&mut self, reason: AbortReason) {
        self.status = TransactionStatus::Aborted { reason };
        self.release_sets();
    }

    pub(crate) fn mark_partially_applied(&mut self, applied: usize, total: usize) {
        self.status = TransactionStatus::PartiallyApplied { applied, total };
        self.release_sets();
    }

    fn release_sets(&mut self) {
        self.read_set.clear();
        self.write_set.clear();
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("txn_id", &self.txn_id)
            .field("isolation", &self.isolation)
            .field("status", &self.status)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .finish()
    }
}

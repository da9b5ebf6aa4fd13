//! Error types for the TicToc transaction layer
//!
//! Abort is NOT an error: a failed validation is reported through
//! `CommitOutcome::Aborted`. The variants here cover storage faults,
//! corrupted records, misuse of a finished transaction and bad configuration.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

use crate::types::Key;

/// Result type alias for TicToc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the TicToc transaction layer
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure reported by the underlying storage engine
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored record could not be decoded
    #[error("Data corruption for key {key}: {message}")]
    Corruption {
        /// Key whose record is malformed
        key: Key,
        /// What was wrong with it
        message: String,
    },

    /// A merge operator rejected its inputs
    #[error("Merge error for key {key}: {message}")]
    Merge {
        /// Key being merged
        key: Key,
        /// Operator-specific description
        message: String,
    },

    /// Operation attempted on a transaction that already committed or aborted
    #[error("Transaction {txn_id} is not active ({state})")]
    TransactionNotActive {
        /// Transaction id
        txn_id: u64,
        /// Human-readable state
        state: String,
    },

    /// The Write Phase stopped after validation succeeded
    ///
    /// The first `applied` writes (in key order) are installed and the rest
    /// are not. The transaction is neither committed nor aborted.
    #[error("Commit of transaction {txn_id} stopped after {applied} of {total} writes: {source}")]
    IncompleteCommit {
        /// Transaction id
        txn_id: u64,
        /// Writes installed before the failure
        applied: usize,
        /// Size of the write set
        total: usize,
        /// The storage error that stopped the Write Phase
        source: Box<Error>,
    },

    /// Transaction aborted and could not be retried to completion
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// Configuration value out of range or unparseable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build a storage error from anything printable
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into())
    }

    /// Build a corruption error for `key`
    pub fn corruption(key: &Key, message: impl Into<String>) -> Self {
        Error::Corruption {
            key: key.clone(),
            message: message.into(),
        }
    }

    /// Build a merge error for `key`
    pub fn merge(key: &Key, message: impl Into<String>) -> Self {
        Error::Merge {
            key: key.clone(),
            message: message.into(),
        }
    }

    /// True for errors that a caller may resolve by retrying the transaction
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::TransactionAborted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_storage() {
        let err = Error::storage("write failed");
        let msg = err.to_string();
        assert!(msg.contains("Storage error"));
        assert!(msg.contains("write failed"));
    }

    #[test]
    fn test_error_display_corruption() {
        let err = Error::corruption(&Key::from("k1"), "record shorter than header");
        let msg = err.to_string();
        assert!(msg.contains("Data corruption"));
        assert!(msg.contains("k1"));
        assert!(msg.contains("shorter than header"));
    }

    #[test]
    fn test_error_display_not_active() {
        let err = Error::TransactionNotActive {
            txn_id: 7,
            state: "committed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("7"));
        assert!(msg.contains("committed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_display_incomplete_commit() {
        let err = Error::IncompleteCommit {
            txn_id: 4,
            applied: 1,
            total: 3,
            source: Box::new(Error::storage("disk full")),
        };
        let msg = err.to_string();
        assert!(msg.contains("transaction 4"));
        assert!(msg.contains("1 of 3 writes"));
        assert!(msg.contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_is_conflict() {
        assert!(Error::TransactionAborted("busy".into()).is_conflict());
        assert!(!Error::storage("disk").is_conflict());
        assert!(!Error::InvalidConfig("bad".into()).is_conflict());
    }
}

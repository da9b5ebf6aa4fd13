//! Transaction isolation levels
//!
//! | Level | rts/wts collapse at commit | rts extension during validation |
//! |---|---|---|
//! | Serializable | yes | yes |
//! | RepeatableRead | yes | no |
//! | SnapshotIsolation | no | yes |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Isolation level governing a transaction's commit
///
/// The raw discriminant `0` is reserved as the invalid / uninitialized
/// sentinel and is rejected by `TryFrom<u8>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum IsolationLevel {
    /// Full serializability (default)
    #[default]
    Serializable = 1,
    /// Snapshot isolation: commits at the read timestamp, write skew possible
    #[serde(rename = "snapshot")]
    SnapshotIsolation = 2,
    /// Repeatable read: never extends stored read timestamps
    RepeatableRead = 3,
}

impl IsolationLevel {
    /// Whether commit ties `commit_rts` and `commit_wts` together
    #[inline]
    pub fn collapses_timestamps(self) -> bool {
        matches!(
            self,
            IsolationLevel::Serializable | IsolationLevel::RepeatableRead
        )
    }

    /// Whether validation may extend a record's stored read timestamp
    #[inline]
    pub fn extends_read_timestamps(self) -> bool {
        !matches!(self, IsolationLevel::RepeatableRead)
    }

    /// Whether the commit timestamp used for validation is `commit_rts`
    #[inline]
    pub fn validates_at_read_timestamp(self) -> bool {
        matches!(self, IsolationLevel::SnapshotIsolation)
    }

    /// Raw discriminant
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Config-file spelling
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::SnapshotIsolation => "snapshot",
            IsolationLevel::RepeatableRead => "repeatable_read",
        }
    }
}

impl TryFrom<u8> for IsolationLevel {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(IsolationLevel::Serializable),
            2 => Ok(IsolationLevel::SnapshotIsolation),
            3 => Ok(IsolationLevel::RepeatableRead),
            other => Err(Error::InvalidConfig(format!(
                "invalid isolation level discriminant {}",
                other
            ))),
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serializable" => Ok(IsolationLevel::Serializable),
            "snapshot" | "snapshot_isolation" => Ok(IsolationLevel::SnapshotIsolation),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            other => Err(Error::InvalidConfig(format!(
                "unknown isolation level '{}'. Expected \"serializable\", \"snapshot\" or \"repeatable_read\"",
                other
            ))),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        use IsolationLevel::*;
        assert!(Serializable.collapses_timestamps());
        assert!(Serializable.extends_read_timestamps());
        assert!(!Serializable.validates_at_read_timestamp());

        assert!(RepeatableRead.collapses_timestamps());
        assert!(!RepeatableRead.extends_read_timestamps());
        assert!(!RepeatableRead.validates_at_read_timestamp());

        assert!(!SnapshotIsolation.collapses_timestamps());
        assert!(SnapshotIsolation.extends_read_timestamps());
        assert!(SnapshotIsolation.validates_at_read_timestamp());
    }

    #[test]
    fn test_default_is_serializable() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::Serializable);
    }

    #[test]
    fn test_invalid_sentinel_rejected() {
        assert!(IsolationLevel::try_from(0u8).is_err());
        assert!(IsolationLevel::try_from(4u8).is_err());
        for level in [
            IsolationLevel::Serializable,
            IsolationLevel::SnapshotIsolation,
            IsolationLevel::RepeatableRead,
        ] {
            assert_eq!(IsolationLevel::try_from(level.as_u8()).unwrap(), level);
            assert_eq!(level.as_str().parse::<IsolationLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_parse_unknown() {
        let err = "chaos".parse::<IsolationLevel>().unwrap_err();
        assert!(err.to_string().contains("chaos"));
    }
}

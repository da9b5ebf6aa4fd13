//! Core types for the TicToc store
//!
//! - Key: opaque byte-string key, totally ordered by bytes
//! - TxnId: transaction identifier, doubles as lock owner

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Transaction identifier
///
/// Allocated monotonically by the transaction manager. The lock table uses it
/// to tell an owner's re-entrant request apart from contention.
pub type TxnId = u64;

/// Opaque key
///
/// Keys compare byte-wise. That order is the fixed, transaction-independent
/// order used to lock write sets at commit. Serializes as its bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<u8>);

impl Key {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// Key bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty key
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume and return the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into_bytes())
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key(b.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key(b)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Key {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Key({:?})", s),
            Err(_) => write!(f, "Key({:02x?})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_serializes_as_bytes() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Entry {
            key: Key,
        }

        let entry = Entry { key: Key::from("ab") };
        let text = toml::to_string(&entry).unwrap();
        assert!(text.contains("97") && text.contains("98"), "{}", text);
        assert_eq!(toml::from_str::<Entry>(&text).unwrap(), entry);
    }

    #[test]
    fn test_key_ordering_is_bytewise() {
        let mut keys = vec![Key::from("b"), Key::from("ab"), Key::from("a"), Key::from("")];
        keys.sort();
        assert_eq!(
            keys,
            vec![Key::from(""), Key::from("a"), Key::from("ab"), Key::from("b")]
        );
    }

    #[test]
    fn test_key_conversions() {
        let k1 = Key::from("user:1");
        let k2 = Key::from(b"user:1".as_slice());
        let k3 = Key::from(String::from("user:1"));
        assert_eq!(k1, k2);
        assert_eq!(k2, k3);
        assert_eq!(k1.len(), 6);
        assert_eq!(k1.clone().into_bytes(), b"user:1".to_vec());
    }

    #[test]
    fn test_key_debug_binary() {
        let k = Key::new(vec![0xff, 0x00]);
        assert_eq!(format!("{:?}", k), "Key([ff, 00])");
        assert_eq!(format!("{:?}", Key::from("a")), "Key(\"a\")");
    }
}

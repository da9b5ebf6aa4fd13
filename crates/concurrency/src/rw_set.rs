//! Read and write sets
//!
//! The read set is an ordered log: one entry per found read, duplicates kept.
//! The write set holds at most one entry per key; later writes to the same
//! key are folded into the existing entry by the transaction.

use tictoc_core::{Key, Timestamp, Tuple, WriteOp};

/// A record observed during the Read Phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    /// Key read
    pub key: Key,
    /// Header + value as observed
    pub tuple: Tuple,
}

/// A buffered local write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEntry {
    /// Key written
    pub key: Key,
    /// Operation applied at commit
    pub op: WriteOp,
    /// Buffered tuple; header stays zero until the Write Phase stamps it
    pub tuple: Tuple,
}

/// Ordered read log
#[derive(Debug, Clone, Default)]
pub struct ReadSet {
    entries: Vec<ReadEntry>,
}

impl ReadSet {
    /// Create an empty read set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, key: Key, tuple: Tuple) {
        self.entries.push(ReadEntry { key, tuple });
    }

    /// Entries in read order
    pub fn iter(&self) -> std::slice::Iter<'_, ReadEntry> {
        self.entries.iter()
    }

    /// Largest observed `wts` (0 when empty)
    pub fn max_wts(&self) -> Timestamp {
        self.entries
            .iter()
            .map(|e| e.tuple.timestamps().wts)
            .max()
            .unwrap_or(0)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no reads were recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Key-unique write buffer
///
/// Insertion order is kept until [`WriteSet::sort`] puts the entries in the
/// global lock order at commit.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    entries: Vec<WriteEntry>,
}

impl WriteSet {
    /// Create an empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `key`, if buffered
    pub fn find(&self, key: &Key) -> Option<&WriteEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }

    /// Mutable entry for `key`, if buffered
    pub fn find_mut(&mut self, key: &Key) -> Option<&mut WriteEntry> {
        self.entries.iter_mut().find(|e| &e.key == key)
    }

    /// Append a new entry
    ///
    /// # Panics
    /// If `key` is already buffered.
    pub fn insert(&mut self, key: Key, op: WriteOp, tuple: Tuple) {
        assert!(
            self.find(&key).is_none(),
            "write set already holds an entry for {}",
            key
        );
        self.entries.push(WriteEntry { key, op, tuple });
    }

    /// Sort entries by key bytes
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.key.cmp(&b.key));
    }

    /// Keys in current entry order
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Check if `key` is buffered
    pub fn contains(&self, key: &Key) -> bool {
        self.find(key).is_some()
    }

    /// Entries in current order
    pub fn iter(&self) -> std::slice::Iter<'_, WriteEntry> {
        self.entries.iter()
    }

    /// Mutable entries in current order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, WriteEntry> {
        self.entries.iter_mut()
    }

    /// Number of buffered keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictoc_core::TimestampSet;

    #[test]
    fn test_read_set_keeps_duplicates() {
        let mut rs = ReadSet::new();
        rs.push(Key::from("a"), Tuple::new(TimestampSet::new(1, 1), b"x"));
        rs.push(Key::from("a"), Tuple::new(TimestampSet::new(3, 4), b"y"));
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.max_wts(), 3);
    }

    #[test]
    fn test_read_set_empty_max_wts() {
        assert_eq!(ReadSet::new().max_wts(), 0);
    }

    #[test]
    fn test_write_set_find_and_mutate() {
        let mut ws = WriteSet::new();
        ws.insert(Key::from("k"), WriteOp::Insert, Tuple::unstamped(b"v1"));
        assert!(ws.contains(&Key::from("k")));

        let e = ws.find_mut(&Key::from("k")).unwrap();
        e.tuple.set_value(b"v2");
        e.op = WriteOp::Delete;

        let e = ws.find(&Key::from("k")).unwrap();
        assert_eq!(e.op, WriteOp::Delete);
        assert_eq!(e.tuple.value(), b"v2");
        assert!(ws.find(&Key::from("other")).is_none());
    }

    #[test]
    #[should_panic(expected = "already holds an entry")]
    fn test_write_set_rejects_duplicate_key() {
        let mut ws = WriteSet::new();
        ws.insert(Key::from("k"), WriteOp::Insert, Tuple::unstamped(b"1"));
        ws.insert(Key::from("k"), WriteOp::Insert, Tuple::unstamped(b"2"));
    }

    #[test]
    fn test_write_set_sort_orders_by_key_bytes() {
        let mut ws = WriteSet::new();
        for k in ["b", "aa", "a", "c"] {
            ws.insert(Key::from(k), WriteOp::Insert, Tuple::unstamped(b""));
        }
        ws.sort();
        let keys: Vec<_> = ws.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![Key::from("a"), Key::from("aa"), Key::from("b"), Key::from("c")]
        );
    }
}

//! Merge operators
//!
//! Application operators compose plain values:
//! - `ReplaceMerge`: the delta is the new value (default)
//! - `AppendMerge`: the delta is appended
//! - `CounterMerge`: values and deltas are little-endian u64, added wrapping
//!
//! `TupleMerge` is the operator installed into the storage engine underneath
//! the transaction layer. It understands the tuple header and delegates the
//! value part to an application operator. It accepts two delta shapes:
//!
//! ```text
//! 4 bytes        read-timestamp refresh: rts = max(stored rts, delta)
//! >= 8 bytes     tuple: header replaces the stored header,
//!                value is merged through the application operator
//! ```

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tictoc_core::timestamp::{decode_rts, TIMESTAMP_SIZE};
use tictoc_core::{Error, Key, MergeOperator, Result, Tuple, TUPLE_HEADER_SIZE};

/// The delta replaces the value
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceMerge;

impl MergeOperator for ReplaceMerge {
    fn name(&self) -> &str {
        "replace"
    }

    fn full_merge(&self, _key: &Key, _base: Option<&[u8]>, delta: &[u8]) -> Result<Vec<u8>> {
        Ok(delta.to_vec())
    }

    fn partial_merge(&self, _key: &Key, _older: &[u8], newer: &[u8]) -> Result<Vec<u8>> {
        Ok(newer.to_vec())
    }
}

/// The delta is appended to the value
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendMerge;

impl MergeOperator for AppendMerge {
    fn name(&self) -> &str {
        "append"
    }

    fn full_merge(&self, _key: &Key, base: Option<&[u8]>, delta: &[u8]) -> Result<Vec<u8>> {
        let base = base.unwrap_or_default();
        let mut out = Vec::with_capacity(base.len() + delta.len());
        out.extend_from_slice(base);
        out.extend_from_slice(delta);
        Ok(out)
    }

    fn partial_merge(&self, key: &Key, older: &[u8], newer: &[u8]) -> Result<Vec<u8>> {
        self.full_merge(key, Some(older), newer)
    }
}

/// Little-endian u64 counter; an absent value counts as zero
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterMerge;

impl CounterMerge {
    const WIDTH: usize = 8;

    /// Encode a counter value or delta
    pub fn encode(n: u64) -> Vec<u8> {
        let mut out = vec![0u8; Self::WIDTH];
        LittleEndian::write_u64(&mut out, n);
        out
    }

    /// Decode a counter value, `None` if the width is wrong
    pub fn decode(bytes: &[u8]) -> Option<u64> {
        (bytes.len() == Self::WIDTH).then(|| LittleEndian::read_u64(bytes))
    }

    fn operand(key: &Key, bytes: &[u8], what: &str) -> Result<u64> {
        Self::decode(bytes).ok_or_else(|| {
            Error::merge(
                key,
                format!("counter {} must be {} bytes, got {}", what, Self::WIDTH, bytes.len()),
            )
        })
    }
}

impl MergeOperator for CounterMerge {
    fn name(&self) -> &str {
        "counter"
    }

    fn full_merge(&self, key: &Key, base: Option<&[u8]>, delta: &[u8]) -> Result<Vec<u8>> {
        let base = match base {
            Some(b) => Self::operand(key, b, "value")?,
            None => 0,
        };
        let delta = Self::operand(key, delta, "delta")?;
        Ok(Self::encode(base.wrapping_add(delta)))
    }

    fn partial_merge(&self, key: &Key, older: &[u8], newer: &[u8]) -> Result<Vec<u8>> {
        self.full_merge(key, Some(older), newer)
    }

    fn validate_operand(&self, key: &Key, operand: &[u8]) -> Result<()> {
        Self::operand(key, operand, "operand").map(|_| ())
    }
}

/// Look up an application merge operator by its config name
pub fn merge_operator_by_name(name: &str) -> Option<Arc<dyn MergeOperator>> {
    match name {
        "replace" => Some(Arc::new(ReplaceMerge)),
        "append" => Some(Arc::new(AppendMerge)),
        "counter" => Some(Arc::new(CounterMerge)),
        _ => None,
    }
}

/// Tuple-aware merge installed into the storage engine
pub struct TupleMerge {
    app: Arc<dyn MergeOperator>,
}

impl TupleMerge {
    /// Wrap an application merge operator
    pub fn new(app: Arc<dyn MergeOperator>) -> Self {
        TupleMerge { app }
    }

    /// The wrapped application operator
    pub fn application(&self) -> &Arc<dyn MergeOperator> {
        &self.app
    }

    fn parse_tuple(key: &Key, bytes: &[u8], what: &str) -> Result<Tuple> {
        if bytes.len() < TUPLE_HEADER_SIZE {
            return Err(Error::merge(
                key,
                format!(
                    "{} of {} bytes is neither a timestamp refresh nor a tuple",
                    what,
                    bytes.len()
                ),
            ));
        }
        Tuple::from_record(key, bytes.to_vec())
    }
}

impl std::fmt::Debug for TupleMerge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TupleMerge")
            .field("app", &self.app.name())
            .finish()
    }
}

impl MergeOperator for TupleMerge {
    fn name(&self) -> &str {
        "tuple"
    }

    fn full_merge(&self, key: &Key, base: Option<&[u8]>, delta: &[u8]) -> Result<Vec<u8>> {
        if let Some(rts) = decode_rts(delta) {
            let base = base.ok_or_else(|| {
                Error::merge(key, "read-timestamp refresh on an absent key")
            })?;
            let mut tuple = Self::parse_tuple(key, base, "stored record")?;
            let mut ts = tuple.timestamps();
            ts.rts = ts.rts.max(rts);
            tuple.set_timestamps(ts);
            return Ok(tuple.as_bytes().to_vec());
        }

        let update = Self::parse_tuple(key, delta, "update")?;
        let base_value = match base {
            Some(b) => Some(Self::parse_tuple(key, b, "stored record")?),
            None => None,
        };
        let merged = self.app.full_merge(
            key,
            base_value.as_ref().map(|t| t.value()),
            update.value(),
        )?;
        Ok(Tuple::new(update.timestamps(), &merged).as_bytes().to_vec())
    }

    fn partial_merge(&self, key: &Key, older: &[u8], newer: &[u8]) -> Result<Vec<u8>> {
        match (decode_rts(older), decode_rts(newer)) {
            (Some(a), Some(b)) => Ok(tictoc_core::timestamp::encode_rts(a.max(b)).to_vec()),
            (None, Some(rts)) => {
                let mut tuple = Self::parse_tuple(key, older, "update")?;
                let mut ts = tuple.timestamps();
                ts.rts = ts.rts.max(rts);
                tuple.set_timestamps(ts);
                Ok(tuple.as_bytes().to_vec())
            }
            (Some(_), None) => Ok(Self::parse_tuple(key, newer, "update")?.as_bytes().to_vec()),
            (None, None) => {
                let older = Self::parse_tuple(key, older, "update")?;
                let newer = Self::parse_tuple(key, newer, "update")?;
                let merged = self.app.partial_merge(key, older.value(), newer.value())?;
                Ok(Tuple::new(newer.timestamps(), &merged).as_bytes().to_vec())
            }
        }
    }
}

// Refresh deltas must never be mistaken for tuples.
const _: () = assert!(TIMESTAMP_SIZE < TUPLE_HEADER_SIZE);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tictoc_core::timestamp::encode_rts;
    use tictoc_core::TimestampSet;

    fn key() -> Key {
        Key::from("k")
    }

    #[test]
    fn test_replace_merge() {
        let m = ReplaceMerge;
        assert_eq!(m.full_merge(&key(), Some(b"old"), b"new").unwrap(), b"new");
        assert_eq!(m.partial_merge(&key(), b"a", b"b").unwrap(), b"b");
    }

    #[test]
    fn test_append_merge() {
        let m = AppendMerge;
        assert_eq!(m.full_merge(&key(), Some(b"ab"), b"cd").unwrap(), b"abcd");
        assert_eq!(m.full_merge(&key(), None, b"cd").unwrap(), b"cd");
        assert_eq!(m.partial_merge(&key(), b"x", b"y").unwrap(), b"xy");
    }

    #[test]
    fn test_counter_merge() {
        let m = CounterMerge;
        let v = m
            .full_merge(&key(), Some(&CounterMerge::encode(40)), &CounterMerge::encode(2))
            .unwrap();
        assert_eq!(CounterMerge::decode(&v), Some(42));

        let v = m.full_merge(&key(), None, &CounterMerge::encode(5)).unwrap();
        assert_eq!(CounterMerge::decode(&v), Some(5));
    }

    #[test]
    fn test_counter_merge_rejects_bad_width() {
        let err = CounterMerge.full_merge(&key(), None, b"abc").unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));
    }

    #[test]
    fn test_validate_operand() {
        assert!(CounterMerge.validate_operand(&key(), &CounterMerge::encode(1)).is_ok());
        assert!(matches!(
            CounterMerge.validate_operand(&key(), b"bad"),
            Err(Error::Merge { .. })
        ));
        assert!(ReplaceMerge.validate_operand(&key(), b"anything").is_ok());
        assert!(AppendMerge.validate_operand(&key(), b"").is_ok());
    }

    #[test]
    fn test_merge_operator_by_name() {
        assert_eq!(merge_operator_by_name("append").unwrap().name(), "append");
        assert_eq!(merge_operator_by_name("counter").unwrap().name(), "counter");
        assert!(merge_operator_by_name("nope").is_none());
    }

    #[test]
    fn test_tuple_merge_refresh_raises_rts() {
        let m = TupleMerge::new(Arc::new(ReplaceMerge));
        let base = Tuple::new(TimestampSet::new(3, 4), b"v");
        let out = m.full_merge(&key(), Some(base.as_bytes()), &encode_rts(9)).unwrap();
        let out = Tuple::from_record(&key(), out).unwrap();
        assert_eq!(out.timestamps(), TimestampSet::new(3, 9));
        assert_eq!(out.value(), b"v");
    }

    #[test]
    fn test_tuple_merge_refresh_never_lowers_rts() {
        let m = TupleMerge::new(Arc::new(ReplaceMerge));
        let base = Tuple::new(TimestampSet::new(3, 8), b"v");
        let out = m.full_merge(&key(), Some(base.as_bytes()), &encode_rts(5)).unwrap();
        assert_eq!(
            Tuple::from_record(&key(), out).unwrap().timestamps(),
            TimestampSet::new(3, 8)
        );
    }

    #[test]
    fn test_tuple_merge_refresh_on_absent_is_error() {
        let m = TupleMerge::new(Arc::new(ReplaceMerge));
        assert!(m.full_merge(&key(), None, &encode_rts(5)).is_err());
    }

    #[test]
    fn test_tuple_merge_update_uses_app_operator() {
        let m = TupleMerge::new(Arc::new(AppendMerge));
        let base = Tuple::new(TimestampSet::new(1, 1), b"ab");
        let delta = Tuple::new(TimestampSet::committed_at(2), b"cd");
        let out = m
            .full_merge(&key(), Some(base.as_bytes()), delta.as_bytes())
            .unwrap();
        let out = Tuple::from_record(&key(), out).unwrap();
        assert_eq!(out.timestamps(), TimestampSet::committed_at(2));
        assert_eq!(out.value(), b"abcd");
    }

    #[test]
    fn test_tuple_merge_rejects_odd_delta() {
        let m = TupleMerge::new(Arc::new(ReplaceMerge));
        let err = m.full_merge(&key(), None, &[0u8; 6]).unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));
    }

    #[test]
    fn test_tuple_partial_merge_shapes() {
        let m = TupleMerge::new(Arc::new(AppendMerge));
        let r = m.partial_merge(&key(), &encode_rts(3), &encode_rts(7)).unwrap();
        assert_eq!(decode_rts(&r), Some(7));

        let t = Tuple::new(TimestampSet::new(2, 2), b"x");
        let out = m.partial_merge(&key(), t.as_bytes(), &encode_rts(6)).unwrap();
        assert_eq!(
            Tuple::from_record(&key(), out).unwrap().timestamps(),
            TimestampSet::new(2, 6)
        );

        let t2 = Tuple::new(TimestampSet::new(5, 5), b"y");
        let out = m.partial_merge(&key(), t.as_bytes(), t2.as_bytes()).unwrap();
        let out = Tuple::from_record(&key(), out).unwrap();
        assert_eq!(out.timestamps(), TimestampSet::new(5, 5));
        assert_eq!(out.value(), b"xy");
    }

    proptest! {
        // Folding two deltas first must agree with applying them one by one.
        #[test]
        fn prop_counter_partial_merge_associates(base in any::<u64>(), a in any::<u64>(), b in any::<u64>()) {
            let m = CounterMerge;
            let k = key();
            let base = CounterMerge::encode(base);
            let (a, b) = (CounterMerge::encode(a), CounterMerge::encode(b));
            let stepwise = m.full_merge(&k, Some(&m.full_merge(&k, Some(&base), &a).unwrap()), &b).unwrap();
            let folded = m.full_merge(&k, Some(&base), &m.partial_merge(&k, &a, &b).unwrap()).unwrap();
            prop_assert_eq!(stepwise, folded);
        }

        #[test]
        fn prop_append_partial_merge_associates(base in proptest::collection::vec(any::<u8>(), 0..8),
                                                a in proptest::collection::vec(any::<u8>(), 0..8),
                                                b in proptest::collection::vec(any::<u8>(), 0..8)) {
            let m = AppendMerge;
            let k = key();
            let stepwise = m.full_merge(&k, Some(&m.full_merge(&k, Some(&base), &a).unwrap()), &b).unwrap();
            let folded = m.full_merge(&k, Some(&base), &m.partial_merge(&k, &a, &b).unwrap()).unwrap();
            prop_assert_eq!(stepwise, folded);
        }
    }
}

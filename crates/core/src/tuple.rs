//! Stored tuple layout
//!
//! Every value the transaction layer writes to storage is a tuple: a
//! [`TimestampSet`] header immediately followed by the application value.
//!
//! ```text
//! +---------+---------+------------------+
//! | wts u32 | rts u32 | value bytes ...  |
//! +---------+---------+------------------+
//! ```
//!
//! Total stored length is `TUPLE_HEADER_SIZE + value.len()`.

use crate::error::{Error, Result};
use crate::timestamp::{TimestampSet, TIMESTAMP_SET_SIZE};
use crate::types::Key;

/// Size of the header prefixed to every stored value
pub const TUPLE_HEADER_SIZE: usize = TIMESTAMP_SET_SIZE;

/// Owned tuple buffer: header + value
#[derive(Clone, PartialEq, Eq)]
pub struct Tuple {
    buf: Vec<u8>,
}

impl Tuple {
    /// Build a tuple from timestamps and a value
    pub fn new(ts: TimestampSet, value: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(TUPLE_HEADER_SIZE + value.len());
        buf.extend_from_slice(&ts.to_bytes());
        buf.extend_from_slice(value);
        Tuple { buf }
    }

    /// Build a tuple with a zero header, as buffered by local writes
    pub fn unstamped(value: &[u8]) -> Self {
        Self::new(TimestampSet::ZERO, value)
    }

    /// Wrap a record read from storage
    ///
    /// # Errors
    /// `Error::Corruption` if the record is shorter than the header.
    pub fn from_record(key: &Key, record: Vec<u8>) -> Result<Self> {
        if record.len() < TUPLE_HEADER_SIZE {
            return Err(Error::corruption(
                key,
                format!(
                    "record of {} bytes is shorter than the {}-byte tuple header",
                    record.len(),
                    TUPLE_HEADER_SIZE
                ),
            ));
        }
        Ok(Tuple { buf: record })
    }

    /// Header timestamps
    #[inline]
    pub fn timestamps(&self) -> TimestampSet {
        // Length is checked at construction
        TimestampSet::decode(&self.buf).unwrap_or_default()
    }

    /// Overwrite the header timestamps
    #[inline]
    pub fn set_timestamps(&mut self, ts: TimestampSet) {
        ts.encode(&mut self.buf[..TUPLE_HEADER_SIZE]);
    }

    /// Application value
    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.buf[TUPLE_HEADER_SIZE..]
    }

    /// Replace the application value, keeping the header
    pub fn set_value(&mut self, value: &[u8]) {
        self.buf.truncate(TUPLE_HEADER_SIZE);
        self.buf.extend_from_slice(value);
    }

    /// Header + value, as stored
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total stored length
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Always false: a tuple holds at least its header
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume and return the application value
    pub fn into_value(mut self) -> Vec<u8> {
        self.buf.drain(..TUPLE_HEADER_SIZE);
        self.buf
    }
}

impl std::fmt::Debug for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tuple")
            .field("ts", &self.timestamps())
            .field("value_len", &self.value().len())
            .finish()
    }
}

//! Per-record TicToc timestamps
//!
//! Every stored record version carries a `(wts, rts)` pair:
//! - `wts`: logical time the version was written
//! - `rts`: latest logical time the version is known to be valid for reads
//!
//! Invariant for versions present in storage: `rts >= wts`.

use byteorder::{ByteOrder, LittleEndian};

/// Logical timestamp
pub type Timestamp = u32;

/// Encoded size of a [`TimestampSet`]
pub const TIMESTAMP_SET_SIZE: usize = 8;

/// Encoded size of a lone read timestamp, as carried by a refresh delta
pub const TIMESTAMP_SIZE: usize = 4;

/// Write and read timestamp of one record version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimestampSet {
    /// Write timestamp
    pub wts: Timestamp,
    /// Read timestamp
    pub rts: Timestamp,
}

impl TimestampSet {
    /// Timestamps of a never-written key, and of buffered writes before commit
    pub const ZERO: TimestampSet = TimestampSet { wts: 0, rts: 0 };

    /// Create a timestamp set
    pub const fn new(wts: Timestamp, rts: Timestamp) -> Self {
        TimestampSet { wts, rts }
    }

    /// Timestamps stamped on a version committed at `ts`
    pub const fn committed_at(ts: Timestamp) -> Self {
        TimestampSet { wts: ts, rts: ts }
    }

    /// True when `rts >= wts`
    pub fn is_well_formed(&self) -> bool {
        self.rts >= self.wts
    }

    /// Encode as `wts` then `rts`, little-endian
    pub fn encode(&self, out: &mut [u8]) {
        LittleEndian::write_u32(&mut out[..TIMESTAMP_SIZE], self.wts);
        LittleEndian::write_u32(&mut out[TIMESTAMP_SIZE..TIMESTAMP_SET_SIZE], self.rts);
    }

    /// Decode from the first [`TIMESTAMP_SET_SIZE`] bytes, `None` if too short
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TIMESTAMP_SET_SIZE {
            return None;
        }
        Some(TimestampSet {
            wts: LittleEndian::read_u32(&bytes[..TIMESTAMP_SIZE]),
            rts: LittleEndian::read_u32(&bytes[TIMESTAMP_SIZE..TIMESTAMP_SET_SIZE]),
        })
    }

    /// Encoded form as an owned array
    pub fn to_bytes(&self) -> [u8; TIMESTAMP_SET_SIZE] {
        let mut out = [0u8; TIMESTAMP_SET_SIZE];
        self.encode(&mut out);
        out
    }
}

/// Encode a lone read timestamp (the storage-side refresh delta)
pub fn encode_rts(rts: Timestamp) -> [u8; TIMESTAMP_SIZE] {
    let mut out = [0u8; TIMESTAMP_SIZE];
    LittleEndian::write_u32(&mut out, rts);
    out
}

/// Decode a lone read timestamp
pub fn decode_rts(bytes: &[u8]) -> Option<Timestamp> {
    (bytes.len() == TIMESTAMP_SIZE).then(|| LittleEndian::read_u32(bytes))
}

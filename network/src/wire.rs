//! The frame format: a fixed 32-byte little-endian header followed by
//! `size` body bytes. The body carries `num_elems` field elements as
//! fixed-width big-endian byte strings, written from the last element to the
//! first so that deserialisation consumes from the tail of the buffer.

use num_bigint::BigUint;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Exact size of a serialised header.
pub const HEADER_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("header declares {declared} elements but the body holds {actual} bytes at width {width}")]
    LengthMismatch {
        declared: usize,
        actual: usize,
        width: usize,
    },
    #[error("{0} trailing bytes left in the body after deserialisation")]
    TrailingBytes(usize),
}

/// Wire header. Layout (little-endian, frozen):
///
/// ```text
/// offset  0  sid              u32
/// offset  4  sender_id        u32
/// offset  8  mixing_state_id  u16
/// offset 10  block_idx        u16
/// offset 12  tot_num_blocks   u16
/// offset 14  dimension        u16   1 = vector, 2 = vector of vectors
/// offset 16  num_elems        u16
/// offset 18  (padding)        u16
/// offset 20  size             u32   body length in bytes
/// offset 24  time             u64   ns since the epoch, set on send
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub sid: u32,
    pub sender_id: u32,
    pub mixing_state_id: u16,
    pub block_idx: u16,
    pub tot_num_blocks: u16,
    pub dimension: u16,
    pub num_elems: u16,
    pub size: u32,
    pub time_ns: u64,
}

impl MessageHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut b = [0u8; HEADER_LEN];
        b[0..4].copy_from_slice(&self.sid.to_le_bytes());
        b[4..8].copy_from_slice(&self.sender_id.to_le_bytes());
        b[8..10].copy_from_slice(&self.mixing_state_id.to_le_bytes());
        b[10..12].copy_from_slice(&self.block_idx.to_le_bytes());
        b[12..14].copy_from_slice(&self.tot_num_blocks.to_le_bytes());
        b[14..16].copy_from_slice(&self.dimension.to_le_bytes());
        b[16..18].copy_from_slice(&self.num_elems.to_le_bytes());
        b[20..24].copy_from_slice(&self.size.to_le_bytes());
        b[24..32].copy_from_slice(&self.time_ns.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8; HEADER_LEN]) -> Self {
        Self {
            sid: u32::from_le_bytes(b[0..4].try_into().expect("slice of length 4")),
            sender_id: u32::from_le_bytes(b[4..8].try_into().expect("slice of length 4")),
            mixing_state_id: u16::from_le_bytes(b[8..10].try_into().expect("slice of length 2")),
            block_idx: u16::from_le_bytes(b[10..12].try_into().expect("slice of length 2")),
            tot_num_blocks: u16::from_le_bytes(b[12..14].try_into().expect("slice of length 2")),
            dimension: u16::from_le_bytes(b[14..16].try_into().expect("slice of length 2")),
            num_elems: u16::from_le_bytes(b[16..18].try_into().expect("slice of length 2")),
            size: u32::from_le_bytes(b[20..24].try_into().expect("slice of length 4")),
            time_ns: u64::from_le_bytes(b[24..32].try_into().expect("slice of length 8")),
        }
    }

    /// Current wall clock in nanoseconds, for the opaque `time` field.
    pub fn now_ns() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub header: MessageHeader,
    pub body: Vec<u8>,
}

impl Frame {
    /// Total number of bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Appends the elements to the body, last element first, each as a
    /// `width`-byte big-endian string, and updates `num_elems` and `size`.
    pub fn push_elements(&mut self, elems: &[BigUint], width: usize) {
        self.header.num_elems = elems.len() as u16;
        for e in elems.iter().rev() {
            let bytes = e.to_bytes_be();
            debug_assert!(bytes.len() <= width);
            let pad = width - bytes.len();
            self.body.extend(std::iter::repeat(0u8).take(pad));
            self.body.extend_from_slice(&bytes);
        }
        self.header.size = self.body.len() as u32;
    }

    /// Consumes `num_elems` elements from the tail of the body, mirroring
    /// the send order, and shrinks the body in place.
    pub fn take_elements(&mut self, width: usize) -> Result<Vec<BigUint>, WireError> {
        let count = self.header.num_elems as usize;
        if self.body.len() < count * width {
            return Err(WireError::LengthMismatch {
                declared: count,
                actual: self.body.len(),
                width,
            });
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let at = self.body.len() - width;
            out.push(BigUint::from_bytes_be(&self.body[at..]));
            self.body.truncate(at);
        }
        self.header.size = self.body.len() as u32;
        Ok(out)
    }
}

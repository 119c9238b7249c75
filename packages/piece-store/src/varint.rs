//! Unsigned varints (LEB128), the length prefix of every block.
//!
//! Seven payload bits per byte, least significant group first, high bit set on
//! every byte except the last.

use bytes::{BufMut, Bytes, BytesMut};

/// Longest encoding of a `u64`.
pub const MAX_LEN: usize = 10;

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

pub fn encode(value: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(value));
    let mut rest = value;
    while rest >= 0x80 {
        buf.put_u8((rest as u8 & 0x7f) | 0x80);
        rest >>= 7;
    }
    buf.put_u8(rest as u8);
    buf.freeze()
}

/// Decode a varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` if `data`
/// ends mid-varint or the encoding overflows a `u64`.
pub fn decode(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, byte) in data.iter().take(MAX_LEN).enumerate() {
        let group = u64::from(byte & 0x7f);
        if i == MAX_LEN - 1 && group > 1 {
            return None;
        }
        value |= group << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

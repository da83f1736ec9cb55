//! Variable-length Integer Encoding (Varint)
//!
//! Every compact length, delta and count inside a v2 record is a varint.
//!
//! ## Varint Encoding
//! Base-128, low-order group first. Each byte carries 7 bits of data and uses the
//! high bit (`0x80`) as a continuation flag:
//! - 0-127 use 1 byte
//! - a full 64-bit value uses at most 10 bytes
//!
//! ## ZigZag Encoding (for signed integers)
//! Maps signed integers to unsigned so small negative numbers stay short:
//! - 0 → 0, -1 → 1, 1 → 2, -2 → 3, 2 → 4, etc.
//! - The "absent" length sentinel -1 encodes to the single byte `0x01`
//!
//! The mapping is computed on `i64` and reinterpreted as `u64`, so it is a
//! bijection on the full 64-bit domain including `i64::MIN` and `i64::MAX`.
//!
//! ## Bounds
//! Decoding stops after 10 bytes with `MalformedVarint` instead of looping or
//! shifting past 64 bits. Running off the end of the buffer is `TruncatedInput`.
//!
//! ## Usage
//! ```ignore
//! let mut buf = BytesMut::new();
//! encode_varint(&mut buf, -42)?;
//! let (value, next) = decode_varint_at(&buf, 0)?;
//! assert_eq!((value, next), (-42, 1));
//! ```

use bytes::{Buf, BufMut};

use crate::{Error, Result};

/// Longest possible encoding of a 64-bit value
pub const MAX_VARINT_LEN: usize = 10;

/// ZigZag-map a signed value onto the unsigned domain
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`]
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Encode a signed integer as a varint (ZigZag encoding)
///
/// Returns the number of bytes appended.
pub fn encode_varint(buf: &mut impl BufMut, value: i64) -> Result<usize> {
    encode_varint_u64(buf, zigzag_encode(value))
}

/// Encode an unsigned integer as a varint
///
/// The bytes are staged locally and appended only once the encoding is
/// complete, so `buf` is untouched on error.
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) -> Result<usize> {
    let mut scratch = [0u8; MAX_VARINT_LEN];

    for (i, slot) in scratch.iter_mut().enumerate() {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80; // Set continuation bit
        }

        *slot = byte;

        if value == 0 {
            buf.put_slice(&scratch[..=i]);
            return Ok(i + 1);
        }
    }

    Err(Error::EncodingOverflow)
}

/// Number of bytes [`encode_varint`] would produce for `value`
pub fn size_of_varint(value: i64) -> usize {
    size_of_varint_u64(zigzag_encode(value))
}

/// Number of bytes [`encode_varint_u64`] would produce for `value`
pub fn size_of_varint_u64(mut value: u64) -> usize {
    let mut size = 1;
    while value > 0x7F {
        value >>= 7;
        size += 1;
    }
    size
}

/// Decode a varint to a signed integer, advancing the cursor
pub fn decode_varint(buf: &mut impl Buf) -> Result<i64> {
    decode_varint_u64(buf).map(zigzag_decode)
}

/// Decode a varint to an unsigned integer, advancing the cursor
pub fn decode_varint_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;

    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(Error::truncated(1, 0));
        }

        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }

    Err(Error::MalformedVarint)
}

/// Decode a signed varint starting at `pos`
///
/// Returns the value and the position of the first byte after it.
pub fn decode_varint_at(data: &[u8], pos: usize) -> Result<(i64, usize)> {
    let mut cursor = data.get(pos..).ok_or_else(|| Error::truncated(1, 0))?;
    let available = cursor.len();
    let value = decode_varint(&mut cursor)?;
    Ok((value, pos + available - cursor.len()))
}

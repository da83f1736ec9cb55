//! Batch integrity checksums
//!
//! Two CRC-32 variants are in play:
//! - **CRC-32C (Castagnoli)** covers a magic 2 batch from `attributes` to the end
//!   of the record payload.
//! - **CRC-32 (ISO-HDLC)** covers each magic 0/1 message from `magic` to the end
//!   of its value.
//!
//! Both must match independently produced broker output bit for bit, so they are
//! delegated to the `crc32c` and `crc32fast` crates rather than hand-rolled.
//! Both are pure functions of their input.

/// CRC-32C (Castagnoli) checksum, as used by the magic 2 batch format
pub fn crc32c(data: &[u8]) -> u32 {
    ::crc32c::crc32c(data)
}

/// Standard CRC-32 (ISO-HDLC) checksum, as used by legacy messages
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

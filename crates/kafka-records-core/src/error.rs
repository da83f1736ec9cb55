//! Error Types for the record codecs
//!
//! Every codec operation returns `Result<T>`, aliased to `Result<T, Error>`, so
//! errors propagate with `?` from the varint layer up through batch decoding.
//!
//! ## Error Categories
//!
//! ### Truncation
//! - `TruncatedInput`: the buffer ended before a fixed-size field or varint was complete
//! - `TruncatedRecord`: a record's declared length or one of its spans runs past the buffer
//!
//! ### Malformed Data
//! - `MalformedVarint`: more than 10 continuation bytes (corrupt or hostile input)
//! - `InvalidRecord`: a record field holds a value the format cannot represent
//! - `InvalidBatch`: batch framing is internally inconsistent
//!
//! ### Integrity
//! - `ChecksumMismatch`: CRC disagreement; always fatal to the batch it covers
//!
//! ### Version/Compatibility
//! - `UnsupportedMagic`: format generation other than 0, 1 or 2
//! - `InvalidCompression`: attribute bits name no known compression kind
//! - `UnsupportedCompression`: known kind with no transform registered
//!
//! ### Compression
//! - `Compression` / `Decompression`: failures reported by a registered transform
//!
//! ### Misuse
//! - `WriterClosed`: append after the writer produced its batch
//! - `EncodingOverflow`: a varint would need more than 10 bytes (unreachable for 64-bit input)
//!
//! None of these are retryable by the codec: feeding the same bytes back in fails
//! the same way.

use thiserror::Error;

use crate::compression::CompressionType;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    #[error("Truncated record: {0}")]
    TruncatedRecord(String),

    #[error("Malformed varint: no terminating byte within 10 bytes")]
    MalformedVarint,

    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Unsupported magic byte: {0}")]
    UnsupportedMagic(i8),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(u8),

    #[error("Unsupported compression: no transform registered for {0}")]
    UnsupportedCompression(CompressionType),

    #[error("Writer is closed")]
    WriterClosed,

    #[error("Varint encoding overflow")]
    EncodingOverflow,

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),
}

impl Error {
    /// Build a `TruncatedInput` for a read of `needed` bytes against `remaining`
    pub fn truncated(needed: usize, remaining: usize) -> Self {
        Error::TruncatedInput { needed, remaining }
    }

    /// True for the truncation family, which a streaming caller may resolve by
    /// buffering more bytes before retrying.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Error::TruncatedInput { .. } | Error::TruncatedRecord(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

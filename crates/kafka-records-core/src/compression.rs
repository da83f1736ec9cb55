//! Compression kinds and the transform registry
//!
//! The batch codec never implements a compression algorithm. It records the kind
//! in the batch `attributes` (bits 0-2) and asks a [`CompressionRegistry`] for the
//! matching transform. A kind with no registered transform is an
//! `UnsupportedCompression` error, never a panic.
//!
//! ## Kinds
//! - **None** (0): payload passes through untouched
//! - **Gzip** (1): `flate2`
//! - **Snappy** (2): `snap`; raw blocks on write, raw or xerial-framed on read
//!   (the Java client frames snappy the way `snappy-java` does)
//! - **Lz4** (3): `lz4_flex` frame format
//! - **Zstd** (4): `zstd`
//!
//! ## Usage
//! ```ignore
//! let registry = CompressionRegistry::default(); // all four built-ins
//! let packed = registry.compress(CompressionType::Lz4, &payload)?;
//! let unpacked = registry.decompress(CompressionType::Lz4, &packed)?;
//!
//! // Or pick exactly which transforms a deployment allows
//! let registry = CompressionRegistry::empty().with(CompressionType::Gzip, GzipCodec::default());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Compression kind carried in the low three attribute bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionType {
    #[default]
    None = 0,
    Gzip = 1,
    Snappy = 2,
    Lz4 = 3,
    Zstd = 4,
}

impl CompressionType {
    /// Mask selecting the compression bits of a batch or message `attributes` field
    pub const ATTRIBUTE_MASK: u8 = 0x07;

    /// Every kind, in attribute-code order
    pub const ALL: [CompressionType; 5] = [
        CompressionType::None,
        CompressionType::Gzip,
        CompressionType::Snappy,
        CompressionType::Lz4,
        CompressionType::Zstd,
    ];

    /// Extract the kind from an `attributes` field
    pub fn from_attributes(attributes: i16) -> Result<Self> {
        Self::try_from((attributes as u8) & Self::ATTRIBUTE_MASK)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Snappy => "snappy",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

impl TryFrom<u8> for CompressionType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Gzip),
            2 => Ok(CompressionType::Snappy),
            3 => Ok(CompressionType::Lz4),
            4 => Ok(CompressionType::Zstd),
            _ => Err(Error::InvalidCompression(value)),
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CompressionType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown compression type '{s}'"))
    }
}

/// A byte-sequence transform pair for one compression kind
pub trait CompressionCodec: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Gzip via `flate2`
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: flate2::Compression,
}

impl GzipCodec {
    pub fn with_level(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

impl CompressionCodec for GzipCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(data)
            .map_err(|e| Error::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = flate2::read::GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::Decompression(e.to_string()))?;
        Ok(decompressed)
    }
}

/// Header written by `snappy-java`'s framed output stream
const XERIAL_MAGIC: [u8; 8] = [0x82, b'S', b'N', b'A', b'P', b'P', b'Y', 0];

/// Magic plus two big-endian i32 version fields
const XERIAL_HEADER_LEN: usize = 16;

/// Snappy via `snap`
#[derive(Debug, Clone, Copy, Default)]
pub struct SnappyCodec;

impl SnappyCodec {
    fn decompress_xerial(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = &data[XERIAL_HEADER_LEN..];
        let mut decoder = snap::raw::Decoder::new();
        let mut decompressed = Vec::new();

        while cursor.has_remaining() {
            if cursor.remaining() < 4 {
                return Err(Error::Decompression(
                    "Truncated xerial snappy chunk length".to_string(),
                ));
            }
            let chunk_len = cursor.get_u32() as usize;
            if cursor.remaining() < chunk_len {
                return Err(Error::Decompression(format!(
                    "Xerial snappy chunk of {} bytes exceeds remaining {}",
                    chunk_len,
                    cursor.remaining()
                )));
            }

            let chunk = &cursor[..chunk_len];
            let start = decompressed.len();
            let chunk_out = snap::raw::decompress_len(chunk)
                .map_err(|e| Error::Decompression(e.to_string()))?;
            decompressed.resize(start + chunk_out, 0);
            decoder
                .decompress(chunk, &mut decompressed[start..])
                .map_err(|e| Error::Decompression(e.to_string()))?;

            cursor.advance(chunk_len);
        }

        Ok(decompressed)
    }
}

impl CompressionCodec for SnappyCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() >= XERIAL_HEADER_LEN && data[..XERIAL_MAGIC.len()] == XERIAL_MAGIC {
            return self.decompress_xerial(data);
        }

        snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::Decompression(e.to_string()))
    }
}

/// LZ4 frame format via `lz4_flex`
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl CompressionCodec for Lz4Codec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
        encoder
            .write_all(data)
            .map_err(|e| Error::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = lz4_flex::frame::FrameDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::Decompression(e.to_string()))?;
        Ok(decompressed)
    }
}

/// Zstandard via `zstd`
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl CompressionCodec for ZstdCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level).map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| Error::Decompression(e.to_string()))
    }
}

/// Capability table from compression kind to transform
///
/// Cloning is cheap: codecs are shared behind `Arc`.
#[derive(Clone)]
pub struct CompressionRegistry {
    codecs: HashMap<CompressionType, Arc<dyn CompressionCodec>>,
}

impl CompressionRegistry {
    /// A registry that only supports uncompressed payloads
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register (or replace) the transform for `kind`
    ///
    /// `CompressionType::None` is always the identity and cannot be overridden.
    pub fn register(&mut self, kind: CompressionType, codec: impl CompressionCodec + 'static) {
        if kind == CompressionType::None {
            tracing::warn!("Ignoring codec registration for compression type none");
            return;
        }
        self.codecs.insert(kind, Arc::new(codec));
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, kind: CompressionType, codec: impl CompressionCodec + 'static) -> Self {
        self.register(kind, codec);
        self
    }

    /// Whether `kind` can be encoded and decoded
    pub fn supports(&self, kind: CompressionType) -> bool {
        kind == CompressionType::None || self.codecs.contains_key(&kind)
    }

    fn codec(&self, kind: CompressionType) -> Result<&Arc<dyn CompressionCodec>> {
        self.codecs
            .get(&kind)
            .ok_or(Error::UnsupportedCompression(kind))
    }

    pub fn compress(&self, kind: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
        if kind == CompressionType::None {
            return Ok(data.to_vec());
        }

        let compressed = self.codec(kind)?.compress(data)?;
        tracing::trace!(
            compression = %kind,
            input = data.len(),
            output = compressed.len(),
            "Compressed payload"
        );
        Ok(compressed)
    }

    pub fn decompress(&self, kind: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
        if kind == CompressionType::None {
            return Ok(data.to_vec());
        }

        let decompressed = self.codec(kind)?.decompress(data)?;
        tracing::trace!(
            compression = %kind,
            input = data.len(),
            output = decompressed.len(),
            "Decompressed payload"
        );
        Ok(decompressed)
    }
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        Self::empty()
            .with(CompressionType::Gzip, GzipCodec::default())
            .with(CompressionType::Snappy, SnappyCodec)
            .with(CompressionType::Lz4, Lz4Codec)
            .with(CompressionType::Zstd, ZstdCodec::default())
    }
}

impl fmt::Debug for CompressionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let supported: Vec<_> = CompressionType::ALL
            .into_iter()
            .filter(|kind| self.supports(*kind))
            .collect();
        f.debug_struct("CompressionRegistry")
            .field("supported", &supported)
            .finish()
    }
}

//! Kafka Record Format Codecs
//!
//! The leaf layer of the record format: everything that operates on a single
//! record or a byte transform, with no notion of batch framing.
//!
//! ## Modules
//!
//! - [`varint`]: zig-zag LEB128 integers used for every v2 record field
//! - [`checksum`]: CRC-32C for magic 2 batches, CRC-32 for magic 0/1 messages
//! - [`record`]: the v2 record body (deltas, nullable key/value, headers)
//! - [`compression`]: the compression kinds and a pluggable registry of transforms
//! - [`error`]: the shared [`Error`] type
//!
//! ## Example
//!
//! ```ignore
//! use bytes::{Bytes, BytesMut};
//! use kafka_records_core::record::{decode_record, encode_record};
//! use kafka_records_core::Record;
//!
//! let record = Record::new(0, 0, None, Some(Bytes::from("hello")));
//! let mut buf = BytesMut::new();
//! encode_record(&mut buf, &record)?;
//!
//! let (decoded, _) = decode_record(&buf.freeze(), 0)?;
//! assert_eq!(decoded, record);
//! ```

pub mod checksum;
pub mod compression;
pub mod error;
pub mod record;
pub mod varint;

pub use compression::{CompressionCodec, CompressionRegistry, CompressionType};
pub use error::{Error, Result};
pub use record::{Header, Record};

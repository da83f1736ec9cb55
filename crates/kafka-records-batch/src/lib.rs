//! Kafka Record Batches
//!
//! Framing for all three generations of the Kafka log format, plus a writer
//! and readers on top of it.
//!
//! ## Architecture
//!
//! ```text
//! RecordBatchWriter ──append──► Vec<Record> ──close──► encode_batch ──► Bytes
//!                                                         │
//!                                          magic 0/1 ◄────┴────► magic 2
//!                                          (legacy)             (default)
//!
//! Bytes ──► MemoryRecords ──next_batch──► RecordBatch ──into_records──► BatchRecord
//!                 ▲
//!         RecordBatchReader (flattens batches into records)
//! ```
//!
//! Checksums are verified when a batch is decoded, so a corrupt batch never
//! yields a record.
//!
//! Record payloads stay in `kafka_records_core`; this crate adds offsets,
//! timestamps, producer metadata and control records at the batch level.

pub mod batch;
pub mod config;
pub mod control;
pub mod reader;
pub mod writer;

pub use batch::{
    batch_size_at, decode_batch, encode_batch, BatchRecord, BatchRecords, EncodeOptions,
    ProducerMetadata, RecordBatch, TimestampType,
};
pub use config::WriterConfig;
pub use control::{ControlRecord, ControlRecordType, EndTransactionMarker};
pub use reader::{MemoryRecords, RecordBatchReader};
pub use writer::{RecordBatchWriter, RecordMetadata};

pub use kafka_records_core::{
    CompressionCodec, CompressionRegistry, CompressionType, Error, Header, Record, Result,
};

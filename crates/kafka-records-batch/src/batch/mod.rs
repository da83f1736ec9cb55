//! Record Batch Framing
//!
//! A record set on the wire is a sequence of self-delimiting entries. Every
//! generation of the format starts an entry with the same 17 bytes:
//!
//! ```text
//! offset/baseOffset    int64
//! size/batchLength     int32   bytes following this field
//! crc/partitionEpoch   4 bytes
//! magic                int8    at entry offset 16
//! ```
//!
//! so a reader can find the magic byte, pick a layout, and skip an entry it
//! cannot interpret without parsing its contents.
//!
//! ## Generations
//!
//! - **Magic 0/1** ([`legacy`]): one message per entry, CRC-32 per message. A
//!   compressed message wraps a whole inner message set as its value.
//! - **Magic 2** ([`default`]): one batch of delta-encoded records under a single
//!   CRC-32C, with producer metadata and attribute flags in the header.
//!
//! [`RecordBatch`] is the tagged union over both; [`decode_batch`] selects the arm
//! once from the magic byte.

pub mod default;
pub mod legacy;

use std::fmt;
use std::iter::FusedIterator;

use bytes::{Buf, BufMut, Bytes};
use kafka_records_core::{CompressionRegistry, CompressionType, Error, Header, Record, Result};
use serde::{Deserialize, Serialize};

use crate::control::ControlRecord;

pub use default::{DefaultBatch, DefaultBatchHeader, DefaultRecords};
pub use legacy::LegacyBatch;

pub const MAGIC_V0: i8 = 0;
pub const MAGIC_V1: i8 = 1;
pub const MAGIC_V2: i8 = 2;
pub const CURRENT_MAGIC: i8 = MAGIC_V2;

/// Offset (8 bytes) plus size (4 bytes) preceding every entry
pub const LOG_OVERHEAD: usize = 12;

/// Position of the magic byte inside every entry
pub const MAGIC_OFFSET: usize = 16;

pub const NO_TIMESTAMP: i64 = -1;
pub const NO_PRODUCER_ID: i64 = -1;
pub const NO_PRODUCER_EPOCH: i16 = -1;
pub const NO_SEQUENCE: i32 = -1;
pub const NO_PARTITION_LEADER_EPOCH: i32 = -1;

/// How the timestamps in a batch were assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampType {
    /// Set by the producer when the record was created
    #[default]
    CreateTime,
    /// Set by the broker when the batch was appended to the log
    LogAppendTime,
}

impl TimestampType {
    pub fn name(&self) -> &'static str {
        match self {
            TimestampType::CreateTime => "create_time",
            TimestampType::LogAppendTime => "log_append_time",
        }
    }
}

impl fmt::Display for TimestampType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Idempotent/transactional producer fields carried by magic 2 batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerMetadata {
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
}

impl ProducerMetadata {
    pub fn new(producer_id: i64, producer_epoch: i16, base_sequence: i32) -> Self {
        Self {
            producer_id,
            producer_epoch,
            base_sequence,
        }
    }

    /// True when no producer identity is attached
    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for ProducerMetadata {
    fn default() -> Self {
        Self {
            producer_id: NO_PRODUCER_ID,
            producer_epoch: NO_PRODUCER_EPOCH,
            base_sequence: NO_SEQUENCE,
        }
    }
}

/// Batch-level fields for [`encode_batch`]
///
/// Record offsets and timestamps are deltas against `base_offset` and
/// `base_timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub magic: i8,
    pub base_offset: i64,
    pub base_timestamp: i64,
    pub partition_leader_epoch: i32,
    pub compression: CompressionType,
    pub timestamp_type: TimestampType,
    pub producer: ProducerMetadata,
    pub transactional: bool,
    pub control: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            magic: CURRENT_MAGIC,
            base_offset: 0,
            base_timestamp: NO_TIMESTAMP,
            partition_leader_epoch: NO_PARTITION_LEADER_EPOCH,
            compression: CompressionType::None,
            timestamp_type: TimestampType::CreateTime,
            producer: ProducerMetadata::default(),
            transactional: false,
            control: false,
        }
    }
}

/// Smallest legal value of the size field for an entry of the given magic
pub fn min_entry_size(magic: i8) -> Result<usize> {
    match magic {
        MAGIC_V0 => Ok(legacy::MESSAGE_OVERHEAD_V0),
        MAGIC_V1 => Ok(legacy::MESSAGE_OVERHEAD_V1),
        MAGIC_V2 => Ok(default::HEADER_LEN - LOG_OVERHEAD),
        other => Err(Error::UnsupportedMagic(other)),
    }
}

/// Total length of the entry starting at `pos`
///
/// Returns `Ok(None)` when the buffer ends before the entry does, so a caller
/// holding a partial fetch response can wait for more bytes.
pub fn batch_size_at(data: &[u8], pos: usize) -> Result<Option<usize>> {
    let remaining = data.len().saturating_sub(pos);
    if remaining < LOG_OVERHEAD {
        return Ok(None);
    }

    let declared = (&data[pos + 8..pos + LOG_OVERHEAD]).get_i32();
    if declared < 0 {
        return Err(Error::InvalidBatch(format!(
            "negative entry size {} at position {}",
            declared, pos
        )));
    }
    let declared = declared as usize;

    let min = if remaining > MAGIC_OFFSET {
        min_entry_size(data[pos + MAGIC_OFFSET] as i8)?
    } else {
        legacy::MESSAGE_OVERHEAD_V0
    };
    if declared < min {
        return Err(Error::InvalidBatch(format!(
            "entry size {} below minimum {} at position {}",
            declared, min, pos
        )));
    }

    let total = LOG_OVERHEAD + declared;
    if remaining < total {
        return Ok(None);
    }
    Ok(Some(total))
}

/// Offset following a batch whose last record sits `last_delta` past `base_offset`
///
/// Both the last offset and its successor must fit in an `i64`.
pub(crate) fn checked_next_offset(base_offset: i64, last_delta: i64) -> Result<i64> {
    base_offset
        .checked_add(last_delta)
        .and_then(|last| last.checked_add(1))
        .ok_or_else(|| {
            Error::InvalidBatch(format!(
                "offset delta {} past base offset {} overflows",
                last_delta, base_offset
            ))
        })
}

/// Encode `records` as one batch in the generation named by `options.magic`
///
/// Returns the number of bytes appended. Nothing is appended on error.
pub fn encode_batch(
    buf: &mut impl BufMut,
    records: &[Record],
    options: &EncodeOptions,
    registry: &CompressionRegistry,
) -> Result<usize> {
    match options.magic {
        MAGIC_V0 | MAGIC_V1 => legacy::encode_batch(buf, records, options, registry),
        MAGIC_V2 => default::encode_batch(buf, records, options, registry),
        other => Err(Error::UnsupportedMagic(other)),
    }
}

/// Decode the entry starting at `pos`
///
/// Checksums are verified here, before any record can be pulled. Returns the
/// batch and the position of the next entry.
pub fn decode_batch(
    data: &Bytes,
    pos: usize,
    registry: &CompressionRegistry,
) -> Result<(RecordBatch, usize)> {
    let remaining = data.len().saturating_sub(pos);
    if remaining <= MAGIC_OFFSET {
        return Err(Error::truncated(MAGIC_OFFSET + 1, remaining));
    }

    match data[pos + MAGIC_OFFSET] as i8 {
        MAGIC_V0 | MAGIC_V1 => {
            let (batch, next) = legacy::decode_batch(data, pos, registry)?;
            Ok((RecordBatch::Legacy(batch), next))
        }
        MAGIC_V2 => {
            let (batch, next) = default::decode_batch(data, pos, registry)?;
            Ok((RecordBatch::Default(batch), next))
        }
        other => Err(Error::UnsupportedMagic(other)),
    }
}

/// One decoded entry of either generation
#[derive(Debug, Clone)]
pub enum RecordBatch {
    Legacy(LegacyBatch),
    Default(DefaultBatch),
}

impl RecordBatch {
    pub fn magic(&self) -> i8 {
        match self {
            RecordBatch::Legacy(batch) => batch.magic(),
            RecordBatch::Default(batch) => batch.header().magic,
        }
    }

    pub fn base_offset(&self) -> i64 {
        match self {
            RecordBatch::Legacy(batch) => batch.base_offset(),
            RecordBatch::Default(batch) => batch.header().base_offset,
        }
    }

    pub fn last_offset(&self) -> i64 {
        match self {
            RecordBatch::Legacy(batch) => batch.last_offset(),
            RecordBatch::Default(batch) => batch.header().last_offset(),
        }
    }

    pub fn next_offset(&self) -> i64 {
        self.last_offset().wrapping_add(1)
    }

    /// Attribute bits of the batch header, or of the wrapper message for legacy entries
    pub fn attributes(&self) -> i16 {
        match self {
            RecordBatch::Legacy(batch) => i16::from(batch.attributes()),
            RecordBatch::Default(batch) => batch.header().attributes,
        }
    }

    pub fn compression(&self) -> CompressionType {
        match self {
            RecordBatch::Legacy(batch) => batch.compression(),
            RecordBatch::Default(batch) => batch.compression(),
        }
    }

    pub fn timestamp_type(&self) -> TimestampType {
        match self {
            RecordBatch::Legacy(batch) => batch.timestamp_type(),
            RecordBatch::Default(batch) => batch.header().timestamp_type(),
        }
    }

    pub fn max_timestamp(&self) -> i64 {
        match self {
            RecordBatch::Legacy(batch) => batch.max_timestamp(),
            RecordBatch::Default(batch) => batch.header().max_timestamp,
        }
    }

    pub fn is_control(&self) -> bool {
        match self {
            RecordBatch::Legacy(_) => false,
            RecordBatch::Default(batch) => batch.header().is_control(),
        }
    }

    pub fn is_transactional(&self) -> bool {
        match self {
            RecordBatch::Legacy(_) => false,
            RecordBatch::Default(batch) => batch.header().is_transactional(),
        }
    }

    /// Stored checksum (the wrapper's CRC-32 for legacy entries)
    pub fn checksum(&self) -> u32 {
        match self {
            RecordBatch::Legacy(batch) => batch.crc(),
            RecordBatch::Default(batch) => batch.header().crc,
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            RecordBatch::Legacy(batch) => batch.records().len(),
            RecordBatch::Default(batch) => batch.header().record_count as usize,
        }
    }

    /// Encoded length of the entry, including the offset and size fields
    pub fn size_in_bytes(&self) -> usize {
        match self {
            RecordBatch::Legacy(batch) => batch.size_in_bytes(),
            RecordBatch::Default(batch) => batch.header().size_in_bytes(),
        }
    }

    /// Consume the batch into its records, in offset order
    pub fn into_records(self) -> BatchRecords {
        match self {
            RecordBatch::Legacy(batch) => BatchRecords::Legacy(batch.into_records().into_iter()),
            RecordBatch::Default(batch) => BatchRecords::Default(batch.into_records()),
        }
    }
}

/// A record with its offset and timestamp resolved against its batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    pub offset: i64,
    pub timestamp: i64,
    pub timestamp_type: TimestampType,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
    pub is_control: bool,
}

impl BatchRecord {
    /// The control record key, when this record belongs to a control batch
    pub fn control(&self) -> Result<Option<ControlRecord>> {
        if !self.is_control {
            return Ok(None);
        }
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| Error::InvalidRecord("control record without key".to_string()))?;
        ControlRecord::parse(key).map(Some)
    }
}

/// Records of one batch, pulled one at a time
#[derive(Debug)]
pub enum BatchRecords {
    Legacy(std::vec::IntoIter<BatchRecord>),
    Default(DefaultRecords),
}

impl Iterator for BatchRecords {
    type Item = Result<BatchRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            BatchRecords::Legacy(records) => records.next().map(Ok),
            BatchRecords::Default(records) => records.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            BatchRecords::Legacy(records) => records.size_hint(),
            BatchRecords::Default(records) => records.size_hint(),
        }
    }
}

impl FusedIterator for BatchRecords {}

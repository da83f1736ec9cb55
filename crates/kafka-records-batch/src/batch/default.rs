//! Magic 2 Record Batch
//!
//! ## Layout
//!
//! ```text
//! offset  field                 type
//! 0       baseOffset            int64
//! 8       batchLength           int32   total length - 12
//! 12      partitionLeaderEpoch  int32
//! 16      magic                 int8    = 2
//! 17      crc                   uint32  CRC-32C over bytes 21..end
//! 21      attributes            int16
//! 23      lastOffsetDelta       int32
//! 27      baseTimestamp         int64
//! 35      maxTimestamp          int64
//! 43      producerId            int64
//! 51      producerEpoch         int16
//! 53      baseSequence          int32
//! 57      recordCount           int32
//! 61      records               (possibly compressed)
//! ```
//!
//! ## Attributes
//!
//! ```text
//! bits 0-2  compression (0 none, 1 gzip, 2 snappy, 3 lz4, 4 zstd)
//! bit  3    timestamp type (1 = log append time)
//! bit  4    transactional
//! bit  5    control
//! ```
//!
//! The CRC covers the compressed payload, so it is verified before anything is
//! decompressed.

use std::iter::FusedIterator;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use kafka_records_core::checksum::crc32c;
use kafka_records_core::record::{decode_record, encode_record};
use kafka_records_core::{CompressionRegistry, CompressionType, Error, Record, Result};
use serde::{Deserialize, Serialize};

use super::{
    checked_next_offset, BatchRecord, EncodeOptions, ProducerMetadata, TimestampType,
    LOG_OVERHEAD, MAGIC_V2,
};

pub const HEADER_LEN: usize = 61;
pub const PARTITION_LEADER_EPOCH_OFFSET: usize = 12;
pub const CRC_OFFSET: usize = 17;
pub const ATTRIBUTES_OFFSET: usize = 21;
pub const RECORDS_OFFSET: usize = HEADER_LEN;

pub const COMPRESSION_CODEC_MASK: i16 = 0x07;
pub const TIMESTAMP_TYPE_MASK: i16 = 0x08;
pub const TRANSACTIONAL_FLAG_MASK: i16 = 0x10;
pub const CONTROL_FLAG_MASK: i16 = 0x20;

/// Compose the attributes field
pub fn attributes(
    compression: CompressionType,
    timestamp_type: TimestampType,
    transactional: bool,
    control: bool,
) -> i16 {
    let mut attributes = compression as i16;
    if timestamp_type == TimestampType::LogAppendTime {
        attributes |= TIMESTAMP_TYPE_MASK;
    }
    if transactional {
        attributes |= TRANSACTIONAL_FLAG_MASK;
    }
    if control {
        attributes |= CONTROL_FLAG_MASK;
    }
    attributes
}

/// Fixed-size header of a magic 2 batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultBatchHeader {
    pub base_offset: i64,
    pub batch_length: i32,
    pub partition_leader_epoch: i32,
    pub magic: i8,
    pub crc: u32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub base_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    pub record_count: i32,
}

impl DefaultBatchHeader {
    /// Parse the header from the first [`HEADER_LEN`] bytes of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::truncated(HEADER_LEN, data.len()));
        }

        let mut buf = &data[..HEADER_LEN];
        Ok(Self {
            base_offset: buf.get_i64(),
            batch_length: buf.get_i32(),
            partition_leader_epoch: buf.get_i32(),
            magic: buf.get_i8(),
            crc: buf.get_u32(),
            attributes: buf.get_i16(),
            last_offset_delta: buf.get_i32(),
            base_timestamp: buf.get_i64(),
            max_timestamp: buf.get_i64(),
            producer_id: buf.get_i64(),
            producer_epoch: buf.get_i16(),
            base_sequence: buf.get_i32(),
            record_count: buf.get_i32(),
        })
    }

    fn write(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.base_offset);
        buf.put_i32(self.batch_length);
        buf.put_i32(self.partition_leader_epoch);
        buf.put_i8(self.magic);
        buf.put_u32(self.crc);
        buf.put_i16(self.attributes);
        buf.put_i32(self.last_offset_delta);
        buf.put_i64(self.base_timestamp);
        buf.put_i64(self.max_timestamp);
        buf.put_i64(self.producer_id);
        buf.put_i16(self.producer_epoch);
        buf.put_i32(self.base_sequence);
        buf.put_i32(self.record_count);
    }

    pub fn compression(&self) -> Result<CompressionType> {
        CompressionType::from_attributes(self.attributes)
    }

    pub fn timestamp_type(&self) -> TimestampType {
        if self.attributes & TIMESTAMP_TYPE_MASK != 0 {
            TimestampType::LogAppendTime
        } else {
            TimestampType::CreateTime
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.attributes & TRANSACTIONAL_FLAG_MASK != 0
    }

    pub fn is_control(&self) -> bool {
        self.attributes & CONTROL_FLAG_MASK != 0
    }

    pub fn producer(&self) -> ProducerMetadata {
        ProducerMetadata::new(self.producer_id, self.producer_epoch, self.base_sequence)
    }

    /// Offset of the last record
    ///
    /// [`decode_batch`] rejects headers where this or [`next_offset`](Self::next_offset)
    /// would leave the `i64` range; a header built by [`parse`](Self::parse) alone wraps.
    pub fn last_offset(&self) -> i64 {
        self.base_offset.wrapping_add(i64::from(self.last_offset_delta))
    }

    pub fn next_offset(&self) -> i64 {
        self.last_offset().wrapping_add(1)
    }

    /// Total encoded length, including baseOffset and batchLength
    pub fn size_in_bytes(&self) -> usize {
        LOG_OVERHEAD + self.batch_length as usize
    }
}

/// Encode a magic 2 batch
///
/// The batch is staged in its own buffer and copied to `buf` once the length
/// and CRC are patched in, so `buf` is untouched on error.
pub fn encode_batch(
    buf: &mut impl BufMut,
    records: &[Record],
    options: &EncodeOptions,
    registry: &CompressionRegistry,
) -> Result<usize> {
    let record_count = i32::try_from(records.len())
        .map_err(|_| Error::InvalidBatch(format!("{} records in one batch", records.len())))?;

    // Encode each record, then compress the whole payload
    let mut payload = BytesMut::new();
    for record in records {
        encode_record(&mut payload, record)?;
    }
    let payload_len = payload.len();
    let payload = match options.compression {
        CompressionType::None => payload.freeze(),
        kind => Bytes::from(registry.compress(kind, &payload)?),
    };

    let last_offset_delta = records.last().map(|r| r.offset_delta).unwrap_or(-1);
    let max_offset_delta = records.iter().map(|r| r.offset_delta).max().unwrap_or(-1);
    checked_next_offset(options.base_offset, i64::from(max_offset_delta))?;
    let max_timestamp = match options.timestamp_type {
        TimestampType::LogAppendTime => options.base_timestamp,
        TimestampType::CreateTime => records
            .iter()
            .map(|r| options.base_timestamp.wrapping_add(r.timestamp_delta))
            .max()
            .unwrap_or(options.base_timestamp),
    };

    let batch_length = i32::try_from(HEADER_LEN - LOG_OVERHEAD + payload.len()).map_err(|_| {
        Error::InvalidBatch(format!("batch payload of {} bytes too large", payload.len()))
    })?;

    let mut header = DefaultBatchHeader {
        base_offset: options.base_offset,
        batch_length,
        partition_leader_epoch: options.partition_leader_epoch,
        magic: MAGIC_V2,
        crc: 0,
        attributes: attributes(
            options.compression,
            options.timestamp_type,
            options.transactional,
            options.control,
        ),
        last_offset_delta,
        base_timestamp: options.base_timestamp,
        max_timestamp,
        producer_id: options.producer.producer_id,
        producer_epoch: options.producer.producer_epoch,
        base_sequence: options.producer.base_sequence,
        record_count,
    };

    let mut batch = BytesMut::with_capacity(HEADER_LEN + payload.len());
    header.write(&mut batch);
    batch.put_slice(&payload);

    // CRC-32C (Castagnoli) over attributes..end
    header.crc = crc32c(&batch[ATTRIBUTES_OFFSET..]);
    batch[CRC_OFFSET..ATTRIBUTES_OFFSET].copy_from_slice(&header.crc.to_be_bytes());

    tracing::debug!(
        base_offset = header.base_offset,
        records = record_count,
        compression = %options.compression,
        uncompressed = payload_len,
        size = batch.len(),
        "Encoded record batch"
    );

    buf.put_slice(&batch);
    Ok(batch.len())
}

/// Decode and validate the magic 2 batch starting at `pos`
pub fn decode_batch(
    data: &Bytes,
    pos: usize,
    registry: &CompressionRegistry,
) -> Result<(DefaultBatch, usize)> {
    let input = data.get(pos..).unwrap_or_default();
    let header = DefaultBatchHeader::parse(input)?;

    if header.magic != MAGIC_V2 {
        return Err(Error::UnsupportedMagic(header.magic));
    }
    if header.batch_length < (HEADER_LEN - LOG_OVERHEAD) as i32 {
        return Err(Error::InvalidBatch(format!(
            "batch length {} shorter than header",
            header.batch_length
        )));
    }
    let size = header.size_in_bytes();
    if input.len() < size {
        return Err(Error::truncated(size, input.len()));
    }

    let computed = crc32c(&input[ATTRIBUTES_OFFSET..size]);
    if computed != header.crc {
        tracing::warn!(
            base_offset = header.base_offset,
            stored = header.crc,
            computed,
            "Record batch checksum mismatch"
        );
        return Err(Error::ChecksumMismatch {
            stored: header.crc,
            computed,
        });
    }

    if header.record_count < 0 {
        return Err(Error::InvalidBatch(format!(
            "negative record count {}",
            header.record_count
        )));
    }

    checked_next_offset(header.base_offset, i64::from(header.last_offset_delta))?;

    let compression = header.compression()?;
    let raw = data.slice(pos + RECORDS_OFFSET..pos + size);
    let payload = match compression {
        CompressionType::None => raw,
        kind => Bytes::from(registry.decompress(kind, &raw)?),
    };

    tracing::debug!(
        base_offset = header.base_offset,
        records = header.record_count,
        compression = %compression,
        size,
        "Decoded record batch"
    );

    Ok((
        DefaultBatch {
            header,
            compression,
            payload,
        },
        pos + size,
    ))
}

/// A validated magic 2 batch with its payload decompressed
#[derive(Debug, Clone)]
pub struct DefaultBatch {
    header: DefaultBatchHeader,
    compression: CompressionType,
    payload: Bytes,
}

impl DefaultBatch {
    pub fn header(&self) -> &DefaultBatchHeader {
        &self.header
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Uncompressed record bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the batch into a lazy, single-pass record sequence
    pub fn into_records(self) -> DefaultRecords {
        DefaultRecords {
            header: self.header,
            payload: self.payload,
            pos: 0,
            remaining: self.header.record_count.max(0) as usize,
            done: false,
        }
    }
}

/// Lazy record sequence over one batch's payload
///
/// Yields at most `record_count` records. A payload that ends early or has bytes
/// left over after the last record ends the sequence with an error.
#[derive(Debug)]
pub struct DefaultRecords {
    header: DefaultBatchHeader,
    payload: Bytes,
    pos: usize,
    remaining: usize,
    done: bool,
}

impl DefaultRecords {
    fn resolve(&self, record: Record) -> Result<BatchRecord> {
        let timestamp_type = self.header.timestamp_type();
        let timestamp = match timestamp_type {
            TimestampType::LogAppendTime => self.header.max_timestamp,
            TimestampType::CreateTime => self
                .header
                .base_timestamp
                .wrapping_add(record.timestamp_delta),
        };

        let offset = self
            .header
            .base_offset
            .checked_add(i64::from(record.offset_delta))
            .ok_or_else(|| {
                Error::InvalidRecord(format!(
                    "offset delta {} past base offset {} overflows",
                    record.offset_delta, self.header.base_offset
                ))
            })?;

        Ok(BatchRecord {
            offset,
            timestamp,
            timestamp_type,
            key: record.key,
            value: record.value,
            headers: record.headers,
            is_control: self.header.is_control(),
        })
    }
}

impl Iterator for DefaultRecords {
    type Item = Result<BatchRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.remaining == 0 {
            self.done = true;
            if self.pos != self.payload.len() {
                return Some(Err(Error::InvalidBatch(format!(
                    "{} bytes after the last of {} records",
                    self.payload.len() - self.pos,
                    self.header.record_count
                ))));
            }
            return None;
        }

        if self.pos >= self.payload.len() {
            self.done = true;
            return Some(Err(Error::TruncatedRecord(format!(
                "batch declares {} records but payload ends after {}",
                self.header.record_count,
                self.header.record_count as usize - self.remaining
            ))));
        }

        match decode_record(&self.payload, self.pos) {
            Ok((record, next)) => {
                self.pos = next;
                self.remaining -= 1;
                tracing::trace!(
                    offset_delta = record.offset_delta,
                    next,
                    "Decoded record"
                );
                let resolved = self.resolve(record);
                self.done = resolved.is_err();
                Some(resolved)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.remaining + 1))
        }
    }
}

impl FusedIterator for DefaultRecords {}

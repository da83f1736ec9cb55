//! Magic 0/1 Message Sets
//!
//! ## Log Entry Layout
//!
//! ```text
//! offset       int64
//! messageSize  int32   bytes following this field
//! crc          uint32  CRC-32 over magic..end of value
//! magic        int8    0 or 1
//! attributes   int8    bits 0-2 compression, bit 3 timestamp type (magic 1)
//! timestamp    int64   magic 1 only
//! key          int32 length (-1 = null) + bytes
//! value        int32 length (-1 = null) + bytes
//! ```
//!
//! ## Compression
//!
//! A compressed entry is a wrapper message whose value is a whole compressed
//! message set. Nesting is one level deep: an inner message that is itself
//! compressed is rejected.
//!
//! With magic 1 the inner offsets are relative. The wrapper carries the absolute
//! offset of the last inner message, so
//! `absolute = wrapper_offset - last_inner_offset + inner_offset`.
//! With magic 0 inner offsets are already absolute.
//!
//! Every inner message is CRC-checked before any record of the entry is
//! returned.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use kafka_records_core::checksum::crc32;
use kafka_records_core::{CompressionRegistry, CompressionType, Error, Record, Result};

use super::{
    checked_next_offset, BatchRecord, EncodeOptions, TimestampType, LOG_OVERHEAD, MAGIC_OFFSET,
    MAGIC_V0, MAGIC_V1, NO_TIMESTAMP,
};

const CRC_LENGTH: usize = 4;
const MAGIC_LENGTH: usize = 1;
const ATTRIBUTES_LENGTH: usize = 1;
const TIMESTAMP_LENGTH: usize = 8;
const KEY_SIZE_LENGTH: usize = 4;
const VALUE_SIZE_LENGTH: usize = 4;

/// Smallest magic 0 message: crc, magic, attributes, key size, value size
pub const MESSAGE_OVERHEAD_V0: usize =
    CRC_LENGTH + MAGIC_LENGTH + ATTRIBUTES_LENGTH + KEY_SIZE_LENGTH + VALUE_SIZE_LENGTH;

/// Magic 1 adds the timestamp
pub const MESSAGE_OVERHEAD_V1: usize = MESSAGE_OVERHEAD_V0 + TIMESTAMP_LENGTH;

pub const COMPRESSION_CODEC_MASK: i8 = 0x07;
pub const TIMESTAMP_TYPE_MASK: i8 = 0x08;

fn message_overhead(magic: i8) -> Result<usize> {
    match magic {
        MAGIC_V0 => Ok(MESSAGE_OVERHEAD_V0),
        MAGIC_V1 => Ok(MESSAGE_OVERHEAD_V1),
        other => Err(Error::UnsupportedMagic(other)),
    }
}

/// One CRC-verified log entry
#[derive(Debug)]
struct Message {
    offset: i64,
    crc: u32,
    magic: i8,
    attributes: i8,
    timestamp: i64,
    key: Option<Bytes>,
    value: Option<Bytes>,
}

impl Message {
    fn compression(&self) -> Result<CompressionType> {
        CompressionType::try_from((self.attributes & COMPRESSION_CODEC_MASK) as u8)
    }
}

fn read_nullable(data: &Bytes, at: &mut usize, end: usize, field: &str) -> Result<Option<Bytes>> {
    if end - *at < 4 {
        return Err(Error::TruncatedRecord(format!(
            "message ends inside {} length",
            field
        )));
    }
    let len = (&data[*at..*at + 4]).get_i32();
    *at += 4;

    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(Error::InvalidRecord(format!(
            "negative {} length {}",
            field, len
        )));
    }
    let len = len as usize;
    if end - *at < len {
        return Err(Error::TruncatedRecord(format!(
            "{} of {} bytes exceeds message end",
            field, len
        )));
    }
    let bytes = data.slice(*at..*at + len);
    *at += len;
    Ok(Some(bytes))
}

/// Read and verify the entry at `pos`, returning it and the next position
fn read_message(data: &Bytes, pos: usize) -> Result<(Message, usize)> {
    let input = data.get(pos..).unwrap_or_default();
    if input.len() < LOG_OVERHEAD {
        return Err(Error::truncated(LOG_OVERHEAD, input.len()));
    }

    let mut buf = input;
    let offset = buf.get_i64();
    let size = buf.get_i32();
    if size < MESSAGE_OVERHEAD_V0 as i32 {
        return Err(Error::InvalidBatch(format!(
            "message size {} below minimum {}",
            size, MESSAGE_OVERHEAD_V0
        )));
    }
    let total = LOG_OVERHEAD + size as usize;
    if input.len() < total {
        return Err(Error::truncated(total, input.len()));
    }

    let crc = buf.get_u32();
    let computed = crc32(&input[MAGIC_OFFSET..total]);
    if computed != crc {
        tracing::warn!(
            offset,
            stored = crc,
            computed,
            "Legacy message checksum mismatch"
        );
        return Err(Error::ChecksumMismatch {
            stored: crc,
            computed,
        });
    }

    let magic = buf.get_i8();
    let overhead = message_overhead(magic)?;
    if (size as usize) < overhead {
        return Err(Error::InvalidBatch(format!(
            "message size {} below minimum {} for magic {}",
            size, overhead, magic
        )));
    }

    let attributes = buf.get_i8();
    let timestamp = if magic == MAGIC_V1 {
        buf.get_i64()
    } else {
        NO_TIMESTAMP
    };

    let end = pos + total;
    let mut at = pos + (input.len() - buf.remaining());
    let key = read_nullable(data, &mut at, end, "key")?;
    let value = read_nullable(data, &mut at, end, "value")?;
    if at != end {
        return Err(Error::InvalidRecord(format!(
            "{} trailing bytes after message value",
            end - at
        )));
    }

    Ok((
        Message {
            offset,
            crc,
            magic,
            attributes,
            timestamp,
            key,
            value,
        },
        end,
    ))
}

fn write_nullable(buf: &mut BytesMut, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            buf.put_i32(b.len() as i32);
            buf.put_slice(b);
        }
        None => buf.put_i32(-1),
    }
}

/// Append one log entry, computing its size and CRC
fn write_message(
    buf: &mut BytesMut,
    offset: i64,
    magic: i8,
    attributes: i8,
    timestamp: i64,
    key: Option<&[u8]>,
    value: Option<&[u8]>,
) -> Result<()> {
    let key_len = key.map(<[u8]>::len).unwrap_or(0);
    let value_len = value.map(<[u8]>::len).unwrap_or(0);
    let size = message_overhead(magic)? + key_len + value_len;
    let size = i32::try_from(size)
        .map_err(|_| Error::InvalidRecord(format!("message of {} bytes too large", size)))?;

    buf.put_i64(offset);
    buf.put_i32(size);
    let crc_pos = buf.len();
    buf.put_u32(0);
    buf.put_i8(magic);
    buf.put_i8(attributes);
    if magic == MAGIC_V1 {
        buf.put_i64(timestamp);
    }
    write_nullable(buf, key);
    write_nullable(buf, value);

    let crc = crc32(&buf[crc_pos + CRC_LENGTH..]);
    buf[crc_pos..crc_pos + CRC_LENGTH].copy_from_slice(&crc.to_be_bytes());
    Ok(())
}

/// Encode records as a magic 0 or 1 message set
///
/// Uncompressed records become one entry each. With compression the records
/// become a single wrapper entry. Headers and producer fields cannot be
/// represented and are rejected.
pub fn encode_batch(
    buf: &mut impl BufMut,
    records: &[Record],
    options: &EncodeOptions,
    registry: &CompressionRegistry,
) -> Result<usize> {
    let magic = options.magic;
    message_overhead(magic)?;

    if options.transactional || options.control || !options.producer.is_unset() {
        return Err(Error::InvalidBatch(format!(
            "producer, transactional and control fields need magic 2, got magic {}",
            magic
        )));
    }
    if let Some(record) = records.iter().find(|r| !r.headers.is_empty()) {
        return Err(Error::InvalidRecord(format!(
            "record at offset delta {} has headers, which need magic 2",
            record.offset_delta
        )));
    }
    if records.is_empty() {
        return Ok(0);
    }
    let max_offset_delta = records.iter().map(|r| r.offset_delta).max().unwrap_or(0);
    checked_next_offset(options.base_offset, i64::from(max_offset_delta))?;

    let log_append = magic == MAGIC_V1 && options.timestamp_type == TimestampType::LogAppendTime;
    let timestamp_type_bit = if log_append { TIMESTAMP_TYPE_MASK } else { 0 };
    let timestamp_of = |record: &Record| {
        if magic == MAGIC_V0 {
            NO_TIMESTAMP
        } else if log_append {
            options.base_timestamp
        } else {
            options.base_timestamp.wrapping_add(record.timestamp_delta)
        }
    };
    let absolute_offset =
        |record: &Record| options.base_offset.wrapping_add(i64::from(record.offset_delta));

    let mut staged = BytesMut::new();
    match options.compression {
        CompressionType::None => {
            for record in records {
                write_message(
                    &mut staged,
                    absolute_offset(record),
                    magic,
                    timestamp_type_bit,
                    timestamp_of(record),
                    record.key.as_deref(),
                    record.value.as_deref(),
                )?;
            }
        }
        kind => {
            let mut inner = BytesMut::new();
            for record in records {
                let inner_offset = if magic == MAGIC_V1 {
                    i64::from(record.offset_delta)
                } else {
                    absolute_offset(record)
                };
                write_message(
                    &mut inner,
                    inner_offset,
                    magic,
                    0,
                    timestamp_of(record),
                    record.key.as_deref(),
                    record.value.as_deref(),
                )?;
            }
            let compressed = registry.compress(kind, &inner)?;

            let wrapper_offset = records
                .last()
                .map(absolute_offset)
                .unwrap_or(options.base_offset);
            let wrapper_timestamp = if magic == MAGIC_V1 {
                records
                    .iter()
                    .map(timestamp_of)
                    .max()
                    .unwrap_or(options.base_timestamp)
            } else {
                NO_TIMESTAMP
            };

            write_message(
                &mut staged,
                wrapper_offset,
                magic,
                kind as i8 | timestamp_type_bit,
                wrapper_timestamp,
                None,
                Some(compressed.as_slice()),
            )?;
        }
    }

    tracing::debug!(
        magic,
        base_offset = options.base_offset,
        records = records.len(),
        compression = %options.compression,
        size = staged.len(),
        "Encoded legacy message set"
    );

    buf.put_slice(&staged);
    Ok(staged.len())
}

/// Decode and verify the entry at `pos`, expanding a compressed wrapper
pub fn decode_batch(
    data: &Bytes,
    pos: usize,
    registry: &CompressionRegistry,
) -> Result<(LegacyBatch, usize)> {
    let (wrapper, next) = read_message(data, pos)?;
    let compression = wrapper.compression()?;
    let timestamp_type =
        if wrapper.magic == MAGIC_V1 && wrapper.attributes & TIMESTAMP_TYPE_MASK != 0 {
            TimestampType::LogAppendTime
        } else {
            TimestampType::CreateTime
        };

    let records = match compression {
        CompressionType::None => vec![BatchRecord {
            offset: wrapper.offset,
            timestamp: wrapper.timestamp,
            timestamp_type,
            key: wrapper.key.clone(),
            value: wrapper.value.clone(),
            headers: Vec::new(),
            is_control: false,
        }],
        kind => decode_inner(&wrapper, kind, timestamp_type, registry)?,
    };
    if let Some(last) = records.last() {
        checked_next_offset(last.offset, 0)?;
    }

    tracing::debug!(
        magic = wrapper.magic,
        offset = wrapper.offset,
        records = records.len(),
        compression = %compression,
        size = next - pos,
        "Decoded legacy message set"
    );

    Ok((
        LegacyBatch {
            magic: wrapper.magic,
            offset: wrapper.offset,
            crc: wrapper.crc,
            attributes: wrapper.attributes,
            compression,
            timestamp_type,
            timestamp: wrapper.timestamp,
            size_in_bytes: next - pos,
            records,
        },
        next,
    ))
}

fn decode_inner(
    wrapper: &Message,
    kind: CompressionType,
    timestamp_type: TimestampType,
    registry: &CompressionRegistry,
) -> Result<Vec<BatchRecord>> {
    let value = wrapper
        .value
        .as_ref()
        .ok_or_else(|| Error::InvalidBatch("compressed message without a value".to_string()))?;
    let inner = Bytes::from(registry.decompress(kind, value)?);

    let mut messages = Vec::new();
    let mut pos = 0;
    while pos < inner.len() {
        // The wrapper is complete, so a short inner set is corruption
        let (message, next) = read_message(&inner, pos).map_err(|e| {
            if e.is_truncation() {
                Error::InvalidBatch(format!("inner message set: {}", e))
            } else {
                e
            }
        })?;
        if message.magic != wrapper.magic {
            return Err(Error::InvalidBatch(format!(
                "inner message magic {} inside magic {} wrapper",
                message.magic, wrapper.magic
            )));
        }
        if message.compression()? != CompressionType::None {
            return Err(Error::InvalidBatch(
                "nested compressed message inside compressed wrapper".to_string(),
            ));
        }
        messages.push(message);
        pos = next;
    }

    let last_inner = messages
        .last()
        .map(|m| m.offset)
        .ok_or_else(|| Error::InvalidBatch("compressed message set is empty".to_string()))?;

    messages
        .into_iter()
        .map(|message| {
            let offset = if wrapper.magic == MAGIC_V1 {
                wrapper
                    .offset
                    .checked_sub(last_inner)
                    .and_then(|base| base.checked_add(message.offset))
                    .ok_or_else(|| {
                        Error::InvalidBatch(format!(
                            "inner offset {} against wrapper offset {} overflows",
                            message.offset, wrapper.offset
                        ))
                    })?
            } else {
                message.offset
            };
            let timestamp = match timestamp_type {
                TimestampType::LogAppendTime => wrapper.timestamp,
                TimestampType::CreateTime => message.timestamp,
            };
            Ok(BatchRecord {
                offset,
                timestamp,
                timestamp_type,
                key: message.key,
                value: message.value,
                headers: Vec::new(),
                is_control: false,
            })
        })
        .collect()
}

/// One magic 0/1 log entry with its records fully validated
#[derive(Debug, Clone)]
pub struct LegacyBatch {
    magic: i8,
    offset: i64,
    crc: u32,
    attributes: i8,
    compression: CompressionType,
    timestamp_type: TimestampType,
    timestamp: i64,
    size_in_bytes: usize,
    records: Vec<BatchRecord>,
}

impl LegacyBatch {
    pub fn magic(&self) -> i8 {
        self.magic
    }

    /// Offset field of the entry (the last inner offset for a wrapper)
    pub fn entry_offset(&self) -> i64 {
        self.offset
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    pub fn attributes(&self) -> i8 {
        self.attributes
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    pub fn timestamp_type(&self) -> TimestampType {
        self.timestamp_type
    }

    /// Timestamp field of the entry, `-1` for magic 0
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn base_offset(&self) -> i64 {
        self.records.first().map(|r| r.offset).unwrap_or(self.offset)
    }

    pub fn last_offset(&self) -> i64 {
        self.records.last().map(|r| r.offset).unwrap_or(self.offset)
    }

    pub fn max_timestamp(&self) -> i64 {
        self.records
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or(self.timestamp)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn records(&self) -> &[BatchRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<BatchRecord> {
        self.records
    }
}

//! Record Data Structure and Codec
//!
//! A [`Record`] is one entry inside a magic 2 batch. Its offset and timestamp are
//! deltas against the batch's base offset and base timestamp, which keeps them
//! small enough to fit in one or two varint bytes.
//!
//! ## Wire Layout
//! ```text
//! length          varint   bytes that follow this field
//! attributes      int8     unused, always 0
//! timestampDelta  varint
//! offsetDelta     varint
//! keyLength       varint   -1 = absent
//! key             bytes
//! valueLength     varint   -1 = absent
//! value           bytes
//! headerCount     varint
//! headers[]:
//!   keyLength     varint
//!   key           utf-8 bytes
//!   valueLength   varint   -1 = absent
//!   value         bytes
//! ```
//!
//! ## Absent vs Empty
//! A length of `-1` means "absent" (`None`), never "empty". `Some(Bytes::new())`
//! encodes as length `0` and decodes back to `Some` of an empty buffer.
//!
//! ## Zero Copy
//! Decoding slices keys, values and header values out of the input `Bytes`, so
//! no payload bytes are copied.

use bytes::{BufMut, Bytes};
use serde::{Deserialize, Serialize};

use crate::varint::{decode_varint_at, encode_varint, size_of_varint};
use crate::{Error, Result};

/// Length sentinel for an absent key, value or header value
pub const NULL_LENGTH: i64 = -1;

/// A record header: UTF-8 key, nullable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: Option<Bytes>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: Option<Bytes>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A single record inside a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Offset relative to the batch base offset
    pub offset_delta: i32,

    /// Timestamp relative to the batch base timestamp (milliseconds)
    pub timestamp_delta: i64,

    /// Optional key
    pub key: Option<Bytes>,

    /// Optional value (absent values are tombstones)
    pub value: Option<Bytes>,

    /// Ordered headers
    pub headers: Vec<Header>,
}

impl Record {
    pub fn new(
        offset_delta: i32,
        timestamp_delta: i64,
        key: Option<Bytes>,
        value: Option<Bytes>,
    ) -> Self {
        Self {
            offset_delta,
            timestamp_delta,
            key,
            value,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: Option<Bytes>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Exact number of bytes [`encode_record`] appends for this record
    pub fn encoded_size(&self) -> usize {
        size_of_record(
            self.offset_delta,
            self.timestamp_delta,
            self.key.as_deref(),
            self.value.as_deref(),
            &self.headers,
        )
    }
}

fn size_of_nullable(bytes: Option<&[u8]>) -> usize {
    match bytes {
        Some(b) => size_of_varint(b.len() as i64) + b.len(),
        None => size_of_varint(NULL_LENGTH),
    }
}

fn size_of_headers(headers: &[Header]) -> usize {
    size_of_varint(headers.len() as i64)
        + headers
            .iter()
            .map(|h| {
                size_of_nullable(Some(h.key.as_bytes())) + size_of_nullable(h.value.as_deref())
            })
            .sum::<usize>()
}

fn size_of_body(
    offset_delta: i32,
    timestamp_delta: i64,
    key: Option<&[u8]>,
    value: Option<&[u8]>,
    headers: &[Header],
) -> usize {
    // leading byte is the attributes field
    1 + size_of_varint(timestamp_delta)
        + size_of_varint(i64::from(offset_delta))
        + size_of_nullable(key)
        + size_of_nullable(value)
        + size_of_headers(headers)
}

/// Exact encoded size of a record, including its length prefix
pub fn size_of_record(
    offset_delta: i32,
    timestamp_delta: i64,
    key: Option<&[u8]>,
    value: Option<&[u8]>,
    headers: &[Header],
) -> usize {
    let body = size_of_body(offset_delta, timestamp_delta, key, value, headers);
    size_of_varint(body as i64) + body
}

/// Worst-case encoded size when the deltas are not yet known
///
/// Assumes a 5-byte offset delta and a 10-byte timestamp delta.
pub fn estimate_record_size_upper_bound(
    key: Option<&[u8]>,
    value: Option<&[u8]>,
    headers: &[Header],
) -> usize {
    let body =
        1 + 10 + 5 + size_of_nullable(key) + size_of_nullable(value) + size_of_headers(headers);
    size_of_varint(body as i64) + body
}

fn check_span_len(what: &str, len: usize) -> Result<()> {
    if len > i32::MAX as usize {
        return Err(Error::InvalidRecord(format!(
            "{} length {} exceeds i32::MAX",
            what, len
        )));
    }
    Ok(())
}

fn encode_nullable(buf: &mut impl BufMut, bytes: Option<&[u8]>) -> Result<()> {
    match bytes {
        Some(b) => {
            encode_varint(buf, b.len() as i64)?;
            buf.put_slice(b);
        }
        None => {
            encode_varint(buf, NULL_LENGTH)?;
        }
    }
    Ok(())
}

/// Encode one record, returning the number of bytes appended
///
/// Span lengths are validated before anything is written.
pub fn encode_record(buf: &mut impl BufMut, record: &Record) -> Result<usize> {
    if let Some(key) = &record.key {
        check_span_len("key", key.len())?;
    }
    if let Some(value) = &record.value {
        check_span_len("value", value.len())?;
    }
    for header in &record.headers {
        check_span_len("header key", header.key.len())?;
        if let Some(value) = &header.value {
            check_span_len("header value", value.len())?;
        }
    }

    let body = size_of_body(
        record.offset_delta,
        record.timestamp_delta,
        record.key.as_deref(),
        record.value.as_deref(),
        &record.headers,
    );
    check_span_len("record", body)?;

    let prefix = encode_varint(buf, body as i64)?;
    buf.put_i8(0); // attributes
    encode_varint(buf, record.timestamp_delta)?;
    encode_varint(buf, i64::from(record.offset_delta))?;
    encode_nullable(buf, record.key.as_deref())?;
    encode_nullable(buf, record.value.as_deref())?;

    encode_varint(buf, record.headers.len() as i64)?;
    for header in &record.headers {
        encode_nullable(buf, Some(header.key.as_bytes()))?;
        encode_nullable(buf, header.value.as_deref())?;
    }

    Ok(prefix + body)
}

/// Bounded reader over one record body
struct FieldReader<'a> {
    data: &'a Bytes,
    pos: usize,
    end: usize,
}

impl<'a> FieldReader<'a> {
    fn remaining(&self) -> usize {
        self.end - self.pos
    }

    fn read_i8(&mut self) -> Result<i8> {
        if self.remaining() < 1 {
            return Err(Error::TruncatedRecord(
                "record body ends before attributes".to_string(),
            ));
        }
        let value = self.data[self.pos] as i8;
        self.pos += 1;
        Ok(value)
    }

    fn read_varint(&mut self, field: &str) -> Result<i64> {
        let (value, next) =
            decode_varint_at(&self.data[..self.end], self.pos).map_err(|e| match e {
                Error::TruncatedInput { .. } => {
                    Error::TruncatedRecord(format!("record body ends inside {}", field))
                }
                other => other,
            })?;
        self.pos = next;
        Ok(value)
    }

    fn read_nullable(&mut self, field: &str) -> Result<Option<Bytes>> {
        let len = self.read_varint(field)?;
        if len == NULL_LENGTH {
            return Ok(None);
        }
        if len < 0 {
            return Err(Error::InvalidRecord(format!(
                "negative {} length {}",
                field, len
            )));
        }
        let len = len as usize;
        if len > self.remaining() {
            return Err(Error::TruncatedRecord(format!(
                "{} of {} bytes exceeds remaining {}",
                field,
                len,
                self.remaining()
            )));
        }
        let span = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(Some(span))
    }
}

/// Decode one record starting at `pos`
///
/// Returns the record and the position of the first byte after it.
pub fn decode_record(data: &Bytes, pos: usize) -> Result<(Record, usize)> {
    let (length, body_start) = decode_varint_at(data, pos).map_err(|e| match e {
        Error::TruncatedInput { .. } => {
            Error::TruncatedRecord("buffer ends inside record length".to_string())
        }
        other => other,
    })?;

    if length < 0 {
        return Err(Error::InvalidRecord(format!(
            "negative record length {}",
            length
        )));
    }
    let available = data.len() - body_start;
    if length as u64 > available as u64 {
        return Err(Error::TruncatedRecord(format!(
            "record declares {} bytes but only {} remain",
            length, available
        )));
    }
    let end = body_start + length as usize;

    let mut reader = FieldReader {
        data,
        pos: body_start,
        end,
    };

    let _attributes = reader.read_i8()?;
    let timestamp_delta = reader.read_varint("timestamp delta")?;
    let offset_delta = reader.read_varint("offset delta")?;
    let offset_delta = i32::try_from(offset_delta).map_err(|_| {
        Error::InvalidRecord(format!("offset delta {} out of i32 range", offset_delta))
    })?;
    let key = reader.read_nullable("key")?;
    let value = reader.read_nullable("value")?;

    let header_count = reader.read_varint("header count")?;
    if header_count < 0 {
        return Err(Error::InvalidRecord(format!(
            "negative header count {}",
            header_count
        )));
    }

    // Each header needs at least two bytes, which bounds the allocation
    let capacity = (header_count as usize).min(reader.remaining() / 2);
    let mut headers = Vec::with_capacity(capacity);
    for _ in 0..header_count {
        let key = reader
            .read_nullable("header key")?
            .ok_or_else(|| Error::InvalidRecord("null header key".to_string()))?;
        let key = String::from_utf8(key.to_vec())
            .map_err(|e| Error::InvalidRecord(format!("header key is not UTF-8: {}", e)))?;
        let value = reader.read_nullable("header value")?;
        headers.push(Header { key, value });
    }

    if reader.remaining() != 0 {
        return Err(Error::InvalidRecord(format!(
            "{} trailing bytes after record fields",
            reader.remaining()
        )));
    }

    let record = Record {
        offset_delta,
        timestamp_delta,
        key,
        value,
        headers,
    };
    Ok((record, end))
}

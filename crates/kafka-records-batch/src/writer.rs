//! Record Batch Writer
//!
//! Accumulates records in append order and encodes them as one batch on
//! [`close`](RecordBatchWriter::close).
//!
//! ## Sizing
//!
//! The writer keeps a running estimate of the encoded size (uncompressed) so a
//! producer can tell when to start a new batch:
//!
//! - `append` returns `Ok(None)` instead of adding a record that would push the
//!   estimate past `max_batch_size`
//! - the first record is always accepted, so an oversized record still gets a
//!   batch of its own
//!
//! ## Usage
//!
//! ```ignore
//! let mut writer = RecordBatchWriter::new(WriterConfig::default())?;
//! while let Some(meta) = writer.append(None, key, value, vec![])? {
//!     // record accepted at meta.offset
//! }
//! let batch: Bytes = writer.close()?;
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use kafka_records_core::record::{estimate_record_size_upper_bound, size_of_record};
use kafka_records_core::{CompressionRegistry, CompressionType, Error, Header, Record, Result};

use crate::batch::{self, legacy, LOG_OVERHEAD, MAGIC_V0, MAGIC_V2, NO_TIMESTAMP};
use crate::config::WriterConfig;

/// Where an appended record will land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Absolute offset of the record
    pub offset: i64,

    /// Timestamp stored for the record (`-1` for magic 0)
    pub timestamp: i64,

    /// Uncompressed encoded size of the record
    pub size: usize,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug)]
pub struct RecordBatchWriter {
    config: WriterConfig,
    registry: CompressionRegistry,
    records: Vec<Record>,
    base_timestamp: Option<i64>,
    estimated_size: usize,
    closed: Option<Bytes>,
}

impl RecordBatchWriter {
    /// Create a writer using the built-in compression codecs
    pub fn new(config: WriterConfig) -> Result<Self> {
        Self::with_registry(config, CompressionRegistry::default())
    }

    pub fn with_registry(config: WriterConfig, registry: CompressionRegistry) -> Result<Self> {
        config.validate()?;
        if !registry.supports(config.compression) {
            return Err(Error::UnsupportedCompression(config.compression));
        }

        let estimated_size = batch_overhead(&config);
        Ok(Self {
            config,
            registry,
            records: Vec::new(),
            base_timestamp: None,
            estimated_size,
            closed: None,
        })
    }

    /// Append a record, or return `Ok(None)` if the batch is full
    ///
    /// A missing timestamp defaults to the current wall clock in milliseconds.
    pub fn append(
        &mut self,
        timestamp: Option<i64>,
        key: Option<Bytes>,
        value: Option<Bytes>,
        headers: Vec<Header>,
    ) -> Result<Option<RecordMetadata>> {
        if self.closed.is_some() {
            return Err(Error::WriterClosed);
        }
        if self.config.magic != MAGIC_V2 && !headers.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "record headers need magic 2, writer uses magic {}",
                self.config.magic
            )));
        }

        if !self.has_room_for(key.as_deref(), value.as_deref(), &headers) {
            tracing::debug!(
                records = self.records.len(),
                estimated_size = self.estimated_size,
                max_batch_size = self.config.max_batch_size,
                "Batch full"
            );
            return Ok(None);
        }

        let offset_delta = i32::try_from(self.records.len())
            .map_err(|_| Error::InvalidBatch("too many records in one batch".to_string()))?;
        let offset =
            batch::checked_next_offset(self.config.base_offset, i64::from(offset_delta))? - 1;
        let timestamp = timestamp.unwrap_or_else(now_ms);
        let base_timestamp = *self.base_timestamp.get_or_insert(timestamp);
        let timestamp_delta = timestamp.wrapping_sub(base_timestamp);

        let record = Record {
            offset_delta,
            timestamp_delta,
            key,
            value,
            headers,
        };
        let size = self.record_size(&record);
        self.records.push(record);
        self.estimated_size += size;

        Ok(Some(RecordMetadata {
            offset,
            timestamp: if self.config.magic == MAGIC_V0 {
                NO_TIMESTAMP
            } else {
                timestamp
            },
            size,
        }))
    }

    /// Whether a record with these fields would be accepted by `append`
    pub fn has_room_for(
        &self,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
        headers: &[Header],
    ) -> bool {
        if self.closed.is_some() {
            return false;
        }
        if self.records.is_empty() {
            return true;
        }

        let upper_bound = if self.config.magic == MAGIC_V2 {
            estimate_record_size_upper_bound(key, value, headers)
        } else {
            legacy_message_size(self.config.magic, key, value)
        };
        self.estimated_size + upper_bound <= self.config.max_batch_size
    }

    fn record_size(&self, record: &Record) -> usize {
        if self.config.magic == MAGIC_V2 {
            size_of_record(
                record.offset_delta,
                record.timestamp_delta,
                record.key.as_deref(),
                record.value.as_deref(),
                &record.headers,
            )
        } else {
            legacy_message_size(
                self.config.magic,
                record.key.as_deref(),
                record.value.as_deref(),
            )
        }
    }

    /// Encode the batch
    ///
    /// Closing is idempotent: later calls return the same bytes.
    pub fn close(&mut self) -> Result<Bytes> {
        if let Some(bytes) = &self.closed {
            return Ok(bytes.clone());
        }

        let base_timestamp = self.base_timestamp.unwrap_or(NO_TIMESTAMP);
        let options = self.config.encode_options(base_timestamp);

        let mut buf = BytesMut::with_capacity(self.estimated_size);
        batch::encode_batch(&mut buf, &self.records, &options, &self.registry)?;
        let bytes = buf.freeze();

        tracing::debug!(
            magic = self.config.magic,
            records = self.records.len(),
            compression = %self.config.compression,
            estimated_size = self.estimated_size,
            size = bytes.len(),
            "Closed record batch writer"
        );

        self.closed = Some(bytes.clone());
        Ok(bytes)
    }

    /// Running uncompressed size estimate, including batch overhead
    pub fn estimated_size(&self) -> usize {
        self.estimated_size
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Offset the next appended record would receive
    pub fn next_offset(&self) -> i64 {
        self.config
            .base_offset
            .wrapping_add(self.records.len() as i64)
    }
}

fn batch_overhead(config: &WriterConfig) -> usize {
    match (config.magic, config.compression) {
        (MAGIC_V2, _) => batch::default::HEADER_LEN,
        (_, CompressionType::None) => 0,
        (magic, _) => legacy_message_size(magic, None, None),
    }
}

/// Full log entry size of one legacy message
fn legacy_message_size(magic: i8, key: Option<&[u8]>, value: Option<&[u8]>) -> usize {
    let overhead = if magic == MAGIC_V0 {
        legacy::MESSAGE_OVERHEAD_V0
    } else {
        legacy::MESSAGE_OVERHEAD_V1
    };
    LOG_OVERHEAD + overhead + key.map_or(0, <[u8]>::len) + value.map_or(0, <[u8]>::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{decode_batch, default::DefaultBatchHeader};

    fn writer(config: WriterConfig) -> RecordBatchWriter {
        RecordBatchWriter::new(config).unwrap()
    }

    fn value(n: usize) -> Option<Bytes> {
        Some(Bytes::from(vec![b'x'; n]))
    }

    #[test]
    fn test_append_assigns_sequential_offsets() {
        let mut w = writer(WriterConfig {
            base_offset: 100,
            ..Default::default()
        });

        let first = w.append(Some(1_000), None, value(1), vec![]).unwrap().unwrap();
        let second = w.append(Some(1_010), None, value(1), vec![]).unwrap().unwrap();
        assert_eq!(first.offset, 100);
        assert_eq!(second.offset, 101);
        assert_eq!(second.timestamp, 1_010);
        assert_eq!(w.record_count(), 2);
        assert_eq!(w.next_offset(), 102);
    }

    #[test]
    fn test_append_past_max_offset_fails() {
        let mut w = writer(WriterConfig {
            base_offset: i64::MAX - 2,
            ..Default::default()
        });

        w.append(Some(0), None, value(1), vec![]).unwrap().unwrap();
        let second = w.append(Some(0), None, value(1), vec![]).unwrap().unwrap();
        assert_eq!(second.offset, i64::MAX - 1);

        let err = w.append(Some(0), None, value(1), vec![]).unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)), "{err}");
        assert_eq!(w.record_count(), 2);
        assert!(w.close().is_ok());
    }

    #[test]
    fn test_estimate_matches_uncompressed_encoding() {
        for magic in [0i8, 1, 2] {
            let mut w = writer(WriterConfig {
                magic,
                ..Default::default()
            });
            for i in 0..10 {
                let key = Some(Bytes::from(format!("key-{i}")));
                w.append(Some(500 + i), key, value(i as usize * 3), vec![])
                    .unwrap()
                    .unwrap();
            }
            let estimate = w.estimated_size();
            let bytes = w.close().unwrap();
            assert_eq!(estimate, bytes.len(), "magic {magic}");
        }
    }

    #[test]
    fn test_full_batch_rejects_but_first_record_always_fits() {
        let mut w = writer(WriterConfig {
            max_batch_size: 100,
            ..Default::default()
        });

        // Larger than the whole batch limit, accepted anyway
        assert!(w.append(Some(0), None, value(500), vec![]).unwrap().is_some());
        assert!(!w.has_room_for(None, Some(&b"x"[..]), &[]));
        assert!(w.append(Some(0), None, value(1), vec![]).unwrap().is_none());
        assert_eq!(w.record_count(), 1);
    }

    #[test]
    fn test_fills_up_to_limit() {
        let mut w = writer(WriterConfig {
            max_batch_size: 1024,
            ..Default::default()
        });
        let mut accepted = 0;
        while w.append(Some(0), None, value(50), vec![]).unwrap().is_some() {
            accepted += 1;
        }
        assert!(accepted > 1);
        assert!(w.estimated_size() <= 1024);
        let bytes = w.close().unwrap();
        assert!(bytes.len() <= 1024);
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let mut w = writer(WriterConfig::default());
        w.append(Some(5), Some(Bytes::from("k")), value(3), vec![])
            .unwrap();

        let first = w.close().unwrap();
        let second = w.close().unwrap();
        assert_eq!(first, second);
        assert!(w.is_closed());
        assert!(!w.has_room_for(None, None, &[]));

        let err = w.append(Some(6), None, None, vec![]).unwrap_err();
        assert!(matches!(err, Error::WriterClosed));
    }

    #[test]
    fn test_close_empty_writer() {
        let mut w = writer(WriterConfig::default());
        let bytes = w.close().unwrap();
        let header = DefaultBatchHeader::parse(&bytes).unwrap();
        assert_eq!(header.record_count, 0);
        assert_eq!(header.last_offset_delta, -1);

        let mut legacy = writer(WriterConfig {
            magic: 1,
            ..Default::default()
        });
        assert!(legacy.close().unwrap().is_empty());
    }

    #[test]
    fn test_headers_need_magic_2() {
        let mut w = writer(WriterConfig {
            magic: 1,
            ..Default::default()
        });
        let err = w
            .append(None, None, value(1), vec![Header::new("h", None)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
        assert!(w.is_empty());
    }

    #[test]
    fn test_unregistered_compression_fails_construction() {
        let config = WriterConfig {
            compression: CompressionType::Zstd,
            ..Default::default()
        };
        let result = RecordBatchWriter::with_registry(config, CompressionRegistry::empty());
        assert!(matches!(
            result.err(),
            Some(Error::UnsupportedCompression(CompressionType::Zstd))
        ));
    }

    #[test]
    fn test_magic_0_reports_no_timestamp() {
        let mut w = writer(WriterConfig {
            magic: 0,
            ..Default::default()
        });
        let meta = w.append(Some(1234), None, value(1), vec![]).unwrap().unwrap();
        assert_eq!(meta.timestamp, NO_TIMESTAMP);
    }

    #[test]
    fn test_timestamp_deltas_relative_to_first_record() {
        let mut w = writer(WriterConfig::default());
        w.append(Some(10_000), None, value(1), vec![]).unwrap();
        w.append(Some(9_990), None, value(1), vec![]).unwrap();
        w.append(Some(10_050), None, value(1), vec![]).unwrap();

        let bytes = w.close().unwrap();
        let (batch, _) = decode_batch(&bytes, 0, &CompressionRegistry::default()).unwrap();
        assert_eq!(batch.max_timestamp(), 10_050);
        let timestamps: Vec<i64> = batch
            .into_records()
            .map(|r| r.unwrap().timestamp)
            .collect();
        assert_eq!(timestamps, vec![10_000, 9_990, 10_050]);
    }

    #[test]
    fn test_default_timestamp_is_wall_clock() {
        let before = now_ms();
        let mut w = writer(WriterConfig::default());
        let meta = w.append(None, None, value(1), vec![]).unwrap().unwrap();
        assert!(meta.timestamp >= before);
    }
}

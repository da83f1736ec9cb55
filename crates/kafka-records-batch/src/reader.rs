//! Record Set Readers
//!
//! A fetch response carries a record set: zero or more batches back to back,
//! possibly of different generations, and possibly ending in a partial batch
//! cut off at the fetch size limit.
//!
//! - [`MemoryRecords`] walks the buffer one batch at a time.
//! - [`RecordBatchReader`] flattens that into one record at a time.
//!
//! Both hold a `Bytes` handle to the buffer; records are zero-copy slices of it
//! (or of the decompressed payload for compressed batches).

use std::iter::FusedIterator;

use bytes::Bytes;
use kafka_records_core::{CompressionRegistry, Result};

use crate::batch::{batch_size_at, decode_batch, BatchRecord, BatchRecords, RecordBatch};

/// Batch-at-a-time view over a record set
#[derive(Debug, Clone)]
pub struct MemoryRecords {
    data: Bytes,
    pos: usize,
    registry: CompressionRegistry,
    failed: bool,
}

impl MemoryRecords {
    /// Read with the built-in compression codecs
    pub fn new(data: Bytes) -> Self {
        Self::with_registry(data, CompressionRegistry::default())
    }

    pub fn with_registry(data: Bytes, registry: CompressionRegistry) -> Self {
        Self {
            data,
            pos: 0,
            registry,
            failed: false,
        }
    }

    /// Decode the next complete batch
    ///
    /// Returns `Ok(None)` at the end of the buffer, or when only a partial
    /// trailing batch remains. After an error no further batches are returned.
    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.failed {
            return Ok(None);
        }

        let result = self.try_next_batch();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn try_next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if batch_size_at(&self.data, self.pos)?.is_none() {
            if self.pos < self.data.len() {
                tracing::warn!(
                    position = self.pos,
                    trailing = self.data.len() - self.pos,
                    "Ignoring partial batch at end of record set"
                );
            }
            self.pos = self.data.len();
            return Ok(None);
        }

        let (batch, next) = decode_batch(&self.data, self.pos, &self.registry)?;
        self.pos = next;
        Ok(Some(batch))
    }

    /// Length of the prefix made of complete batches
    ///
    /// Scans entry headers only; checksums are not verified.
    pub fn valid_bytes(&self) -> usize {
        let mut pos = 0;
        while let Ok(Some(size)) = batch_size_at(&self.data, pos) {
            pos += size;
        }
        pos
    }

    /// Position of the next batch in the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Iterator for MemoryRecords {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

impl FusedIterator for MemoryRecords {}

/// Record-at-a-time view over a record set
///
/// Construction decodes and verifies the first batch, so a corrupt buffer
/// fails before any record is exposed.
#[derive(Debug)]
pub struct RecordBatchReader {
    batches: MemoryRecords,
    current: Option<BatchRecords>,
    done: bool,
}

impl RecordBatchReader {
    pub fn new(data: Bytes) -> Result<Self> {
        Self::with_registry(data, CompressionRegistry::default())
    }

    pub fn with_registry(data: Bytes, registry: CompressionRegistry) -> Result<Self> {
        let mut batches = MemoryRecords::with_registry(data, registry);
        let current = batches.next_batch()?.map(RecordBatch::into_records);
        let done = current.is_none();
        Ok(Self {
            batches,
            current,
            done,
        })
    }
}

impl Iterator for RecordBatchReader {
    type Item = Result<BatchRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(records) = &mut self.current {
                match records.next() {
                    Some(Ok(record)) => {
                        tracing::trace!(offset = record.offset, "Read record");
                        return Some(Ok(record));
                    }
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            match self.batches.next_batch() {
                Ok(Some(batch)) => self.current = Some(batch.into_records()),
                Ok(None) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl FusedIterator for RecordBatchReader {}

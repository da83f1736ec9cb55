//! `krdump dump`: print or verify a file of record batches

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use kafka_records_batch::{BatchRecord, EndTransactionMarker, MemoryRecords, RecordBatch};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct BatchSummary {
    position: usize,
    magic: i8,
    base_offset: i64,
    last_offset: i64,
    record_count: usize,
    attributes: i16,
    compression: String,
    timestamp_type: String,
    max_timestamp: i64,
    crc: u32,
    size: usize,
    transactional: bool,
    control: bool,
    records: Vec<RecordSummary>,
}

#[derive(Debug, Serialize)]
struct RecordSummary {
    offset: i64,
    timestamp: i64,
    key: Option<String>,
    value: Option<String>,
    headers: Vec<(String, Option<String>)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    marker: Option<EndTransactionMarker>,
}

fn lossy(bytes: Option<&Bytes>) -> Option<String> {
    bytes.map(|b| String::from_utf8_lossy(b).into_owned())
}

impl RecordSummary {
    fn from_record(record: &BatchRecord) -> Self {
        let marker = if record.is_control {
            match (&record.key, &record.value) {
                (Some(key), Some(value)) => EndTransactionMarker::parse(key, value).ok(),
                _ => None,
            }
        } else {
            None
        };

        Self {
            offset: record.offset,
            timestamp: record.timestamp,
            key: lossy(record.key.as_ref()),
            value: lossy(record.value.as_ref()),
            headers: record
                .headers
                .iter()
                .map(|h| (h.key.clone(), lossy(h.value.as_ref())))
                .collect(),
            marker,
        }
    }
}

impl BatchSummary {
    fn from_batch(position: usize, batch: RecordBatch) -> Result<Self> {
        let mut summary = Self {
            position,
            magic: batch.magic(),
            base_offset: batch.base_offset(),
            last_offset: batch.last_offset(),
            record_count: batch.record_count(),
            attributes: batch.attributes(),
            compression: batch.compression().to_string(),
            timestamp_type: batch.timestamp_type().to_string(),
            max_timestamp: batch.max_timestamp(),
            crc: batch.checksum(),
            size: batch.size_in_bytes(),
            transactional: batch.is_transactional(),
            control: batch.is_control(),
            records: Vec::new(),
        };

        for record in batch.into_records() {
            let record =
                record.with_context(|| format!("Bad record in batch at position {}", position))?;
            summary.records.push(RecordSummary::from_record(&record));
        }
        Ok(summary)
    }

    fn print_text(&self) {
        println!(
            "batch position={} magic={} offsets={}..={} count={} attributes={:#06x} compression={} timestamp_type={} max_timestamp={} crc={:#010x} size={} transactional={} control={}",
            self.position,
            self.magic,
            self.base_offset,
            self.last_offset,
            self.record_count,
            self.attributes,
            self.compression,
            self.timestamp_type,
            self.max_timestamp,
            self.crc,
            self.size,
            self.transactional,
            self.control,
        );

        for record in &self.records {
            let headers: Vec<String> = record
                .headers
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.as_deref().unwrap_or("null")))
                .collect();
            print!(
                "  offset={} timestamp={} key={} value={}",
                record.offset,
                record.timestamp,
                record.key.as_deref().unwrap_or("null"),
                record.value.as_deref().unwrap_or("null"),
            );
            if !headers.is_empty() {
                print!(" headers=[{}]", headers.join(", "));
            }
            if let Some(marker) = &record.marker {
                print!(
                    " marker={:?} coordinator_epoch={}",
                    marker.kind, marker.coordinator_epoch
                );
            }
            println!();
        }
    }
}

fn open(path: &Path) -> Result<MemoryRecords> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    tracing::debug!(path = %path.display(), size = data.len(), "Loaded batch file");
    Ok(MemoryRecords::new(Bytes::from(data)))
}

fn warn_trailing(records: &MemoryRecords) {
    let valid = records.valid_bytes();
    if valid < records.size_in_bytes() {
        tracing::warn!(
            valid_bytes = valid,
            trailing = records.size_in_bytes() - valid,
            "File ends with a partial batch"
        );
    }
}

pub fn dump(path: &Path, json: bool) -> Result<()> {
    let mut records = open(path)?;

    loop {
        let position = records.position();
        let batch = match records
            .next_batch()
            .with_context(|| format!("Corrupt batch at position {}", position))?
        {
            Some(batch) => batch,
            None => break,
        };

        let summary = BatchSummary::from_batch(position, batch)?;
        if json {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            summary.print_text();
        }
    }

    warn_trailing(&records);
    Ok(())
}

pub fn verify(path: &Path) -> Result<()> {
    let mut records = open(path)?;
    let mut batch_count = 0usize;
    let mut record_count = 0usize;

    loop {
        let position = records.position();
        let batch = match records
            .next_batch()
            .with_context(|| format!("Corrupt batch at position {}", position))?
        {
            Some(batch) => batch,
            None => break,
        };

        batch_count += 1;
        for record in batch.into_records() {
            record.with_context(|| format!("Bad record in batch at position {}", position))?;
            record_count += 1;
        }
    }

    warn_trailing(&records);
    tracing::info!(
        batches = batch_count,
        records = record_count,
        bytes = records.valid_bytes(),
        "Verified"
    );
    println!(
        "OK: {} batches, {} records, {} bytes",
        batch_count,
        record_count,
        records.valid_bytes()
    );
    Ok(())
}

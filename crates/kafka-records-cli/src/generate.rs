//! `krdump generate`: write sample record batches

use std::path::Path;

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use kafka_records_batch::{Header, RecordBatchWriter, WriterConfig};
use kafka_records_core::CompressionType;

pub struct GenerateOptions {
    pub records: u64,
    pub magic: i8,
    pub compression: CompressionType,
    pub value_size: usize,
    pub batch_size: usize,
}

fn sample_value(i: u64, size: usize) -> Bytes {
    let seed = format!("value-{} ", i);
    Bytes::from(seed.bytes().cycle().take(size).collect::<Vec<u8>>())
}

fn new_writer(options: &GenerateOptions, base_offset: i64) -> Result<RecordBatchWriter> {
    let config = WriterConfig {
        magic: options.magic,
        compression: options.compression,
        max_batch_size: options.batch_size,
        base_offset,
        ..Default::default()
    };
    RecordBatchWriter::new(config).context("Invalid writer settings")
}

pub fn generate(path: &Path, options: &GenerateOptions) -> Result<()> {
    let mut out = BytesMut::new();
    let mut batches = 0usize;
    let mut writer = new_writer(options, 0)?;

    let mut i = 0;
    while i < options.records {
        let key = Some(Bytes::from(format!("key-{}", i)));
        let value = Some(sample_value(i, options.value_size));
        let headers = if options.magic >= 2 {
            vec![Header::new("seq", Some(Bytes::from(i.to_string())))]
        } else {
            Vec::new()
        };

        match writer.append(None, key, value, headers)? {
            Some(_) => i += 1,
            None => {
                out.extend_from_slice(&writer.close()?);
                batches += 1;
                writer = new_writer(options, writer.next_offset())?;
            }
        }
    }
    if !writer.is_empty() {
        out.extend_from_slice(&writer.close()?);
        batches += 1;
    }

    std::fs::write(path, &out).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        records = options.records,
        batches,
        magic = options.magic,
        compression = %options.compression,
        bytes = out.len(),
        "Generated record batches"
    );
    Ok(())
}

#![no_main]

use bytes::Bytes;
use kafka_records_batch::{MemoryRecords, RecordBatchReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = Bytes::copy_from_slice(data);

    // Batch-at-a-time: every batch, every record, without panicking
    let mut batches = MemoryRecords::new(data.clone());
    assert!(batches.valid_bytes() <= data.len());
    while let Ok(Some(batch)) = batches.next_batch() {
        assert!(batch.size_in_bytes() >= 12);
        for record in batch.into_records() {
            if let Ok(record) = record {
                let _ = record.control();
            }
        }
    }

    // Record-at-a-time
    if let Ok(reader) = RecordBatchReader::new(data) {
        for _ in reader {}
    }
});

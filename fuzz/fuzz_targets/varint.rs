#![no_main]

use bytes::Bytes;
use kafka_records_core::record::decode_record;
use kafka_records_core::varint::{decode_varint, decode_varint_u64, encode_varint, size_of_varint};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode or error, never panic
    let mut cursor = data;
    if let Ok(value) = decode_varint(&mut cursor) {
        // Whatever decodes must re-encode to a varint of the predicted size
        let mut buf = Vec::new();
        let written = encode_varint(&mut buf, value).unwrap();
        assert_eq!(written, size_of_varint(value));

        let mut again = &buf[..];
        assert_eq!(decode_varint(&mut again).unwrap(), value);
    }

    let mut cursor = data;
    let _ = decode_varint_u64(&mut cursor);

    // Same for a single record body
    let _ = decode_record(&Bytes::copy_from_slice(data), 0);
});

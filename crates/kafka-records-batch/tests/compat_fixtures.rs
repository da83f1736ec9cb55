//! Compatibility fixtures: record batches captured from librdkafka and the Java
//! client. Each must decode to the documented records; uncompressed fixtures
//! must also re-encode byte for byte.

use bytes::{Bytes, BytesMut};
use kafka_records_batch::batch::default::DefaultBatchHeader;
use kafka_records_batch::{
    decode_batch, encode_batch, BatchRecord, CompressionRegistry, CompressionType, EncodeOptions,
    Header, ProducerMetadata, Record, RecordBatch, TimestampType,
};

const NOCOMPRESSION: &[&[u8]] = &[
    b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x4b\x00\x00\x00\x00",
    b"\x02\x27\x24\xfe\xcd\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x61",
    b"\xd5\x9b\x77\x00\x00\x00\x00\x61\xd5\x9b\x77\xff\xff\xff\xff\xff",
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x00\x00\x00\x01\x32\x00\x00",
    b"\x00\x00\x16\x68\x65\x6c\x6c\x6f\x20\x6b\x61\x66\x6b\x61\x02\x06",
    b"\x66\x6f\x6f\x06\x62\x61\x72",
];

const GZIP: &[&[u8]] = &[
    b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x64\x00\x00\x00\x00",
    b"\x02\xba\x41\x46\x65\x00\x01\x00\x00\x00\x00\x00\x00\x01\x7e\x90",
    b"\xb3\x34\x67\x00\x00\x01\x7e\x90\xb3\x34\x67\xff\xff\xff\xff\xff",
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x00\x00\x00\x01\x1f\x8b\x08",
    b"\x00\x00\x00\x00\x00\x00\x03\xfb\xc3\xc8\xc0\xc0\x70\x82\xb1\x82",
    b"\x0e\x40\x2c\x23\x35\x27\x27\x5f\x21\x3b\x31\x2d\x3b\x91\x89\x2d",
    b"\x2d\x3f\x9f\x2d\x29\xb1\x08\x00\xe4\xcd\xba\x1f\x80\x00\x00\x00",
];

const LZ4: &[&[u8]] = &[
    b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x63\x00\x00\x00\x00",
    b"\x02\x1b\xa5\x92\x35\x00\x03\x00\x00\x00\x00\x00\x00\x01\x7e\xb1",
    b"\x1f\xc7\x24\x00\x00\x01\x7e\xb1\x1f\xc7\x24\xff\xff\xff\xff\xff",
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x00\x00\x00\x01\x04\x22\x4d",
    b"\x18\x60\x40\x82\x23\x00\x00\x00\x8f\xfc\x01\x00\x00\x00\xc8\x01",
    b"\x78\x01\x00\x50\xf0\x06\x16\x68\x65\x6c\x6c\x6f\x20\x6b\x61\x66",
    b"\x6b\x61\x02\x06\x66\x6f\x6f\x06\x62\x61\x72\x00\x00\x00\x00",
];

const SNAPPY: &[&[u8]] = &[
    b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x58\x00\x00\x00\x00",
    b"\x02\xad\x86\xf4\xf4\x00\x02\x00\x00\x00\x00\x00\x00\x01\x7e\xb6",
    b"\x45\x0e\x52\x00\x00\x01\x7e\xb6\x45\x0e\x52\xff\xff\xff\xff\xff",
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x00\x00\x00\x01\x80\x01\x1c",
    b"\xfc\x01\x00\x00\x00\xc8\x01\x78\xfe\x01\x00\x8a\x01\x00\x50\x16",
    b"\x68\x65\x6c\x6c\x6f\x20\x6b\x61\x66\x6b\x61\x02\x06\x66\x6f\x6f",
    b"\x06\x62\x61\x72",
];

const SNAPPY_JAVA: &[&[u8]] = &[
    b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x8c\x00\x00\x00\x00",
    b"\x02\x79\x1e\x2d\xce\x00\x02\x00\x00\x00\x01\x00\x00\x01\x7f\x07",
    b"\x25\x7a\xb1\x00\x00\x01\x7f\x07\x25\x7a\xb1\xff\xff\xff\xff\xff",
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x00\x00\x00\x02\x82\x53\x4e",
    b"\x41\x50\x50\x59\x00\x00\x00\x00\x01\x00\x00\x00\x01\x00\x00\x00",
    b"\x47\xff\x01\x1c\xfc\x01\x00\x00\x00\xc8\x01\x78\xfe\x01\x00\x8a",
    b"\x01\x00\x64\x16\x68\x65\x6c\x6c\x6f\x20\x6b\x61\x66\x6b\x61\x02",
    b"\x06\x66\x6f\x6f\x06\x62\x61\x72\xfa\x01\x00\x00\x02\xfe\x80\x00",
    b"\x96\x80\x00\x4c\x14\x73\x6f\x6d\x65\x20\x76\x61\x6c\x75\x65\x02",
    b"\x06\x66\x6f\x6f\x06\x62\x61\x72",
];

const ZSTD: &[&[u8]] = &[
    b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x5d\x00\x00\x00\x00",
    b"\x02\xa1\x6e\x4e\x95\x00\x04\x00\x00\x00\x00\x00\x00\x01\x7e\xbf",
    b"\x78\xf3\xad\x00\x00\x01\x7e\xbf\x78\xf3\xad\xff\xff\xff\xff\xff",
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x00\x00\x00\x01\x28\xb5\x2f",
    b"\xfd\x00\x58\x1d\x01\x00\xe8\xfc\x01\x00\x00\x00\xc8\x01\x78\x16",
    b"\x68\x65\x6c\x6c\x6f\x20\x6b\x61\x66\x6b\x61\x02\x06\x66\x6f\x6f",
    b"\x06\x62\x61\x72\x01\x00\x20\x05\x5c",
];

const NULL_KEY: &[&[u8]] = &[
    b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x01\x1a\x00\x00\x00\x00",
    b"\x02\x67\x98\xb9\x54\x00\x00\x00\x00\x00\x00\x00\x00\x01\x7e\xbe",
    b"\xdc\x91\xf6\x00\x00\x01\x7e\xbe\xdc\x91\xf6\xff\xff\xff\xff\xff",
    b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x00\x00\x00\x01\xce\x03\x00",
    b"\x00\x00\x01\xce\x01\x0a\x65\x0a\x2f\x74\x65\x73\x74\x5f\x74\x6f",
    b"\x70\x69\x63\x5f\x33\x37\x33\x39\x38\x66\x38\x64\x2d\x39\x35\x66",
    b"\x38\x2d\x34\x34\x65\x65\x2d\x38\x33\x61\x34\x2d\x34\x64\x30\x63",
    b"\x35\x39\x32\x62\x34\x34\x36\x64\x12\x32\x0a\x03\x75\x70\x63\x12",
    b"\x17\x0a\x04\x75\x73\x65\x72\x10\x03\x1a\x0a\x12\x08\x00\x00\x00",
    b"\x00\x00\x00\xf0\x3f\x22\x01\x00\x12\x10\x0a\x04\x74\x69\x6d\x65",
    b"\x10\x04\x1a\x03\x0a\x01\x64\x22\x01\x00\x18\x01\x04\x18\x63\x6f",
    b"\x6e\x74\x65\x6e\x74\x2d\x74\x79\x70\x65\xa4\x01\x61\x70\x70\x6c",
    b"\x69\x63\x61\x74\x69\x6f\x6e\x2f\x78\x2d\x70\x72\x6f\x74\x6f\x62",
    b"\x75\x66\x3b\x20\x73\x63\x68\x65\x6d\x61\x3d\x22\x69\x6e\x66\x6c",
    b"\x75\x78\x64\x61\x74\x61\x2e\x69\x6f\x78\x2e\x77\x72\x69\x74\x65",
    b"\x5f\x62\x75\x66\x66\x65\x72\x2e\x76\x31\x2e\x57\x72\x69\x74\x65",
    b"\x42\x75\x66\x66\x65\x72\x50\x61\x79\x6c\x6f\x61\x64\x22\x1a\x69",
    b"\x6f\x78\x2d\x6e\x61\x6d\x65\x73\x70\x61\x63\x65\x12\x6e\x61\x6d",
    b"\x65\x73\x70\x61\x63\x65",
];

fn fixture(parts: &[&[u8]]) -> Bytes {
    Bytes::from(parts.concat())
}

fn decode(data: &Bytes) -> (DefaultBatchHeader, Vec<BatchRecord>) {
    let (batch, next) = decode_batch(data, 0, &CompressionRegistry::default()).unwrap();
    assert_eq!(next, data.len());
    let header = match &batch {
        RecordBatch::Default(b) => *b.header(),
        RecordBatch::Legacy(_) => panic!("expected a magic 2 batch"),
    };
    let records = batch.into_records().collect::<Result<Vec<_>, _>>().unwrap();
    (header, records)
}

/// Re-encode decoded records with the header's own batch fields
fn reencode(header: &DefaultBatchHeader, records: &[BatchRecord]) -> Bytes {
    let records: Vec<Record> = records
        .iter()
        .map(|r| Record {
            offset_delta: (r.offset - header.base_offset) as i32,
            timestamp_delta: r.timestamp - header.base_timestamp,
            key: r.key.clone(),
            value: r.value.clone(),
            headers: r.headers.clone(),
        })
        .collect();
    let options = EncodeOptions {
        magic: header.magic,
        base_offset: header.base_offset,
        base_timestamp: header.base_timestamp,
        partition_leader_epoch: header.partition_leader_epoch,
        compression: header.compression().unwrap(),
        timestamp_type: header.timestamp_type(),
        producer: header.producer(),
        transactional: header.is_transactional(),
        control: header.is_control(),
    };
    let mut buf = BytesMut::new();
    encode_batch(&mut buf, &records, &options, &CompressionRegistry::default()).unwrap();
    buf.freeze()
}

fn assert_common_header(header: &DefaultBatchHeader, timestamp: i64, last_offset_delta: i32) {
    assert_eq!(header.base_offset, 0);
    assert_eq!(header.partition_leader_epoch, 0);
    assert_eq!(header.magic, 2);
    assert_eq!(header.last_offset_delta, last_offset_delta);
    assert_eq!(header.base_timestamp, timestamp);
    assert_eq!(header.max_timestamp, timestamp);
    assert_eq!(header.producer(), ProducerMetadata::new(-1, -1, -1));
    assert_eq!(header.timestamp_type(), TimestampType::CreateTime);
    assert!(!header.is_transactional());
    assert!(!header.is_control());
}

fn foo_bar() -> Vec<Header> {
    vec![Header::new("foo", Some(Bytes::from("bar")))]
}

fn hundred_x() -> Option<Bytes> {
    Some(Bytes::from(vec![b'x'; 100]))
}

/// Decode a compressed fixture, check the single "hello kafka" record, and
/// round-trip it through our own encoder
fn check_compressed(parts: &[&[u8]], compression: CompressionType, timestamp: i64) {
    let data = fixture(parts);
    let (header, records) = decode(&data);

    assert_common_header(&header, timestamp, 0);
    assert_eq!(header.compression().unwrap(), compression);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].offset, 0);
    assert_eq!(records[0].timestamp, timestamp);
    assert_eq!(records[0].key, hundred_x());
    assert_eq!(records[0].value, Some(Bytes::from("hello kafka")));
    assert_eq!(records[0].headers, foo_bar());

    // Encoders differ in output, so compare decoded records instead of bytes
    let again = reencode(&header, &records);
    let (header2, records2) = decode(&again);
    assert_eq!(header2.compression().unwrap(), compression);
    assert_eq!(records2, records);
}

#[test]
fn decode_fixture_nocompression() {
    let data = fixture(NOCOMPRESSION);
    let (header, records) = decode(&data);

    assert_common_header(&header, 1641388919, 0);
    assert_eq!(header.compression().unwrap(), CompressionType::None);
    assert_eq!(
        records,
        vec![BatchRecord {
            offset: 0,
            timestamp: 1641388919,
            timestamp_type: TimestampType::CreateTime,
            key: Some(Bytes::new()),
            value: Some(Bytes::from("hello kafka")),
            headers: foo_bar(),
            is_control: false,
        }]
    );

    assert_eq!(reencode(&header, &records), data);
}

#[test]
fn decode_fixture_gzip() {
    check_compressed(GZIP, CompressionType::Gzip, 1643105170535);
}

#[test]
fn decode_fixture_lz4() {
    check_compressed(LZ4, CompressionType::Lz4, 1643649156900);
}

#[test]
fn decode_fixture_snappy() {
    check_compressed(SNAPPY, CompressionType::Snappy, 1643735486034);
}

#[test]
fn decode_fixture_zstd() {
    check_compressed(ZSTD, CompressionType::Zstd, 1643889882029);
}

#[test]
fn decode_fixture_snappy_java() {
    let data = fixture(SNAPPY_JAVA);
    let (header, records) = decode(&data);

    assert_common_header(&header, 1645092371121, 1);
    assert_eq!(header.compression().unwrap(), CompressionType::Snappy);
    assert_eq!(header.record_count, 2);

    let values: Vec<_> = records.iter().map(|r| r.value.clone()).collect();
    assert_eq!(
        values,
        vec![
            Some(Bytes::from("hello kafka")),
            Some(Bytes::from("some value"))
        ]
    );
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.offset, i as i64);
        assert_eq!(record.key, hundred_x());
        assert_eq!(record.headers, foo_bar());
    }

    let (_, records2) = decode(&reencode(&header, &records));
    assert_eq!(records2, records);
}

#[test]
fn decode_fixture_null_key() {
    let data = fixture(NULL_KEY);
    let (header, records) = decode(&data);

    assert_common_header(&header, 1643879633398, 0);
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.key, None);
    assert_eq!(
        record.value.as_deref(),
        Some(
            &[
                10u8, 101, 10, 47, 116, 101, 115, 116, 95, 116, 111, 112, 105, 99, 95, 51, 55,
                51, 57, 56, 102, 56, 100, 45, 57, 53, 102, 56, 45, 52, 52, 101, 101, 45, 56, 51,
                97, 52, 45, 52, 100, 48, 99, 53, 57, 50, 98, 52, 52, 54, 100, 18, 50, 10, 3, 117,
                112, 99, 18, 23, 10, 4, 117, 115, 101, 114, 16, 3, 26, 10, 18, 8, 0, 0, 0, 0, 0,
                0, 240, 63, 34, 1, 0, 18, 16, 10, 4, 116, 105, 109, 101, 16, 4, 26, 3, 10, 1,
                100, 34, 1, 0, 24, 1,
            ][..]
        )
    );
    assert_eq!(
        record.headers,
        vec![
            Header::new(
                "content-type",
                Some(Bytes::from_static(
                    br#"application/x-protobuf; schema="influxdata.iox.write_buffer.v1.WriteBufferPayload""#
                ))
            ),
            Header::new("iox-namespace", Some(Bytes::from("namespace"))),
        ]
    );

    assert_eq!(reencode(&header, &records), data);
}

#[test]
fn fixture_checksum_corruption_detected() {
    let mut data = fixture(NOCOMPRESSION).to_vec();
    // flip a bit inside "hello kafka"
    let pos = data.len() - 12;
    data[pos] ^= 0x20;
    let err = decode_batch(&Bytes::from(data), 0, &CompressionRegistry::default()).unwrap_err();
    assert!(matches!(
        err,
        kafka_records_batch::Error::ChecksumMismatch { .. }
    ));
}

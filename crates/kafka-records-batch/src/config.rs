//! Writer Configuration
//!
//! This module defines configuration for [`RecordBatchWriter`](crate::RecordBatchWriter).
//!
//! ## WriterConfig
//!
//! - **magic**: Format generation to write, 0, 1 or 2 (default: 2)
//! - **compression**: Compression applied to the record payload (default: none)
//! - **max_batch_size**: Size at which the writer stops accepting records (default: 16KB)
//! - **base_offset**: Offset assigned to the first record (default: 0)
//! - **partition_leader_epoch**: Written verbatim into magic 2 headers (default: -1)
//! - **timestamp_type**: `create_time` or `log_append_time` (default: create_time)
//! - **producer**: Idempotent producer id, epoch and base sequence (default: all -1)
//! - **transactional**: Mark the batch as part of a transaction (default: false)
//!
//! ## Usage
//!
//! ```ignore
//! use kafka_records_batch::WriterConfig;
//!
//! let config = WriterConfig {
//!     compression: CompressionType::Lz4,
//!     max_batch_size: 1024 * 1024,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use kafka_records_core::{CompressionType, Error, Result};
use serde::{Deserialize, Serialize};

use crate::batch::{
    EncodeOptions, ProducerMetadata, TimestampType, CURRENT_MAGIC, MAGIC_V0, MAGIC_V1, MAGIC_V2,
    NO_PARTITION_LEADER_EPOCH,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Format generation (default: 2)
    #[serde(default = "default_magic")]
    pub magic: i8,

    /// Payload compression (default: none)
    #[serde(default)]
    pub compression: CompressionType,

    /// Maximum batch size in bytes before the writer reports full (default: 16KB)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Offset of the first record (default: 0)
    #[serde(default)]
    pub base_offset: i64,

    /// Leader epoch stamped into magic 2 headers (default: -1)
    #[serde(default = "default_partition_leader_epoch")]
    pub partition_leader_epoch: i32,

    /// Timestamp semantics (default: create_time)
    #[serde(default)]
    pub timestamp_type: TimestampType,

    /// Idempotent producer fields (default: none)
    #[serde(default)]
    pub producer: ProducerMetadata,

    /// Transactional batch flag (default: false)
    #[serde(default)]
    pub transactional: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            magic: default_magic(),
            compression: CompressionType::None,
            max_batch_size: default_max_batch_size(),
            base_offset: 0,
            partition_leader_epoch: default_partition_leader_epoch(),
            timestamp_type: TimestampType::CreateTime,
            producer: ProducerMetadata::default(),
            transactional: false,
        }
    }
}

fn default_magic() -> i8 {
    CURRENT_MAGIC
}

fn default_max_batch_size() -> usize {
    16 * 1024 // 16KB, the producer's default batch.size
}

fn default_partition_leader_epoch() -> i32 {
    NO_PARTITION_LEADER_EPOCH
}

impl WriterConfig {
    /// Reject settings the chosen format generation cannot carry
    pub fn validate(&self) -> Result<()> {
        match self.magic {
            MAGIC_V2 => Ok(()),
            MAGIC_V0 | MAGIC_V1 => {
                if self.transactional || !self.producer.is_unset() {
                    return Err(Error::InvalidBatch(format!(
                        "producer and transactional fields need magic 2, got magic {}",
                        self.magic
                    )));
                }
                if self.magic == MAGIC_V0 && self.timestamp_type == TimestampType::LogAppendTime {
                    return Err(Error::InvalidBatch(
                        "magic 0 has no timestamps".to_string(),
                    ));
                }
                Ok(())
            }
            other => Err(Error::UnsupportedMagic(other)),
        }
    }

    /// Batch-level encode options for a batch starting at `base_timestamp`
    pub fn encode_options(&self, base_timestamp: i64) -> EncodeOptions {
        EncodeOptions {
            magic: self.magic,
            base_offset: self.base_offset,
            base_timestamp,
            partition_leader_epoch: self.partition_leader_epoch,
            compression: self.compression,
            timestamp_type: self.timestamp_type,
            producer: self.producer,
            transactional: self.transactional,
            control: false,
        }
    }
}

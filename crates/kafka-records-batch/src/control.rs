//! Control Records
//!
//! Transaction markers are written as single-record batches with the control
//! attribute bit set. The record key says what kind of marker it is:
//!
//! ```text
//! version  int16   must be 0
//! type     int16   0 = abort, 1 = commit
//! ```
//!
//! and the value carries the end-transaction marker:
//!
//! ```text
//! version            int16   must be 0
//! coordinatorEpoch   int32
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use kafka_records_core::{Error, Record, Result};
use serde::{Deserialize, Serialize};

pub const CONTROL_RECORD_VERSION: i16 = 0;
pub const END_TXN_MARKER_VERSION: i16 = 0;

const CONTROL_KEY_LEN: usize = 4;
const END_TXN_VALUE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlRecordType {
    Abort,
    Commit,
}

impl ControlRecordType {
    pub fn id(&self) -> i16 {
        match self {
            ControlRecordType::Abort => 0,
            ControlRecordType::Commit => 1,
        }
    }
}

impl TryFrom<i16> for ControlRecordType {
    type Error = Error;

    fn try_from(id: i16) -> Result<Self> {
        match id {
            0 => Ok(ControlRecordType::Abort),
            1 => Ok(ControlRecordType::Commit),
            other => Err(Error::InvalidRecord(format!(
                "Unknown control record type: {}",
                other
            ))),
        }
    }
}

/// Decoded control record key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub kind: ControlRecordType,
}

impl ControlRecord {
    pub fn new(kind: ControlRecordType) -> Self {
        Self { kind }
    }

    pub fn parse(key: &[u8]) -> Result<Self> {
        if key.len() < CONTROL_KEY_LEN {
            return Err(Error::TruncatedRecord(format!(
                "control record key of {} bytes, expected {}",
                key.len(),
                CONTROL_KEY_LEN
            )));
        }

        let mut buf = key;
        let version = buf.get_i16();
        if version != CONTROL_RECORD_VERSION {
            return Err(Error::InvalidRecord(format!(
                "Unknown control record version: {}",
                version
            )));
        }
        let kind = ControlRecordType::try_from(buf.get_i16())?;
        Ok(Self { kind })
    }

    pub fn to_key(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CONTROL_KEY_LEN);
        buf.put_i16(CONTROL_RECORD_VERSION);
        buf.put_i16(self.kind.id());
        buf.freeze()
    }
}

/// Value of a commit/abort control record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTransactionMarker {
    pub kind: ControlRecordType,
    pub coordinator_epoch: i32,
}

impl EndTransactionMarker {
    pub fn new(kind: ControlRecordType, coordinator_epoch: i32) -> Self {
        Self {
            kind,
            coordinator_epoch,
        }
    }

    /// Parse a marker from a control record's key and value
    pub fn parse(key: &[u8], value: &[u8]) -> Result<Self> {
        let control = ControlRecord::parse(key)?;
        if value.len() < END_TXN_VALUE_LEN {
            return Err(Error::TruncatedRecord(format!(
                "end transaction marker of {} bytes, expected {}",
                value.len(),
                END_TXN_VALUE_LEN
            )));
        }

        let mut buf = value;
        let version = buf.get_i16();
        if version != END_TXN_MARKER_VERSION {
            return Err(Error::InvalidRecord(format!(
                "Unknown end transaction marker version: {}",
                version
            )));
        }
        Ok(Self {
            kind: control.kind,
            coordinator_epoch: buf.get_i32(),
        })
    }

    pub fn to_value(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(END_TXN_VALUE_LEN);
        buf.put_i16(END_TXN_MARKER_VERSION);
        buf.put_i32(self.coordinator_epoch);
        buf.freeze()
    }

    /// The single record of a control batch carrying this marker
    pub fn into_record(self) -> Record {
        Record::new(
            0,
            0,
            Some(ControlRecord::new(self.kind).to_key()),
            Some(self.to_value()),
        )
    }
}

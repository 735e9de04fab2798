//! Metadata exchange extension (ut_metadata, BEP-9).
//!
//! A data message is a bencoded dictionary immediately followed by the raw
//! piece bytes. [`decode_prefix`] tells us where the dictionary ends, so the
//! trailer is whatever follows it.

use bytes::Bytes;

use super::error::WireError;
use crate::bencode::{decode_prefix, encode, Value};
use crate::constants::METADATA_PIECE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMessageType {
    Request = 0,
    Data = 1,
    Reject = 2,
}

impl MetadataMessageType {
    pub fn from_integer(i: i64) -> Option<Self> {
        match i {
            0 => Some(MetadataMessageType::Request),
            1 => Some(MetadataMessageType::Data),
            2 => Some(MetadataMessageType::Reject),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> i64 {
        *self as i64
    }
}

/// A ut_metadata message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMessage {
    pub msg_type: MetadataMessageType,
    pub piece: u32,
    /// Only present in data messages.
    pub total_size: Option<i64>,
    /// The raw piece bytes of a data message.
    pub data: Bytes,
}

impl MetadataMessage {
    pub fn request(piece: u32) -> Self {
        Self {
            msg_type: MetadataMessageType::Request,
            piece,
            total_size: None,
            data: Bytes::new(),
        }
    }

    pub fn data(piece: u32, total_size: i64, data: Bytes) -> Self {
        Self {
            msg_type: MetadataMessageType::Data,
            piece,
            total_size: Some(total_size),
            data,
        }
    }

    pub fn reject(piece: u32) -> Self {
        Self {
            msg_type: MetadataMessageType::Reject,
            piece,
            total_size: None,
            data: Bytes::new(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut entries = vec![
            (b"msg_type".as_slice(), Value::Integer(self.msg_type.as_integer())),
            (b"piece".as_slice(), Value::Integer(self.piece as i64)),
        ];
        if let Some(total_size) = self.total_size {
            entries.push((b"total_size".as_slice(), Value::Integer(total_size)));
        }

        let mut out = encode(&Value::dict(entries));
        out.extend_from_slice(&self.data);
        Bytes::from(out)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let (header, header_len) = decode_prefix(payload)?;
        if header.as_dict().is_none() {
            return Err(WireError::violation("metadata header is not a dict"));
        }

        let msg_type = header
            .get_integer(b"msg_type")
            .and_then(MetadataMessageType::from_integer)
            .ok_or_else(|| WireError::violation("missing or unknown msg_type"))?;

        let piece = header
            .get_integer(b"piece")
            .and_then(|p| u32::try_from(p).ok())
            .ok_or_else(|| WireError::violation("missing or invalid piece index"))?;

        Ok(Self {
            msg_type,
            piece,
            total_size: header.get_integer(b"total_size"),
            data: Bytes::copy_from_slice(&payload[header_len..]),
        })
    }
}

/// Number of 16 KiB pieces needed to carry `metadata_size` bytes.
pub fn metadata_piece_count(metadata_size: usize) -> usize {
    metadata_size.div_ceil(METADATA_PIECE_SIZE)
}

use super::error::WireError;
use crate::constants::{EXTENDED_MESSAGE_ID, PROTOCOL};
use bytes::{BufMut, Bytes, BytesMut};

/// Fixed part of the handshake after the protocol string:
/// 8 reserved bytes, 20-byte infohash, 20-byte peer id.
pub const HANDSHAKE_TAIL_LEN: usize = 48;

/// A BEP-3 handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Our outgoing handshake: extension protocol (BEP-10) and DHT bits set.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut reserved = [0u8; 8];
        reserved[5] |= 0x10;
        reserved[7] |= 0x01;
        Self {
            reserved,
            info_hash,
            peer_id,
        }
    }

    pub fn supports_extension_protocol(&self) -> bool {
        (self.reserved[5] & 0x10) != 0
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + PROTOCOL.len() + HANDSHAKE_TAIL_LEN);
        buf.put_u8(PROTOCOL.len() as u8);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.freeze()
    }

    /// Parses everything after the length byte: `pstr_len` bytes of protocol
    /// string followed by the 48-byte tail.
    pub fn decode_body(pstr_len: usize, body: &[u8]) -> Result<Self, WireError> {
        if body.len() != pstr_len + HANDSHAKE_TAIL_LEN {
            return Err(WireError::violation("truncated handshake"));
        }

        if &body[..pstr_len] != PROTOCOL {
            return Err(WireError::violation("unknown protocol identifier"));
        }

        let tail = &body[pstr_len..];
        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&tail[..8]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&tail[8..28]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&tail[28..48]);

        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }
}

/// Frames a BEP-10 extended message: length prefix, message id 20, the
/// extended id, then the payload.
pub fn extended_frame(ext_id: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(6 + payload.len());
    buf.put_u32(2 + payload.len() as u32);
    buf.put_u8(EXTENDED_MESSAGE_ID);
    buf.put_u8(ext_id);
    buf.put_slice(payload);
    buf.freeze()
}

use bytes::{Buf, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tracing::trace;

use super::error::WireError;
use super::extension::{ExtensionHandshake, UT_METADATA};
use super::handshake::{extended_frame, Handshake, HANDSHAKE_TAIL_LEN};
use super::metadata::{metadata_piece_count, MetadataMessage, MetadataMessageType};
use super::peer_id::PeerId;
use super::pieces::PieceSet;
use crate::bencode::{decode, encode, Value};
use crate::constants::{
    EXTENDED_MESSAGE_ID, EXTENSION_HANDSHAKE_ID, LOCAL_UT_METADATA_ID, MAX_MESSAGE_LEN,
    MAX_METADATA_SIZE, METADATA_PIECE_SIZE,
};
use crate::metainfo::InfoHash;

/// Where a [`WireSession`] is in the exchange. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitHandshakeHeader,
    AwaitHandshakeBody { pstr_len: usize },
    AwaitExtHandshake,
    AwaitMessage,
    Done,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// Reassembly target for the metadata once the peer has told us its size.
#[derive(Debug)]
struct MetadataBuffer {
    bytes: Vec<u8>,
    pieces: PieceSet,
    remote_id: u8,
}

/// Sans-IO BitTorrent metadata session.
///
/// The caller feeds every byte read from the socket into [`feed`] and writes
/// whatever [`take_outgoing`] returns. The session never touches the network
/// itself, so the full exchange can be driven from byte fixtures.
///
/// A session produces exactly one outcome: `feed` returns `Ok(Some(info))`
/// once, or `Err` once. After either, further input is ignored.
///
/// [`feed`]: WireSession::feed
/// [`take_outgoing`]: WireSession::take_outgoing
#[derive(Debug)]
pub struct WireSession {
    info_hash: InfoHash,
    peer_id: PeerId,
    state: SessionState,
    buffer: BytesMut,
    /// Length of the message body being awaited, once its prefix was read.
    message_len: Option<usize>,
    outgoing: BytesMut,
    metadata: Option<MetadataBuffer>,
    remote_peer_id: Option<[u8; 20]>,
}

impl WireSession {
    pub fn new(info_hash: InfoHash) -> Self {
        Self::with_peer_id(info_hash, PeerId::generate())
    }

    pub fn with_peer_id(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self {
            info_hash,
            peer_id,
            state: SessionState::AwaitHandshakeHeader,
            buffer: BytesMut::with_capacity(1024),
            message_len: None,
            outgoing: BytesMut::new(),
            metadata: None,
            remote_peer_id: None,
        }
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info_hash
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remote_peer_id(&self) -> Option<&[u8; 20]> {
        self.remote_peer_id.as_ref()
    }

    /// Total metadata size the peer advertised, once known.
    pub fn metadata_size(&self) -> Option<usize> {
        self.metadata.as_ref().map(|m| m.bytes.len())
    }

    pub fn pieces_received(&self) -> usize {
        self.metadata.as_ref().map_or(0, |m| m.pieces.count())
    }

    /// Queues our BEP-3 handshake. Call once, right after connecting.
    pub fn send_handshake(&mut self) {
        let handshake = Handshake::new(*self.info_hash.as_bytes(), *self.peer_id.as_bytes());
        self.outgoing.extend_from_slice(&handshake.encode());
    }

    /// Bytes that should be written to the peer, if any are pending.
    pub fn take_outgoing(&mut self) -> Option<Bytes> {
        if self.outgoing.is_empty() {
            None
        } else {
            Some(self.outgoing.split().freeze())
        }
    }

    /// Consumes bytes read from the peer.
    ///
    /// Returns the verified info dictionary once the last piece arrives. Any
    /// error moves the session to [`SessionState::Failed`] and frees its
    /// buffers.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<Value>, WireError> {
        if self.state.is_terminal() {
            return Ok(None);
        }

        self.buffer.extend_from_slice(data);
        match self.process() {
            Ok(Some(info)) => {
                self.finish(SessionState::Done);
                Ok(Some(info))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.finish(SessionState::Failed);
                Err(e)
            }
        }
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.buffer = BytesMut::new();
        self.metadata = None;
    }

    fn process(&mut self) -> Result<Option<Value>, WireError> {
        loop {
            match self.state {
                SessionState::AwaitHandshakeHeader => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    let pstr_len = self.buffer.get_u8() as usize;
                    self.state = SessionState::AwaitHandshakeBody { pstr_len };
                }
                SessionState::AwaitHandshakeBody { pstr_len } => {
                    let needed = pstr_len + HANDSHAKE_TAIL_LEN;
                    if self.buffer.len() < needed {
                        return Ok(None);
                    }
                    let body = self.buffer.split_to(needed);
                    self.on_handshake(Handshake::decode_body(pstr_len, &body)?)?;
                }
                SessionState::AwaitExtHandshake | SessionState::AwaitMessage => {
                    let Some(message) = self.next_message()? else {
                        return Ok(None);
                    };
                    if let Some(info) = self.on_message(message)? {
                        return Ok(Some(info));
                    }
                }
                SessionState::Done | SessionState::Failed => return Ok(None),
            }
        }
    }

    /// Splits the next complete length-prefixed message off the buffer,
    /// skipping keep-alives.
    fn next_message(&mut self) -> Result<Option<Bytes>, WireError> {
        loop {
            match self.message_len {
                None => {
                    if self.buffer.len() < 4 {
                        return Ok(None);
                    }
                    let len = self.buffer.get_u32() as usize;
                    if len == 0 {
                        continue;
                    }
                    if len > MAX_MESSAGE_LEN {
                        return Err(WireError::violation(format!(
                            "message length {} exceeds {}",
                            len, MAX_MESSAGE_LEN
                        )));
                    }
                    self.message_len = Some(len);
                }
                Some(len) => {
                    if self.buffer.len() < len {
                        return Ok(None);
                    }
                    self.message_len = None;
                    return Ok(Some(self.buffer.split_to(len).freeze()));
                }
            }
        }
    }

    fn on_handshake(&mut self, handshake: Handshake) -> Result<(), WireError> {
        if !handshake.supports_extension_protocol() {
            return Err(WireError::violation("peer does not support extensions"));
        }
        self.remote_peer_id = Some(handshake.peer_id);

        let ours = ExtensionHandshake::with_extensions(&[(UT_METADATA, LOCAL_UT_METADATA_ID)]);
        self.outgoing
            .extend_from_slice(&extended_frame(EXTENSION_HANDSHAKE_ID, &ours.encode()));
        self.state = SessionState::AwaitExtHandshake;
        Ok(())
    }

    fn on_message(&mut self, message: Bytes) -> Result<Option<Value>, WireError> {
        if message[0] != EXTENDED_MESSAGE_ID {
            return Ok(None);
        }
        if message.len() < 2 {
            return Err(WireError::violation("extended message without id"));
        }
        let payload = &message[2..];

        match (self.state, message[1]) {
            (SessionState::AwaitExtHandshake, EXTENSION_HANDSHAKE_ID) => {
                self.on_ext_handshake(ExtensionHandshake::decode(payload)?)?;
                Ok(None)
            }
            (SessionState::AwaitMessage, LOCAL_UT_METADATA_ID) => {
                self.on_metadata(MetadataMessage::decode(payload)?)
            }
            (_, id) => {
                trace!(id, "ignoring extended message");
                Ok(None)
            }
        }
    }

    fn on_ext_handshake(&mut self, handshake: ExtensionHandshake) -> Result<(), WireError> {
        let size = handshake
            .metadata_size
            .filter(|&s| s > 0)
            .ok_or_else(|| WireError::violation("missing metadata_size"))?;
        if size > MAX_METADATA_SIZE as i64 {
            return Err(WireError::SizeLimitExceeded {
                what: "metadata_size",
                size: size as u64,
                limit: MAX_METADATA_SIZE as u64,
            });
        }
        let remote_id = handshake
            .get_extension_id(UT_METADATA)
            .ok_or_else(|| WireError::violation("peer does not support ut_metadata"))?;

        let size = size as usize;
        let piece_count = metadata_piece_count(size);
        for piece in 0..piece_count {
            let request = MetadataMessage::request(piece as u32).encode();
            self.outgoing
                .extend_from_slice(&extended_frame(remote_id, &request));
        }

        self.metadata = Some(MetadataBuffer {
            bytes: vec![0; size],
            pieces: PieceSet::new(piece_count),
            remote_id,
        });
        self.state = SessionState::AwaitMessage;
        Ok(())
    }

    fn on_metadata(&mut self, msg: MetadataMessage) -> Result<Option<Value>, WireError> {
        match msg.msg_type {
            MetadataMessageType::Data => {}
            MetadataMessageType::Reject => {
                return Err(WireError::violation(format!(
                    "peer rejected piece {}",
                    msg.piece
                )))
            }
            MetadataMessageType::Request => {
                return Err(WireError::violation("unexpected metadata request"))
            }
        }

        if msg.data.len() > METADATA_PIECE_SIZE {
            return Err(WireError::SizeLimitExceeded {
                what: "metadata piece",
                size: msg.data.len() as u64,
                limit: METADATA_PIECE_SIZE as u64,
            });
        }

        let Some(metadata) = self.metadata.as_mut() else {
            return Ok(None);
        };

        let index = msg.piece as usize;
        if index >= metadata.pieces.piece_count() {
            return Err(WireError::violation(format!(
                "piece {} out of range",
                index
            )));
        }
        let offset = index * METADATA_PIECE_SIZE;
        let end = offset + msg.data.len();
        if end > metadata.bytes.len() {
            return Err(WireError::violation(format!(
                "piece {} overruns metadata buffer",
                index
            )));
        }

        metadata.bytes[offset..end].copy_from_slice(&msg.data);
        metadata.pieces.set(index);
        trace!(
            piece = index,
            received = metadata.pieces.count(),
            total = metadata.pieces.piece_count(),
            peer_ut_metadata = metadata.remote_id,
            "metadata piece"
        );

        if !metadata.pieces.is_complete() {
            return Ok(None);
        }
        self.verify().map(Some)
    }

    /// Decodes the reassembled buffer and checks it against the infohash.
    ///
    /// Some peers wrap the info dictionary in an outer `{info: ...}`; only
    /// the inner dictionary is hashed then. Otherwise the raw bytes are.
    fn verify(&self) -> Result<Value, WireError> {
        let bytes = match self.metadata.as_ref() {
            Some(metadata) => &metadata.bytes,
            None => return Err(WireError::violation("no metadata buffer")),
        };

        let decoded = decode(bytes)?;
        let wrapped = match decoded.get(b"info") {
            Some(info @ Value::Dict(_)) => Some(info.clone()),
            _ => None,
        };
        let (info, digest) = match wrapped {
            Some(info) => {
                let digest = sha1_digest(&encode(&info));
                (info, digest)
            }
            None => (decoded, sha1_digest(bytes)),
        };

        if info.as_dict().is_none() {
            return Err(WireError::violation("metadata is not a dictionary"));
        }
        if digest != *self.info_hash.as_bytes() {
            return Err(WireError::ChecksumMismatch);
        }
        Ok(info)
    }
}

fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

//! Peer wire protocol for metadata retrieval (BEP-3, BEP-9, BEP-10).
//!
//! The crawler never downloads payload. A session performs the BitTorrent
//! handshake, negotiates the extension protocol, requests every ut_metadata
//! piece at once and verifies the reassembled info dictionary against the
//! requested infohash.
//!
//! [`WireSession`] is a pure state machine over bytes; [`fetch_metadata`]
//! drives one over a TCP connection with connect and inactivity timeouts.

mod connection;
mod error;
mod extension;
mod handshake;
mod metadata;
mod peer_id;
mod pieces;
mod session;

pub use connection::{drive, fetch_metadata};
pub use error::WireError;
pub use extension::{ExtensionHandshake, UT_METADATA};
pub use handshake::{extended_frame, Handshake, HANDSHAKE_TAIL_LEN};
pub use metadata::{metadata_piece_count, MetadataMessage, MetadataMessageType};
pub use peer_id::PeerId;
pub use pieces::PieceSet;
pub use session::{SessionState, WireSession};

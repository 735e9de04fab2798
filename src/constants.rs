//! Protocol constants and tuning defaults.
//!
//! Protocol values come straight from BEP-3, BEP-5, BEP-9 and BEP-10. The
//! tuning defaults are the ones [`SpiderConfig`](crate::config::SpiderConfig)
//! falls back to when nothing is configured.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Peer id prefix used in outgoing BitTorrent handshakes (Azureus-style)
pub const CLIENT_PREFIX: &[u8; 8] = b"-MS0001-";

// ============================================================================
// Peer wire protocol (BEP-3 / BEP-10 / BEP-9)
// ============================================================================

/// Protocol identifier carried in every handshake
pub const PROTOCOL: &[u8] = b"BitTorrent protocol";

/// Message id of BEP-10 extended messages
pub const EXTENDED_MESSAGE_ID: u8 = 20;

/// Extended message id reserved for the extension handshake
pub const EXTENSION_HANDSHAKE_ID: u8 = 0;

/// The id we ask peers to use when sending us ut_metadata messages
pub const LOCAL_UT_METADATA_ID: u8 = 1;

/// Size of one metadata piece (BEP-9)
pub const METADATA_PIECE_SIZE: usize = 16 * 1024;

/// Largest `metadata_size` a peer may advertise before we refuse to allocate
pub const MAX_METADATA_SIZE: usize = 10_000_000;

/// Upper bound on a single length-prefixed message. A metadata data message
/// is one piece plus a short bencoded header, so anything near this is hostile.
pub const MAX_MESSAGE_LEN: usize = 1 << 20;

// ============================================================================
// DHT (BEP-5)
// ============================================================================

/// Nodes returned in `find_node` / `get_peers` replies
pub const K: usize = 8;

/// Length of a compact node entry: 20-byte id, 4-byte IPv4, 2-byte port
pub const COMPACT_NODE_LEN: usize = 26;

/// Length of a compact IPv4 peer entry
pub const COMPACT_PEER_LEN: usize = 6;

/// How long an announce token secret stays current
pub const TOKEN_ROTATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Large enough for any KRPC datagram
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// KRPC error code for a malformed or unauthorised query
pub const KRPC_PROTOCOL_ERROR: i64 = 203;

/// KRPC error code for an unknown query method
pub const KRPC_METHOD_UNKNOWN: i64 = 204;

pub const BOOTSTRAP_NODES: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
];

// ============================================================================
// Crawler defaults
// ============================================================================

/// Default UDP port for the DHT listener
pub const DEFAULT_PORT: u16 = 6881;

/// Routing table capacity
pub const DEFAULT_NODES_MAX_SIZE: usize = 4000;

/// Concurrent outbound metadata sessions
pub const DEFAULT_MAX_CONNECTIONS: usize = 200;

/// Alternate peers buffered per infohash while an attempt is outstanding
pub const DEFAULT_QUEUE_PER_LIMIT: usize = 10;

/// Connect and inactivity timeout for one metadata session
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the crawler walks the routing table while idle
pub const DEFAULT_WALK_INTERVAL: Duration = Duration::from_secs(1);

//! magnet-spider - A Mainline DHT metadata crawler
//!
//! This library joins the BitTorrent DHT, listens for the infohashes other
//! nodes announce, and fetches each torrent's info dictionary directly from
//! the announcing peer. No file payload is ever downloaded.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`metainfo`] - Infohashes and recovered torrent metadata
//! - [`dht`] - BEP-5 crawler: routing table, KRPC, announce harvesting
//! - [`wire`] - BEP-3/9/10 metadata session over the peer wire protocol
//! - [`client`] - Peer queue and bounded connection scheduler
//! - [`spider`] - The crawler entry point tying it all together
//! - [`config`] - Spider configuration

pub mod bencode;
pub mod client;
pub mod config;
pub mod constants;
pub mod dht;
pub mod metainfo;
pub mod spider;
pub mod wire;

pub use bencode::{decode, encode, BencodeError, Value};
pub use client::{Admission, AdmitAll, AttemptOutcome, CandidateWork, ConnectionScheduler, PeerQueue};
pub use config::{ConfigError, SpiderConfig};
pub use dht::{DhtCrawler, DhtError, KrpcMessage, NodeContact, NodeId, RoutingTable};
pub use metainfo::{FileEntry, InfoHash, MetainfoError, TorrentMetadata};
pub use spider::{Spider, SpiderError, SpiderHandle};
pub use wire::{fetch_metadata, PeerId, WireError, WireSession};

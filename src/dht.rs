//! Mainline DHT crawler (BEP-5)
//!
//! Just enough of Kademlia to be routed announcements: a bounded contact
//! list, the KRPC codec, and a crawler that answers queries and walks the
//! network.

mod crawler;
mod error;
mod message;
mod node;
mod routing;

pub use crawler::{resolve_bootstrap, DhtCrawler};
pub use error::DhtError;
pub use message::{KrpcMessage, MessageKind, Query, Response, TransactionId};
pub use node::{decode_compact_nodes, encode_compact_nodes, NodeContact, NodeId};
pub use routing::RoutingTable;

#[cfg(test)]
mod tests;

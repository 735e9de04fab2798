use super::error::DhtError;
use crate::constants::COMPACT_NODE_LEN;
use rand::Rng as _;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        rand::rng().fill(&mut id);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| DhtError::InvalidNodeId)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR metric; compares lexicographically as a big-endian number.
    pub fn distance(&self, other: &NodeId) -> [u8; 20] {
        std::array::from_fn(|i| self.0[i] ^ other.0[i])
    }

    /// An id that shares its first 10 bytes with `target` and its last 10
    /// with `self`.
    ///
    /// Remote nodes see such an id as very close to `target`, so they keep
    /// routing traffic for that part of the keyspace to us.
    pub fn neighbor(&self, target: &[u8; 20]) -> NodeId {
        let mut id = self.0;
        id[..10].copy_from_slice(&target[..10]);
        NodeId(id)
    }
}

impl From<[u8; 20]> for NodeId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A DHT participant we may send queries to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeContact {
    pub id: NodeId,
    pub addr: SocketAddr,
}

impl NodeContact {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }

    pub fn from_compact(data: &[u8]) -> Option<Self> {
        if data.len() != COMPACT_NODE_LEN {
            return None;
        }

        let id = NodeId::from_bytes(&data[..20]).ok()?;
        let ip = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let port = u16::from_be_bytes([data[24], data[25]]);

        Some(Self::new(id, SocketAddr::new(IpAddr::V4(ip), port)))
    }

    /// IPv6 contacts have no 26-byte compact form.
    pub fn to_compact(&self) -> Option<[u8; COMPACT_NODE_LEN]> {
        let mut compact = [0u8; COMPACT_NODE_LEN];
        compact[..20].copy_from_slice(&self.id.0);

        match self.addr {
            SocketAddr::V4(v4) => {
                compact[20..24].copy_from_slice(&v4.ip().octets());
                compact[24..26].copy_from_slice(&v4.port().to_be_bytes());
                Some(compact)
            }
            SocketAddr::V6(_) => None,
        }
    }
}

/// Decodes a compact `nodes` string. A trailing partial entry is ignored.
pub fn decode_compact_nodes(data: &[u8]) -> Vec<NodeContact> {
    data.chunks_exact(COMPACT_NODE_LEN)
        .filter_map(NodeContact::from_compact)
        .collect()
}

pub fn encode_compact_nodes(nodes: &[NodeContact]) -> Vec<u8> {
    nodes.iter().filter_map(|n| n.to_compact()).flatten().collect()
}

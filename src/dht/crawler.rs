use super::error::DhtError;
use super::message::{KrpcMessage, MessageKind, Query, Response, TransactionId};
use super::node::{NodeContact, NodeId};
use super::routing::RoutingTable;
use crate::client::CandidateWork;
use crate::constants::{K, KRPC_METHOD_UNKNOWN, KRPC_PROTOCOL_ERROR};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

struct TokenSecrets {
    current: [u8; 16],
    previous: [u8; 16],
}

impl TokenSecrets {
    fn new() -> Self {
        Self {
            current: rand::random(),
            previous: rand::random(),
        }
    }

    fn rotate(&mut self) {
        self.previous = self.current;
        self.current = rand::random();
    }
}

/// A minimal DHT participant that harvests announcements.
///
/// The crawler answers every query so that other nodes keep it in their
/// routing tables, pretends to be close to whatever infohash it is asked
/// about, and turns each valid `announce_peer` into [`CandidateWork`]. It
/// never looks anything up on its own behalf; [`walk`](Self::walk) only
/// spreads its presence by sending `find_node` to every contact it learns.
///
/// The crawler is driven from outside: the owner awaits
/// [`recv_from`](Self::recv_from) and hands each datagram to
/// [`handle_datagram`](Self::handle_datagram).
pub struct DhtCrawler {
    socket: UdpSocket,
    local_addr: SocketAddr,
    table: RoutingTable,
    secrets: TokenSecrets,
    bootstrap_addrs: Vec<SocketAddr>,
}

impl DhtCrawler {
    pub async fn bind(
        addr: SocketAddr,
        nodes_max_size: usize,
    ) -> Result<Self, DhtError> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let our_id = NodeId::generate();

        info!("DHT crawler bound to {} with id {}", local_addr, our_id);

        Ok(Self {
            socket,
            local_addr,
            table: RoutingTable::new(our_id, nodes_max_size),
            secrets: TokenSecrets::new(),
            bootstrap_addrs: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn our_id(&self) -> &NodeId {
        self.table.our_id()
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    /// Processes one inbound datagram, replying if it is a query.
    ///
    /// Malformed input is logged and dropped.
    pub async fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) -> Option<CandidateWork> {
        let msg = match KrpcMessage::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                trace!("dropping datagram from {}: {}", from, e);
                return None;
            }
        };

        match msg.kind {
            MessageKind::Query { sender, query } => {
                self.handle_query(msg.transaction_id, from, sender, query)
                    .await
            }
            MessageKind::Response(response) => {
                self.handle_response(response);
                None
            }
            MessageKind::Error { code, message } => {
                trace!("KRPC error {} from {}: {}", code, from, message);
                None
            }
        }
    }

    fn handle_response(&mut self, response: Response) {
        for contact in response.nodes {
            if self.is_usable(&contact) && !self.table.push(contact) {
                break;
            }
        }
    }

    fn is_usable(&self, contact: &NodeContact) -> bool {
        contact.id != *self.our_id()
            && contact.addr.port() != 0
            && contact.addr.is_ipv4()
            && !contact.addr.ip().is_unspecified()
    }

    async fn handle_query(
        &mut self,
        tid: TransactionId,
        from: SocketAddr,
        sender: Option<NodeId>,
        query: Query,
    ) -> Option<CandidateWork> {
        let our_id = *self.our_id();
        let mut work = None;

        let reply = match query {
            Query::Ping => {
                let id = sender.map_or(our_id, |s| our_id.neighbor(s.as_bytes()));
                KrpcMessage::response(tid, Response::new(id))
            }
            Query::FindNode { target } => {
                let nodes = self.table.closest(&target, K);
                KrpcMessage::response(
                    tid,
                    Response::new(our_id.neighbor(target.as_bytes())).with_nodes(nodes),
                )
            }
            Query::GetPeers { info_hash } => {
                let target = NodeId::from(*info_hash.as_bytes());
                let nodes = self.table.closest(&target, K);
                let token = self.token_for(&from.ip(), &self.secrets.current);
                KrpcMessage::response(
                    tid,
                    Response::new(our_id.neighbor(info_hash.as_bytes()))
                        .with_nodes(nodes)
                        .with_token(token),
                )
            }
            Query::AnnouncePeer {
                info_hash,
                port,
                token,
                implied_port,
            } => {
                let port = if implied_port { from.port() } else { port };
                if !self.validate_token(&from.ip(), &token) {
                    debug!("rejecting announce_peer from {}: invalid token", from);
                    KrpcMessage::error(tid, KRPC_PROTOCOL_ERROR, "Invalid token")
                } else if port == 0 {
                    debug!("rejecting announce_peer from {}: port 0", from);
                    KrpcMessage::error(tid, KRPC_PROTOCOL_ERROR, "Invalid port")
                } else {
                    let peer = SocketAddr::new(from.ip(), port);
                    trace!("announce {} from {}", info_hash, peer);
                    work = Some(CandidateWork::new(info_hash, peer));
                    KrpcMessage::response(tid, Response::new(our_id.neighbor(info_hash.as_bytes())))
                }
            }
            Query::Unknown(method) => {
                trace!("unknown method {:?} from {}", method, from);
                KrpcMessage::error(tid, KRPC_METHOD_UNKNOWN, "Method Unknown")
            }
        };

        self.send(&reply, from).await;
        work
    }

    /// Sets the addresses [`join`](Self::join) sends to.
    pub fn set_bootstrap(&mut self, addrs: Vec<SocketAddr>) {
        debug!("using {} bootstrap addresses", addrs.len());
        self.bootstrap_addrs = addrs;
    }

    /// Sends `find_node` for our own neighbourhood to every bootstrap node.
    /// Does nothing until [`set_bootstrap`](Self::set_bootstrap) was called.
    pub async fn join(&mut self) {
        let our_id = *self.our_id();
        for addr in self.bootstrap_addrs.clone() {
            let msg = KrpcMessage::find_node(generate_transaction_id(), our_id, NodeId::generate());
            self.send(&msg, addr).await;
        }
    }

    /// Re-joins through the bootstrap nodes, then empties the routing table
    /// by sending each contact a `find_node` under an id adjacent to its own.
    ///
    /// Contacts come back through the replies, so the table refills with
    /// nodes further out in the network on every walk.
    pub async fn walk(&mut self) {
        self.join().await;

        let contacts = self.table.drain();
        trace!("walking {} contacts", contacts.len());

        let our_id = *self.our_id();
        for contact in contacts {
            let sender = our_id.neighbor(contact.id.as_bytes());
            let msg = KrpcMessage::find_node(generate_transaction_id(), sender, NodeId::generate());
            self.send(&msg, contact.addr).await;
        }
    }

    pub fn rotate_tokens(&mut self) {
        self.secrets.rotate();
        debug!("DHT token secret rotated");
    }

    async fn send(&self, msg: &KrpcMessage, addr: SocketAddr) {
        if let Err(e) = self.socket.send_to(&msg.encode(), addr).await {
            trace!("send to {} failed: {}", addr, e);
        }
    }

    fn token_for(&self, ip: &IpAddr, secret: &[u8; 16]) -> Bytes {
        let mut hasher = Sha1::new();
        hasher.update(secret);
        hasher.update(ip.to_string().as_bytes());

        let result = hasher.finalize();
        Bytes::copy_from_slice(&result[..8])
    }

    fn validate_token(&self, ip: &IpAddr, token: &Bytes) -> bool {
        *token == self.token_for(ip, &self.secrets.current)
            || *token == self.token_for(ip, &self.secrets.previous)
    }
}

/// Resolves bootstrap `host:port` names to IPv4 addresses.
///
/// Each lookup is bounded by `lookup_timeout`. While none of the hosts
/// resolve, the whole list is retried every `retry`. An empty list resolves
/// to nothing at once.
pub async fn resolve_bootstrap(
    hosts: Vec<String>,
    lookup_timeout: Duration,
    retry: Duration,
) -> Vec<SocketAddr> {
    if hosts.is_empty() {
        return Vec::new();
    }

    loop {
        let mut resolved = Vec::new();
        for host in &hosts {
            match timeout(lookup_timeout, tokio::net::lookup_host(host.as_str())).await {
                Ok(Ok(addrs)) => resolved.extend(addrs.filter(SocketAddr::is_ipv4)),
                Ok(Err(e)) => warn!("failed to resolve bootstrap node {}: {}", host, e),
                Err(_) => warn!("timed out resolving bootstrap node {}", host),
            }
        }
        if !resolved.is_empty() {
            return resolved;
        }
        tokio::time::sleep(retry).await;
    }
}

fn generate_transaction_id() -> Bytes {
    let id: [u8; 2] = rand::random();
    Bytes::copy_from_slice(&id)
}

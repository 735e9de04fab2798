use super::error::DhtError;
use super::node::{decode_compact_nodes, encode_compact_nodes, NodeContact, NodeId};
use crate::bencode::{decode, encode, Value};
use crate::constants::COMPACT_PEER_LEN;
use crate::metainfo::InfoHash;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub type TransactionId = Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Ping,
    FindNode {
        target: NodeId,
    },
    GetPeers {
        info_hash: InfoHash,
    },
    AnnouncePeer {
        info_hash: InfoHash,
        /// Zero when absent or out of range.
        port: u16,
        token: Bytes,
        implied_port: bool,
    },
    /// A method we do not implement; answered with error 204.
    Unknown(String),
}

impl Query {
    pub fn method(&self) -> &str {
        match self {
            Query::Ping => "ping",
            Query::FindNode { .. } => "find_node",
            Query::GetPeers { .. } => "get_peers",
            Query::AnnouncePeer { .. } => "announce_peer",
            Query::Unknown(method) => method,
        }
    }
}

/// The `r` dictionary of a reply. Which fields are present depends on the
/// query it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: NodeId,
    pub nodes: Vec<NodeContact>,
    pub values: Vec<SocketAddr>,
    pub token: Option<Bytes>,
}

impl Response {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            nodes: Vec::new(),
            values: Vec::new(),
            token: None,
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<NodeContact>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_token(mut self, token: Bytes) -> Self {
        self.token = Some(token);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Query {
        /// `a.id`; required for every method except unknown ones.
        sender: Option<NodeId>,
        query: Query,
    },
    Response(Response),
    Error {
        code: i64,
        message: String,
    },
}

/// A KRPC message (BEP-5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KrpcMessage {
    pub transaction_id: TransactionId,
    pub kind: MessageKind,
}

impl KrpcMessage {
    pub fn query(transaction_id: TransactionId, sender: NodeId, query: Query) -> Self {
        Self {
            transaction_id,
            kind: MessageKind::Query {
                sender: Some(sender),
                query,
            },
        }
    }

    pub fn find_node(transaction_id: TransactionId, sender: NodeId, target: NodeId) -> Self {
        Self::query(transaction_id, sender, Query::FindNode { target })
    }

    pub fn response(transaction_id: TransactionId, response: Response) -> Self {
        Self {
            transaction_id,
            kind: MessageKind::Response(response),
        }
    }

    pub fn error(transaction_id: TransactionId, code: i64, message: impl Into<String>) -> Self {
        Self {
            transaction_id,
            kind: MessageKind::Error {
                code,
                message: message.into(),
            },
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, DhtError> {
        let value = decode(data)?;

        let dict = value
            .as_dict()
            .ok_or_else(|| DhtError::InvalidMessage("expected dict".into()))?;

        let transaction_id = dict
            .get(b"t".as_slice())
            .and_then(|v| v.as_bytes())
            .cloned()
            .ok_or_else(|| DhtError::InvalidMessage("missing transaction id".into()))?;

        let msg_type = dict
            .get(b"y".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| DhtError::InvalidMessage("missing message type".into()))?;

        let kind = match msg_type {
            "q" => Self::parse_query(dict)?,
            "r" => Self::parse_response(dict)?,
            "e" => Self::parse_error(dict)?,
            _ => {
                return Err(DhtError::InvalidMessage(format!(
                    "unknown message type: {}",
                    msg_type
                )))
            }
        };

        Ok(Self {
            transaction_id,
            kind,
        })
    }

    fn parse_query(dict: &BTreeMap<Bytes, Value>) -> Result<MessageKind, DhtError> {
        let method = dict
            .get(b"q".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| DhtError::InvalidMessage("missing query name".into()))?;

        let empty = Value::Dict(BTreeMap::new());
        let args = dict.get(b"a".as_slice()).unwrap_or(&empty);

        let sender = args
            .get_bytes(b"id")
            .and_then(|b| NodeId::from_bytes(b).ok());

        let query = match method {
            "ping" => Query::Ping,
            "find_node" => {
                let target = args
                    .get_bytes(b"target")
                    .and_then(|b| NodeId::from_bytes(b).ok())
                    .ok_or_else(|| DhtError::InvalidMessage("missing target".into()))?;
                Query::FindNode { target }
            }
            "get_peers" => Query::GetPeers {
                info_hash: info_hash_arg(args)?,
            },
            "announce_peer" => {
                let info_hash = info_hash_arg(args)?;

                let port = args
                    .get_integer(b"port")
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(0);

                let token = args
                    .get_bytes(b"token")
                    .cloned()
                    .ok_or_else(|| DhtError::InvalidMessage("missing token".into()))?;

                let implied_port = args.get_integer(b"implied_port") == Some(1);

                Query::AnnouncePeer {
                    info_hash,
                    port,
                    token,
                    implied_port,
                }
            }
            other => Query::Unknown(other.to_string()),
        };

        if sender.is_none() && !matches!(query, Query::Unknown(_)) {
            return Err(DhtError::InvalidMessage("missing sender id".into()));
        }

        Ok(MessageKind::Query { sender, query })
    }

    fn parse_response(dict: &BTreeMap<Bytes, Value>) -> Result<MessageKind, DhtError> {
        let resp = dict
            .get(b"r".as_slice())
            .filter(|v| v.as_dict().is_some())
            .ok_or_else(|| DhtError::InvalidMessage("missing response dict".into()))?;

        let id = resp
            .get_bytes(b"id")
            .and_then(|b| NodeId::from_bytes(b).ok())
            .ok_or_else(|| DhtError::InvalidMessage("missing id in response".into()))?;

        let nodes = resp
            .get_bytes(b"nodes")
            .map(|data| decode_compact_nodes(data))
            .unwrap_or_default();

        let values = resp
            .get(b"values")
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_bytes())
                    .filter_map(|b| decode_compact_peer(b))
                    .collect()
            })
            .unwrap_or_default();

        Ok(MessageKind::Response(Response {
            id,
            nodes,
            values,
            token: resp.get_bytes(b"token").cloned(),
        }))
    }

    fn parse_error(dict: &BTreeMap<Bytes, Value>) -> Result<MessageKind, DhtError> {
        let error = dict
            .get(b"e".as_slice())
            .and_then(|v| v.as_list())
            .ok_or_else(|| DhtError::InvalidMessage("missing error list".into()))?;

        let code = error.first().and_then(|v| v.as_integer()).unwrap_or(0);

        let message = error
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();

        Ok(MessageKind::Error { code, message })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dict = BTreeMap::new();

        dict.insert(
            Bytes::from_static(b"t"),
            Value::Bytes(self.transaction_id.clone()),
        );

        match &self.kind {
            MessageKind::Query { sender, query } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("q"));
                dict.insert(Bytes::from_static(b"q"), Value::string(query.method()));

                let mut args = BTreeMap::new();

                if let Some(id) = sender {
                    args.insert(Bytes::from_static(b"id"), id_value(id));
                }

                match query {
                    Query::Ping | Query::Unknown(_) => {}
                    Query::FindNode { target } => {
                        args.insert(Bytes::from_static(b"target"), id_value(target));
                    }
                    Query::GetPeers { info_hash } => {
                        args.insert(
                            Bytes::from_static(b"info_hash"),
                            Value::from(info_hash.as_bytes().as_slice()),
                        );
                    }
                    Query::AnnouncePeer {
                        info_hash,
                        port,
                        token,
                        implied_port,
                    } => {
                        args.insert(
                            Bytes::from_static(b"info_hash"),
                            Value::from(info_hash.as_bytes().as_slice()),
                        );
                        args.insert(Bytes::from_static(b"port"), Value::Integer(*port as i64));
                        args.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                        if *implied_port {
                            args.insert(Bytes::from_static(b"implied_port"), Value::Integer(1));
                        }
                    }
                }

                dict.insert(Bytes::from_static(b"a"), Value::Dict(args));
            }
            MessageKind::Response(response) => {
                dict.insert(Bytes::from_static(b"y"), Value::string("r"));

                let mut resp = BTreeMap::new();
                resp.insert(Bytes::from_static(b"id"), id_value(&response.id));

                if !response.nodes.is_empty() {
                    resp.insert(
                        Bytes::from_static(b"nodes"),
                        Value::Bytes(Bytes::from(encode_compact_nodes(&response.nodes))),
                    );
                }

                if !response.values.is_empty() {
                    let values = response
                        .values
                        .iter()
                        .filter_map(encode_compact_peer)
                        .map(|b| Value::from(b.as_slice()))
                        .collect();
                    resp.insert(Bytes::from_static(b"values"), Value::List(values));
                }

                if let Some(token) = &response.token {
                    resp.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                }

                dict.insert(Bytes::from_static(b"r"), Value::Dict(resp));
            }
            MessageKind::Error { code, message } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("e"));
                dict.insert(
                    Bytes::from_static(b"e"),
                    Value::List(vec![Value::Integer(*code), Value::string(message)]),
                );
            }
        }

        encode(&Value::Dict(dict))
    }
}

fn id_value(id: &NodeId) -> Value {
    Value::from(id.as_bytes().as_slice())
}

fn info_hash_arg(args: &Value) -> Result<InfoHash, DhtError> {
    args.get_bytes(b"info_hash")
        .and_then(|b| InfoHash::from_bytes(b).ok())
        .ok_or_else(|| DhtError::InvalidMessage("missing info_hash".into()))
}

fn decode_compact_peer(b: &[u8]) -> Option<SocketAddr> {
    if b.len() != COMPACT_PEER_LEN {
        return None;
    }
    let ip = Ipv4Addr::new(b[0], b[1], b[2], b[3]);
    let port = u16::from_be_bytes([b[4], b[5]]);
    Some(SocketAddr::new(IpAddr::V4(ip), port))
}

fn encode_compact_peer(addr: &SocketAddr) -> Option<[u8; COMPACT_PEER_LEN]> {
    match addr {
        SocketAddr::V4(v4) => {
            let mut data = [0u8; COMPACT_PEER_LEN];
            data[..4].copy_from_slice(&v4.ip().octets());
            data[4..6].copy_from_slice(&v4.port().to_be_bytes());
            Some(data)
        }
        SocketAddr::V6(_) => None,
    }
}

use super::*;
use crate::bencode::{decode, Value};
use crate::metainfo::InfoHash;
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

fn addr(last: u8, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
}

fn contact(id: u8, port: u16) -> NodeContact {
    NodeContact::new(NodeId([id; 20]), addr(id, port))
}

#[test]
fn test_node_id_generate() {
    let id1 = NodeId::generate();
    let id2 = NodeId::generate();
    assert_ne!(id1.0, id2.0);
}

#[test]
fn test_node_id_from_bytes_invalid() {
    assert!(NodeId::from_bytes(&[1u8; 10]).is_err());
    assert_eq!(NodeId::from_bytes(&[1u8; 20]).unwrap(), NodeId([1u8; 20]));
}

#[test]
fn test_node_id_distance() {
    let id1 = NodeId([0u8; 20]);
    let id2 = NodeId([0xFF; 20]);
    assert_eq!(id1.distance(&id2), [0xFF; 20]);
    assert_eq!(id1.distance(&id1), [0u8; 20]);
}

#[test]
fn test_neighbor_id() {
    let ours = NodeId([0xAA; 20]);
    let neighbor = ours.neighbor(&[0x11; 20]);
    assert_eq!(&neighbor.0[..10], &[0x11; 10]);
    assert_eq!(&neighbor.0[10..], &[0xAA; 10]);
}

#[test]
fn test_node_compact() {
    let node = contact(1, 6881);
    let compact = node.to_compact().unwrap();
    assert_eq!(NodeContact::from_compact(&compact), Some(node));
    assert!(NodeContact::from_compact(&compact[..25]).is_none());

    let v6 = NodeContact::new(NodeId([1; 20]), "[::1]:6881".parse().unwrap());
    assert!(v6.to_compact().is_none());
}

#[test]
fn test_decode_compact_nodes_ignores_partial_entry() {
    let mut data = encode_compact_nodes(&[contact(1, 1), contact(2, 2)]);
    data.extend_from_slice(&[0u8; 10]);
    let nodes = decode_compact_nodes(&data);
    assert_eq!(nodes, vec![contact(1, 1), contact(2, 2)]);
}

#[test]
fn test_routing_table_bounded() {
    let mut table = RoutingTable::new(NodeId([0; 20]), 3);
    for i in 1..=5 {
        table.push(contact(i, 6881));
    }
    assert_eq!(table.len(), 3);
    assert!(!table.push(contact(9, 6881)));

    let ids: Vec<u8> = table.drain().iter().map(|c| c.id.0[0]).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn test_routing_table_drain() {
    let mut table = RoutingTable::new(NodeId([0; 20]), 2);
    table.push(contact(1, 1));
    table.push(contact(2, 2));

    assert_eq!(table.drain().len(), 2);
    assert!(table.is_empty());
    assert!(table.push(contact(3, 3)));
}

#[test]
fn test_routing_table_closest() {
    let mut table = RoutingTable::new(NodeId([0; 20]), 10);
    for i in [0x80, 0x01, 0x40, 0x02] {
        table.push(contact(i, 6881));
    }

    let closest = table.closest(&NodeId([0; 20]), 2);
    let ids: Vec<u8> = closest.iter().map(|c| c.id.0[0]).collect();
    assert_eq!(ids, vec![0x01, 0x02]);
}

#[test]
fn test_parse_ping_query() {
    let msg = KrpcMessage::parse(b"d1:ad2:id20:abcdefghij0123456789e1:q4:ping1:t2:aa1:y1:qe").unwrap();
    assert_eq!(msg.transaction_id, Bytes::from_static(b"aa"));
    assert_eq!(
        msg.kind,
        MessageKind::Query {
            sender: Some(NodeId(*b"abcdefghij0123456789")),
            query: Query::Ping,
        }
    );
}

#[test]
fn test_parse_announce_peer() {
    let data = b"d1:ad2:id20:abcdefghij012345678912:implied_porti1e9:info_hash20:mnopqrstuvwxyz1234564:porti6881e5:token8:aoeusnthe1:q13:announce_peer1:t2:aa1:y1:qe";
    let msg = KrpcMessage::parse(data).unwrap();
    match msg.kind {
        MessageKind::Query {
            query:
                Query::AnnouncePeer {
                    info_hash,
                    port,
                    token,
                    implied_port,
                },
            ..
        } => {
            assert_eq!(info_hash.as_bytes(), b"mnopqrstuvwxyz123456");
            assert_eq!(port, 6881);
            assert_eq!(token, Bytes::from_static(b"aoeusnth"));
            assert!(implied_port);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parse_unknown_method() {
    let msg = KrpcMessage::parse(b"d1:q6:vote_x1:t2:aa1:y1:qe").unwrap();
    assert_eq!(
        msg.kind,
        MessageKind::Query {
            sender: None,
            query: Query::Unknown("vote_x".into()),
        }
    );
}

#[test]
fn test_parse_rejects_malformed() {
    assert!(KrpcMessage::parse(b"").is_err());
    assert!(KrpcMessage::parse(b"le").is_err());
    assert!(KrpcMessage::parse(b"d1:y1:qe").is_err());
    // known method without a sender id
    assert!(KrpcMessage::parse(b"d1:q4:ping1:t2:aa1:y1:qe").is_err());
    // get_peers with a short infohash
    assert!(KrpcMessage::parse(b"d1:ad2:id20:abcdefghij01234567899:info_hash3:abce1:q9:get_peers1:t2:aa1:y1:qe").is_err());
    assert!(KrpcMessage::parse(b"d1:rd2:id3:abce1:t2:aa1:y1:re").is_err());
}

#[test]
fn test_response_encode_parse() {
    let response = Response::new(NodeId([7; 20]))
        .with_nodes(vec![contact(1, 6881), contact(2, 6882)])
        .with_token(Bytes::from_static(b"tok"));
    let msg = KrpcMessage::response(Bytes::from_static(b"xy"), response.clone());

    let parsed = KrpcMessage::parse(&msg.encode()).unwrap();
    assert_eq!(parsed, msg);
    assert_eq!(parsed.kind, MessageKind::Response(response));
}

#[test]
fn test_parse_response_values() {
    let data = b"d1:rd2:id20:abcdefghij01234567895:token8:aoeusnth6:valuesl6:axje.u6:idhtnmee1:t2:aa1:y1:re";
    let msg = KrpcMessage::parse(data).unwrap();
    let MessageKind::Response(response) = msg.kind else {
        panic!("expected response");
    };
    assert_eq!(response.values.len(), 2);
    assert_eq!(response.token, Some(Bytes::from_static(b"aoeusnth")));
    assert!(response.nodes.is_empty());
}

#[test]
fn test_error_encoding() {
    let msg = KrpcMessage::error(Bytes::from_static(b"aa"), 201, "A Generic Error Ocurred");
    assert_eq!(
        msg.encode(),
        b"d1:eli201e23:A Generic Error Ocurrede1:t2:aa1:y1:ee".to_vec()
    );
}

// ============================================================================
// Crawler over loopback UDP
// ============================================================================

async fn crawler() -> DhtCrawler {
    DhtCrawler::bind("127.0.0.1:0".parse().unwrap(), 100)
        .await
        .unwrap()
}

async fn remote() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

/// Sends `msg` from `socket` and lets the crawler handle it.
async fn deliver(
    crawler: &mut DhtCrawler,
    socket: &UdpSocket,
    msg: &KrpcMessage,
) -> Option<crate::client::CandidateWork> {
    socket
        .send_to(&msg.encode(), crawler.local_addr())
        .await
        .unwrap();
    let mut buf = vec![0u8; 2048];
    let (n, from) = crawler.recv_from(&mut buf).await.unwrap();
    crawler.handle_datagram(&buf[..n], from).await
}

async fn reply(socket: &UdpSocket) -> KrpcMessage {
    let mut buf = vec![0u8; 2048];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    KrpcMessage::parse(&buf[..n]).unwrap()
}

fn get_token(msg: &KrpcMessage) -> Bytes {
    match &msg.kind {
        MessageKind::Response(r) => r.token.clone().unwrap(),
        other => panic!("expected response, got {:?}", other),
    }
}

fn announce(info_hash: InfoHash, port: u16, token: Bytes, implied_port: bool) -> KrpcMessage {
    KrpcMessage::query(
        Bytes::from_static(b"an"),
        NodeId([5; 20]),
        Query::AnnouncePeer {
            info_hash,
            port,
            token,
            implied_port,
        },
    )
}

#[tokio::test]
async fn test_crawler_answers_ping() {
    let mut crawler = crawler().await;
    let socket = remote().await;

    let ping = KrpcMessage::query(Bytes::from_static(b"pp"), NodeId([5; 20]), Query::Ping);
    assert!(deliver(&mut crawler, &socket, &ping).await.is_none());

    let msg = reply(&socket).await;
    assert_eq!(msg.transaction_id, Bytes::from_static(b"pp"));
    let MessageKind::Response(response) = msg.kind else {
        panic!("expected response");
    };
    assert_eq!(&response.id.0[..10], &[5; 10]);
    assert_eq!(&response.id.0[10..], &crawler.our_id().0[10..]);
}

#[tokio::test]
async fn test_crawler_get_peers_then_announce() {
    let mut crawler = crawler().await;
    let socket = remote().await;
    let info_hash = InfoHash::from([0x42; 20]);

    let get_peers = KrpcMessage::query(
        Bytes::from_static(b"gp"),
        NodeId([5; 20]),
        Query::GetPeers { info_hash },
    );
    assert!(deliver(&mut crawler, &socket, &get_peers).await.is_none());
    let response = reply(&socket).await;
    let token = get_token(&response);
    assert_eq!(token.len(), 8);
    if let MessageKind::Response(r) = &response.kind {
        assert_eq!(&r.id.0[..10], &[0x42; 10]);
    }

    let work = deliver(&mut crawler, &socket, &announce(info_hash, 51413, token, false))
        .await
        .unwrap();
    assert_eq!(work.info_hash, info_hash);
    assert_eq!(work.peer, "127.0.0.1:51413".parse::<SocketAddr>().unwrap());
    assert!(matches!(reply(&socket).await.kind, MessageKind::Response(_)));
}

#[tokio::test]
async fn test_crawler_implied_port() {
    let mut crawler = crawler().await;
    let socket = remote().await;
    let info_hash = InfoHash::from([0x42; 20]);

    let get_peers = KrpcMessage::query(
        Bytes::from_static(b"gp"),
        NodeId([5; 20]),
        Query::GetPeers { info_hash },
    );
    deliver(&mut crawler, &socket, &get_peers).await;
    let token = get_token(&reply(&socket).await);

    let work = deliver(&mut crawler, &socket, &announce(info_hash, 0, token, true))
        .await
        .unwrap();
    assert_eq!(work.peer, socket.local_addr().unwrap());
}

#[tokio::test]
async fn test_crawler_token_survives_one_rotation() {
    let mut crawler = crawler().await;
    let socket = remote().await;
    let info_hash = InfoHash::from([0x42; 20]);

    let get_peers = KrpcMessage::query(
        Bytes::from_static(b"gp"),
        NodeId([5; 20]),
        Query::GetPeers { info_hash },
    );
    deliver(&mut crawler, &socket, &get_peers).await;
    let token = get_token(&reply(&socket).await);

    crawler.rotate_tokens();
    assert!(deliver(&mut crawler, &socket, &announce(info_hash, 6881, token.clone(), false))
        .await
        .is_some());
    reply(&socket).await;

    crawler.rotate_tokens();
    assert!(deliver(&mut crawler, &socket, &announce(info_hash, 6881, token, false))
        .await
        .is_none());
    assert!(matches!(
        reply(&socket).await.kind,
        MessageKind::Error { code: 203, .. }
    ));
}

#[tokio::test]
async fn test_crawler_rejects_bad_announces() {
    let mut crawler = crawler().await;
    let socket = remote().await;
    let info_hash = InfoHash::from([0x42; 20]);

    let forged = announce(info_hash, 6881, Bytes::from_static(b"12345678"), false);
    assert!(deliver(&mut crawler, &socket, &forged).await.is_none());
    assert!(matches!(
        reply(&socket).await.kind,
        MessageKind::Error { code: 203, .. }
    ));

    let get_peers = KrpcMessage::query(
        Bytes::from_static(b"gp"),
        NodeId([5; 20]),
        Query::GetPeers { info_hash },
    );
    deliver(&mut crawler, &socket, &get_peers).await;
    let token = get_token(&reply(&socket).await);
    assert!(deliver(&mut crawler, &socket, &announce(info_hash, 0, token, false))
        .await
        .is_none());
    assert!(matches!(
        reply(&socket).await.kind,
        MessageKind::Error { code: 203, .. }
    ));
}

#[tokio::test]
async fn test_crawler_unknown_method() {
    let mut crawler = crawler().await;
    let socket = remote().await;

    let vote = KrpcMessage::query(
        Bytes::from_static(b"vv"),
        NodeId([5; 20]),
        Query::Unknown("vote".into()),
    );
    assert!(deliver(&mut crawler, &socket, &vote).await.is_none());
    assert!(matches!(
        reply(&socket).await.kind,
        MessageKind::Error { code: 204, .. }
    ));
}

#[tokio::test]
async fn test_crawler_ignores_garbage() {
    let mut crawler = crawler().await;
    let socket = remote().await;

    socket
        .send_to(b"d1:ad2:id", crawler.local_addr())
        .await
        .unwrap();
    let mut buf = vec![0u8; 2048];
    let (n, from) = crawler.recv_from(&mut buf).await.unwrap();
    assert!(crawler.handle_datagram(&buf[..n], from).await.is_none());
    assert!(crawler.routing_table().is_empty());
}

#[tokio::test]
async fn test_crawler_learns_filtered_contacts() {
    let mut crawler = crawler().await;
    let our_id = *crawler.our_id();
    let from: SocketAddr = "127.0.0.1:6881".parse().unwrap();

    let nodes = vec![
        contact(1, 6881),
        contact(2, 0),
        NodeContact::new(our_id, addr(3, 6881)),
        NodeContact::new(NodeId([4; 20]), "0.0.0.0:6881".parse().unwrap()),
        contact(5, 6885),
    ];
    let msg = KrpcMessage::response(
        Bytes::from_static(b"fn"),
        Response::new(NodeId([9; 20])).with_nodes(nodes),
    );
    crawler.handle_datagram(&msg.encode(), from).await;

    let ids: Vec<u8> = crawler
        .routing_table()
        .closest(&NodeId([0; 20]), 10)
        .iter()
        .map(|c| c.id.0[0])
        .collect();
    assert_eq!(ids, vec![1, 5]);
}

#[tokio::test]
async fn test_crawler_walk() {
    let bootstrap = remote().await;
    let contact_socket = remote().await;
    let mut crawler = crawler().await;
    crawler.set_bootstrap(vec![bootstrap.local_addr().unwrap()]);

    let contact = NodeContact::new(NodeId([0x33; 20]), contact_socket.local_addr().unwrap());
    let msg = KrpcMessage::response(
        Bytes::from_static(b"fn"),
        Response::new(NodeId([9; 20])).with_nodes(vec![contact]),
    );
    crawler
        .handle_datagram(&msg.encode(), bootstrap.local_addr().unwrap())
        .await;
    assert_eq!(crawler.routing_table().len(), 1);

    crawler.walk().await;
    assert!(crawler.routing_table().is_empty());

    let join = reply(&bootstrap).await;
    match join.kind {
        MessageKind::Query {
            sender,
            query: Query::FindNode { .. },
        } => assert_eq!(sender, Some(*crawler.our_id())),
        other => panic!("expected find_node, got {:?}", other),
    }

    let walked = reply(&contact_socket).await;
    let MessageKind::Query {
        sender: Some(sender),
        query: Query::FindNode { .. },
    } = walked.kind
    else {
        panic!("expected find_node");
    };
    assert_eq!(&sender.0[..10], &[0x33; 10]);
    assert_eq!(&sender.0[10..], &crawler.our_id().0[10..]);
}

#[test]
fn test_find_node_wire_format() {
    let msg = KrpcMessage::find_node(
        Bytes::from_static(b"aa"),
        NodeId(*b"abcdefghij0123456789"),
        NodeId(*b"mnopqrstuvwxyz123456"),
    );
    let value = decode(&msg.encode()).unwrap();
    assert_eq!(value.get_str(b"q"), Some("find_node"));
    assert_eq!(value.get_str(b"y"), Some("q"));
    let args = value.get(b"a").unwrap();
    assert_eq!(args.get_str(b"target"), Some("mnopqrstuvwxyz123456"));
    assert!(matches!(args.get(b"id"), Some(Value::Bytes(_))));
}

#[tokio::test]
async fn test_resolve_bootstrap_keeps_ipv4() {
    let hosts = vec!["127.0.0.1:6881".to_string(), "[::1]:6881".to_string()];
    let addrs = resolve_bootstrap(hosts, Duration::from_secs(1), Duration::from_millis(10)).await;
    assert_eq!(addrs, vec!["127.0.0.1:6881".parse::<SocketAddr>().unwrap()]);

    let none = resolve_bootstrap(vec![], Duration::from_secs(1), Duration::from_millis(10)).await;
    assert!(none.is_empty());
}

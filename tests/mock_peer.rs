//! Mock BitTorrent peer for testing
//!
//! Serves ut_metadata over real loopback TCP. Each peer counts the
//! connections it accepts, and peers sharing a [`Concurrency`] tracker
//! record the largest number of sessions they were serving at once.

#![allow(dead_code)]

use bytes::{Buf, BytesMut};
use magnet_spider::wire::{extended_frame, ExtensionHandshake, Handshake, MetadataMessage, UT_METADATA};
use magnet_spider::InfoHash;
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Our ut_metadata id, as advertised to the client.
const MOCK_UT_METADATA: u8 = 2;

#[derive(Clone)]
pub enum Behavior {
    /// Serve `metadata` correctly.
    Serve(Vec<u8>),
    /// Clear the extension bit in our handshake.
    NoExtensions,
    /// Serve bytes that do not hash to the requested infohash.
    Corrupt(Vec<u8>),
    /// Reject every piece request.
    Reject(Vec<u8>),
}

#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Concurrency {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> Slot {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        Slot(Some(self.clone()))
    }
}

/// A session counted by [`Concurrency`]. Released once the last piece is
/// written, since the client may open its next session before we see EOF.
struct Slot(Option<Arc<Concurrency>>);

impl Slot {
    fn release(&mut self) {
        if let Some(concurrency) = self.0.take() {
            concurrency.current.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct MockPeer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl MockPeer {
    pub async fn start(behavior: Behavior) -> Self {
        Self::start_with(behavior, Duration::ZERO, Arc::new(Concurrency::default())).await
    }

    /// Starts a peer that waits `hold` before answering each handshake.
    pub async fn start_with(behavior: Behavior, hold: Duration, concurrency: Arc<Concurrency>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let behavior = behavior.clone();
                let concurrency = concurrency.clone();
                tokio::spawn(async move {
                    let mut slot = concurrency.enter();
                    if let Err(e) = serve(stream, &behavior, hold, &mut slot).await {
                        tracing::debug!("mock peer connection ended: {}", e);
                    }
                });
            }
        });

        Self { addr, accepted }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// The infohash of an info dictionary served unwrapped.
pub fn info_hash_of(metadata: &[u8]) -> InfoHash {
    let digest: [u8; 20] = Sha1::digest(metadata).into();
    InfoHash::from(digest)
}

/// A small single-file info dictionary.
pub fn sample_info(name: &str, length: i64) -> Vec<u8> {
    format!(
        "d6:lengthi{}e4:name{}:{}12:piece lengthi16384e6:pieces20:{}e",
        length,
        name.len(),
        name,
        "x".repeat(20)
    )
    .into_bytes()
}

async fn serve(
    mut stream: TcpStream,
    behavior: &Behavior,
    hold: Duration,
    slot: &mut Slot,
) -> std::io::Result<()> {
    let mut handshake = [0u8; 68];
    stream.read_exact(&mut handshake).await?;
    tokio::time::sleep(hold).await;

    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&handshake[28..48]);
    let mut ours = Handshake::new(info_hash, *b"-MO0001-abcdefghijkl");
    if matches!(behavior, Behavior::NoExtensions) {
        ours.reserved = [0; 8];
    }
    stream.write_all(&ours.encode()).await?;

    let metadata = match behavior {
        Behavior::Serve(m) | Behavior::Reject(m) => m.clone(),
        Behavior::Corrupt(m) => {
            let mut m = m.clone();
            if let Some(last) = m.iter().rposition(|&b| b == b'x') {
                m[last] = b'y';
            }
            m
        }
        Behavior::NoExtensions => return drain(stream).await,
    };

    let piece_count = metadata.len().div_ceil(16384);
    let mut served = std::collections::HashSet::new();
    let mut client_ut_metadata = None;
    let mut buf = BytesMut::new();
    loop {
        let Some(message) = read_message(&mut stream, &mut buf).await? else {
            return Ok(());
        };
        if message.len() < 2 || message[0] != 20 {
            continue;
        }

        let payload = &message[2..];
        if message[1] == 0 {
            let theirs = ExtensionHandshake::decode(payload)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            client_ut_metadata = theirs.get_extension_id(UT_METADATA);

            let mut reply = ExtensionHandshake::with_extensions(&[(UT_METADATA, MOCK_UT_METADATA)]);
            reply.metadata_size = Some(metadata.len() as i64);
            stream.write_all(&extended_frame(0, &reply.encode())).await?;
        } else if message[1] == MOCK_UT_METADATA {
            let Some(client_id) = client_ut_metadata else {
                continue;
            };
            let request = MetadataMessage::decode(payload)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let response = if matches!(behavior, Behavior::Reject(_)) {
                MetadataMessage::reject(request.piece)
            } else {
                let start = request.piece as usize * 16384;
                let end = (start + 16384).min(metadata.len());
                MetadataMessage::data(
                    request.piece,
                    metadata.len() as i64,
                    bytes::Bytes::copy_from_slice(&metadata[start..end]),
                )
            };
            stream.write_all(&extended_frame(client_id, &response.encode())).await?;
            served.insert(request.piece);
            if served.len() == piece_count {
                slot.release();
            }
        }
    }
}

async fn read_message(stream: &mut TcpStream, buf: &mut BytesMut) -> std::io::Result<Option<BytesMut>> {
    loop {
        if buf.len() >= 4 {
            let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
            if buf.len() >= 4 + len {
                buf.advance(4);
                return Ok(Some(buf.split_to(len)));
            }
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}

async fn drain(mut stream: TcpStream) -> std::io::Result<()> {
    let mut sink = Vec::new();
    stream.read_to_end(&mut sink).await?;
    Ok(())
}

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use super::error::WireError;
use super::session::WireSession;
use crate::bencode::Value;
use crate::metainfo::InfoHash;

const READ_CHUNK: usize = 32 * 1024;

/// Connects to `addr` and fetches the info dictionary for `info_hash`.
///
/// `session_timeout` bounds the TCP connect and then every individual read
/// and write, so a peer that keeps trickling bytes stays alive while a silent one is
/// dropped.
///
/// ```no_run
/// use magnet_spider::metainfo::InfoHash;
/// use magnet_spider::wire::fetch_metadata;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let info_hash = InfoHash::from_hex("0123456789abcdef0123456789abcdef01234567")?;
/// let info = fetch_metadata("192.0.2.7:51413".parse()?, info_hash, Duration::from_secs(10)).await?;
/// println!("{:?}", info.get_str(b"name"));
/// # Ok(())
/// # }
/// ```
pub async fn fetch_metadata(
    addr: SocketAddr,
    info_hash: InfoHash,
    session_timeout: Duration,
) -> Result<Value, WireError> {
    let stream = timeout(session_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| WireError::ConnectTimeout)??;
    stream.set_nodelay(true)?;

    trace!(%addr, %info_hash, "connected");
    drive(stream, WireSession::new(info_hash), session_timeout).await
}

/// Runs `session` over an already-connected stream until it finishes.
pub async fn drive<S>(
    mut stream: S,
    mut session: WireSession,
    read_timeout: Duration,
) -> Result<Value, WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.send_handshake();
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        if let Some(out) = session.take_outgoing() {
            timeout(read_timeout, stream.write_all(&out))
                .await
                .map_err(|_| WireError::InactivityTimeout)??;
        }

        read_buf.clear();
        let n = timeout(read_timeout, stream.read_buf(&mut read_buf))
            .await
            .map_err(|_| WireError::InactivityTimeout)??;
        if n == 0 {
            return Err(WireError::ConnectionClosed);
        }

        if let Some(info) = session.feed(&read_buf)? {
            if let Err(e) = stream.shutdown().await {
                trace!("shutdown after metadata failed: {}", e);
            }
            return Ok(info);
        }
    }
}

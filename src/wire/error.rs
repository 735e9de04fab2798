use thiserror::Error;

/// Why a metadata session ended without producing metadata.
///
/// Every variant is local to one attempt: the scheduler logs it and moves on
/// to the next candidate peer.
#[derive(Debug, Error)]
pub enum WireError {
    /// Network I/O error (refused, reset, unreachable).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The TCP connect did not finish within the session timeout.
    #[error("connect timeout")]
    ConnectTimeout,

    /// The peer went quiet for longer than the session timeout.
    #[error("inactivity timeout")]
    InactivityTimeout,

    /// The peer closed the connection before metadata was complete.
    #[error("connection closed")]
    ConnectionClosed,

    /// Bad handshake, missing extension support or malformed framing.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer advertised or sent more than we are willing to buffer.
    #[error("{what} of {size} bytes exceeds limit of {limit}")]
    SizeLimitExceeded {
        what: &'static str,
        size: u64,
        limit: u64,
    },

    /// The reassembled metadata does not hash to the requested infohash.
    #[error("metadata checksum mismatch")]
    ChecksumMismatch,

    /// Bencode inside an extension message could not be decoded.
    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),
}

impl WireError {
    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        WireError::ProtocolViolation(msg.into())
    }
}

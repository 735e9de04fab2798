use crate::metainfo::InfoHash;
use std::net::SocketAddr;

/// One chance to fetch metadata for `info_hash` from `peer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateWork {
    pub info_hash: InfoHash,
    pub peer: SocketAddr,
}

impl CandidateWork {
    pub fn new(info_hash: InfoHash, peer: SocketAddr) -> Self {
        Self { info_hash, peer }
    }
}

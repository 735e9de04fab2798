use super::work::CandidateWork;
use crate::metainfo::InfoHash;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;

/// Admission-controlled buffer of pending metadata attempts.
///
/// Infohashes wait in a FIFO for their first attempt. Once one is handed
/// out it becomes *outstanding* and further peers for it are buffered as
/// alternates (at most `per_limit`), to be tried one at a time if the
/// current attempt fails. Alternates for an infohash are exhausted before
/// the next infohash is taken from the FIFO.
#[derive(Debug)]
pub struct PeerQueue {
    max_size: usize,
    per_limit: usize,
    pending: VecDeque<CandidateWork>,
    queued: HashSet<InfoHash>,
    alternates: HashMap<InfoHash, VecDeque<SocketAddr>>,
}

impl PeerQueue {
    pub fn new(max_size: usize, per_limit: usize) -> Self {
        Self {
            max_size,
            per_limit,
            pending: VecDeque::new(),
            queued: HashSet::new(),
            alternates: HashMap::new(),
        }
    }

    /// Buffers `work`. Returns `false` if it was dropped because the queue
    /// or the infohash's alternate list is full, or the infohash is already
    /// waiting in the FIFO.
    pub fn push(&mut self, work: CandidateWork) -> bool {
        if let Some(alternates) = self.alternates.get_mut(&work.info_hash) {
            if alternates.len() < self.per_limit {
                alternates.push_back(work.peer);
                return true;
            }
            return false;
        }

        if self.queued.contains(&work.info_hash) || self.pending.len() >= self.max_size {
            return false;
        }

        self.queued.insert(work.info_hash);
        self.pending.push_back(work);
        true
    }

    /// Reports the end of an attempt for `info_hash` and returns what to try
    /// next.
    ///
    /// On success the infohash is retired. On failure its next alternate is
    /// returned, if any; otherwise it is retired and the next FIFO entry is
    /// handed out.
    pub fn shift(&mut self, info_hash: &InfoHash, successful: bool) -> Option<CandidateWork> {
        if successful {
            self.alternates.remove(info_hash);
        } else if let Some(alternates) = self.alternates.get_mut(info_hash) {
            if let Some(peer) = alternates.pop_front() {
                return Some(CandidateWork::new(*info_hash, peer));
            }
            self.alternates.remove(info_hash);
        }

        self.pop_next()
    }

    /// Hands out the oldest waiting infohash and marks it outstanding.
    pub fn pop_next(&mut self) -> Option<CandidateWork> {
        let work = self.pending.pop_front()?;
        self.queued.remove(&work.info_hash);
        self.alternates.insert(work.info_hash, VecDeque::new());
        Some(work)
    }

    /// Infohashes waiting for a first attempt.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Infohashes with an attempt in flight.
    pub fn outstanding(&self) -> usize {
        self.alternates.len()
    }

    pub fn alternates(&self, info_hash: &InfoHash) -> usize {
        self.alternates.get(info_hash).map_or(0, VecDeque::len)
    }
}

use super::queue::PeerQueue;
use super::work::CandidateWork;
use crate::metainfo::{InfoHash, TorrentMetadata};
use crate::wire::{fetch_metadata, WireError};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, trace};

/// Decides whether an attempt should be skipped, e.g. because the host
/// already stored that infohash.
///
/// Implemented for any `FnMut(InfoHash, SocketAddr) -> impl Future<Output = bool>`.
/// Returning `true` skips the attempt.
pub trait Admission: Send {
    fn ignore(&mut self, info_hash: InfoHash, peer: SocketAddr) -> BoxFuture<'static, bool>;
}

impl<F, Fut> Admission for F
where
    F: FnMut(InfoHash, SocketAddr) -> Fut + Send,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn ignore(&mut self, info_hash: InfoHash, peer: SocketAddr) -> BoxFuture<'static, bool> {
        Box::pin(self(info_hash, peer))
    }
}

/// Admits every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl Admission for AdmitAll {
    fn ignore(&mut self, _: InfoHash, _: SocketAddr) -> BoxFuture<'static, bool> {
        Box::pin(futures::future::ready(false))
    }
}

/// How one attempt ended.
#[derive(Debug)]
pub enum AttemptOutcome {
    Complete(TorrentMetadata),
    /// The admission predicate skipped it; no connection was made.
    Ignored(CandidateWork),
    Failed {
        work: CandidateWork,
        error: WireError,
    },
}

type Attempt = BoxFuture<'static, (CandidateWork, AttemptOutcome)>;

/// Bounds concurrent metadata sessions and feeds them from a [`PeerQueue`].
///
/// All attempts live in one [`FuturesUnordered`] owned by the scheduler, so
/// they only make progress while the owner awaits
/// [`next_completion`](Self::next_completion). Each completion frees a slot
/// and immediately dispatches the next candidate.
pub struct ConnectionScheduler {
    queue: PeerQueue,
    max_connections: usize,
    timeout: Duration,
    admission: Box<dyn Admission>,
    attempts: FuturesUnordered<Attempt>,
    closed: bool,
}

impl ConnectionScheduler {
    pub fn new(queue: PeerQueue, max_connections: usize, timeout: Duration) -> Self {
        Self {
            queue,
            max_connections,
            timeout,
            admission: Box::new(AdmitAll),
            attempts: FuturesUnordered::new(),
            closed: false,
        }
    }

    pub fn set_admission(&mut self, admission: impl Admission + 'static) {
        self.admission = Box::new(admission);
    }

    /// Queues `work` and starts an attempt if a slot is free.
    pub fn add(&mut self, work: CandidateWork) {
        if self.closed {
            return;
        }
        if !self.queue.push(work) {
            trace!("queue saturated, dropping {} from {}", work.info_hash, work.peer);
            return;
        }
        if self.attempts.len() < self.max_connections {
            if let Some(next) = self.queue.pop_next() {
                self.launch(next);
            }
        }
    }

    /// No infohash is waiting for a first attempt.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Attempts in flight, including ones still consulting the admission
    /// predicate.
    pub fn active(&self) -> usize {
        self.attempts.len()
    }

    pub fn queue(&self) -> &PeerQueue {
        &self.queue
    }

    /// Stops dispatching. Attempts already in flight still run to completion.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Waits for the next attempt to finish and dispatches its successor.
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<AttemptOutcome> {
        let (work, outcome) = self.attempts.next().await?;

        let successful = match &outcome {
            AttemptOutcome::Complete(_) | AttemptOutcome::Ignored(_) => true,
            AttemptOutcome::Failed { error, .. } => {
                debug!("metadata for {} from {} failed: {}", work.info_hash, work.peer, error);
                false
            }
        };

        if !self.closed {
            if let Some(next) = self.queue.shift(&work.info_hash, successful) {
                self.launch(next);
            }
        }

        Some(outcome)
    }

    fn launch(&mut self, work: CandidateWork) {
        let verdict = self.admission.ignore(work.info_hash, work.peer);
        let timeout = self.timeout;

        self.attempts.push(Box::pin(async move {
            if verdict.await {
                return (work, AttemptOutcome::Ignored(work));
            }

            let outcome = match fetch_metadata(work.peer, work.info_hash, timeout).await {
                Ok(info) => match TorrentMetadata::new(work.info_hash, info, work.peer) {
                    Ok(metadata) => AttemptOutcome::Complete(metadata),
                    Err(e) => AttemptOutcome::Failed {
                        work,
                        error: WireError::ProtocolViolation(e.to_string()),
                    },
                },
                Err(error) => AttemptOutcome::Failed { work, error },
            };
            (work, outcome)
        }));
    }
}

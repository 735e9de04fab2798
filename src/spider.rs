//! The crawler's entry point.
//!
//! [`Spider`] owns one DHT crawler and one connection scheduler and drives
//! both from a single task: UDP datagrams, session completions, walks and
//! token rotation are all multiplexed in one `select!` loop, so none of the
//! shared state needs a lock.
//!
//! ```no_run
//! use magnet_spider::{Spider, SpiderConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let spider = Spider::listen(SpiderConfig::default(), tx).await?;
//! let handle = spider.handle();
//! tokio::spawn(spider.run());
//!
//! while let Some(torrent) = rx.recv().await {
//!     println!("{} {:?}", torrent.magnet, torrent.name());
//! }
//! handle.close();
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::client::{AttemptOutcome, ConnectionScheduler, PeerQueue};
use crate::config::{ConfigError, SpiderConfig};
use crate::constants::{MAX_DATAGRAM_SIZE, TOKEN_ROTATION_INTERVAL};
use crate::dht::{resolve_bootstrap, DhtCrawler, DhtError};
use crate::metainfo::{InfoHash, TorrentMetadata};

#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("dht error: {0}")]
    Dht(#[from] DhtError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Stops a running [`Spider`] from another task.
#[derive(Debug, Clone)]
pub struct SpiderHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl SpiderHandle {
    /// Stops the UDP listener. Sessions already in flight finish and their
    /// results are still delivered before [`Spider::run`] returns.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

pub struct Spider {
    config: SpiderConfig,
    crawler: DhtCrawler,
    scheduler: ConnectionScheduler,
    events: mpsc::UnboundedSender<TorrentMetadata>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Spider {
    /// Validates `config` and binds the DHT socket. Recovered metadata is
    /// sent on `events`.
    pub async fn listen(
        config: SpiderConfig,
        events: mpsc::UnboundedSender<TorrentMetadata>,
    ) -> Result<Self, SpiderError> {
        config.validate()?;

        let crawler = DhtCrawler::bind(config.listen_addr, config.nodes_max_size).await?;

        let queue = PeerQueue::new(config.queue_max_size(), config.queue_per_limit);
        let scheduler = ConnectionScheduler::new(queue, config.max_connections, config.timeout());
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            crawler,
            scheduler,
            events,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Registers a predicate consulted before every connection attempt;
    /// returning `true` skips the attempt and retires the infohash.
    pub fn set_ignore<F, Fut>(&mut self, ignore: F)
    where
        F: FnMut(InfoHash, SocketAddr) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.scheduler.set_admission(ignore);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.crawler.local_addr()
    }

    pub fn handle(&self) -> SpiderHandle {
        SpiderHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Crawls until [`SpiderHandle::close`] is called, then drains in-flight
    /// sessions.
    ///
    /// The configured bootstrap nodes are resolved alongside the crawl, so
    /// a slow resolver never stalls the UDP listener or running sessions.
    pub async fn run(self) -> Result<(), SpiderError> {
        let bootstrap = resolve_bootstrap(
            self.config.bootstrap_nodes.clone(),
            self.config.timeout(),
            self.config.walk_interval(),
        );
        self.run_with_bootstrap(bootstrap).await
    }

    /// Like [`run`](Self::run), but joins through whatever addresses
    /// `bootstrap` yields. The crawler answers queries and fetches metadata
    /// while it is pending.
    pub async fn run_with_bootstrap<F>(self, bootstrap: F) -> Result<(), SpiderError>
    where
        F: Future<Output = Vec<SocketAddr>> + Send + 'static,
    {
        let Spider {
            config,
            mut crawler,
            mut scheduler,
            events,
            shutdown,
        } = self;

        let mut closed = shutdown.subscribe();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let mut walk = interval(config.walk_interval());
        walk.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut rotate = interval(TOKEN_ROTATION_INTERVAL);
        rotate.set_missed_tick_behavior(MissedTickBehavior::Skip);
        rotate.tick().await;

        let mut bootstrap = Box::pin(bootstrap);
        let mut bootstrapped = false;

        info!("spider listening on {}", crawler.local_addr());

        while !*closed.borrow_and_update() {
            tokio::select! {
                _ = closed.changed() => {}
                result = crawler.recv_from(&mut buf) => match result {
                    Ok((n, from)) => {
                        if let Some(work) = crawler.handle_datagram(&buf[..n], from).await {
                            scheduler.add(work);
                        }
                    }
                    Err(e) => debug!("udp receive failed: {}", e),
                },
                Some(outcome) = scheduler.next_completion(), if scheduler.active() > 0 => {
                    deliver(&events, outcome);
                }
                addrs = &mut bootstrap, if !bootstrapped => {
                    bootstrapped = true;
                    crawler.set_bootstrap(addrs);
                    crawler.join().await;
                }
                _ = walk.tick() => {
                    if scheduler.is_idle() {
                        crawler.walk().await;
                    }
                }
                _ = rotate.tick() => crawler.rotate_tokens(),
            }
        }

        drop(crawler);
        scheduler.close();
        info!("spider closed, draining {} sessions", scheduler.active());

        while let Some(outcome) = scheduler.next_completion().await {
            deliver(&events, outcome);
        }
        Ok(())
    }
}

fn deliver(events: &mpsc::UnboundedSender<TorrentMetadata>, outcome: AttemptOutcome) {
    if let AttemptOutcome::Complete(metadata) = outcome {
        info!(
            info_hash = %metadata.info_hash,
            peer = %metadata.addr,
            name = metadata.name().as_deref().unwrap_or(""),
            "metadata recovered"
        );
        if events.send(metadata).is_err() {
            debug!("metadata receiver dropped");
        }
    }
}

//! Crawls the live DHT and prints every torrent whose metadata is recovered.
//!
//! Configure with `SPIDER_*` environment variables and `RUST_LOG`:
//!
//! ```text
//! SPIDER_PORT=6881 SPIDER_MAX_CONNECTIONS=100 RUST_LOG=magnet_spider=info cargo run --example crawl
//! ```

use magnet_spider::{Spider, SpiderConfig};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SpiderConfig::from_env()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut spider = Spider::listen(config, tx).await?;

    let seen = Arc::new(Mutex::new(HashSet::new()));
    let known = seen.clone();
    spider.set_ignore(move |info_hash, _| {
        let skip = known.lock().map_or(false, |set| set.contains(&info_hash));
        async move { skip }
    });

    println!("listening on {}", spider.local_addr());
    let handle = spider.handle();
    let running = tokio::spawn(spider.run());

    loop {
        tokio::select! {
            torrent = rx.recv() => {
                // Closes once run() has drained its sessions.
                let Some(torrent) = torrent else { break };
                if let Ok(mut set) = seen.lock() {
                    set.insert(torrent.info_hash);
                }
                let files = torrent.files();
                println!(
                    "{} | {} | {} file(s), {} bytes | from {}",
                    torrent.magnet,
                    torrent.name().unwrap_or_default(),
                    files.len(),
                    torrent.total_size(),
                    torrent.addr,
                );
            }
            _ = tokio::signal::ctrl_c() => {
                println!("shutting down");
                handle.close();
            }
        }
    }

    running.await??;
    Ok(())
}

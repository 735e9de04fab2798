use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::Value;
use std::net::{IpAddr, SocketAddr};

/// One file listed in a recovered info dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the torrent root, components joined with `/`.
    pub path: String,
    pub length: u64,
}

/// Metadata recovered for one infohash from one peer.
///
/// This is the single event the crawler hands to its host. Everything
/// downstream (persistence, search indexing, live updates) keys off
/// [`info_hash`](Self::info_hash) and reads `name`, `files` and `length`
/// out of [`info`](Self::info).
///
/// ```
/// use magnet_spider::bencode::decode;
/// use magnet_spider::metainfo::{InfoHash, TorrentMetadata};
///
/// let info = decode(b"d6:lengthi42e4:name8:demo.isoe").unwrap();
/// let meta = TorrentMetadata::new(InfoHash([0xab; 20]), info, "10.0.0.1:6881".parse().unwrap()).unwrap();
///
/// assert_eq!(meta.magnet, format!("magnet:?xt=urn:btih:{}", "ab".repeat(20)));
/// assert_eq!(meta.name().as_deref(), Some("demo.iso"));
/// assert_eq!(meta.total_size(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct TorrentMetadata {
    pub info_hash: InfoHash,
    /// The decoded info dictionary.
    pub info: Value,
    /// `magnet:?xt=urn:btih:<lowercase hex infohash>`.
    pub magnet: String,
    /// The peer the metadata was fetched from.
    pub addr: SocketAddr,
}

impl TorrentMetadata {
    pub fn new(info_hash: InfoHash, info: Value, addr: SocketAddr) -> Result<Self, MetainfoError> {
        if info.as_dict().is_none() {
            return Err(MetainfoError::NotADictionary);
        }

        Ok(Self {
            magnet: info_hash.magnet_uri(),
            info_hash,
            info,
            addr,
        })
    }

    pub fn address(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The torrent name, preferring the `name.utf-8` variant some clients write.
    pub fn name(&self) -> Option<String> {
        self.info
            .get(b"name.utf-8")
            .or_else(|| self.info.get(b"name"))
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Files sorted by path. A single-file torrent yields one entry named
    /// after the torrent.
    pub fn files(&self) -> Vec<FileEntry> {
        let Some(list) = self.info.get(b"files").and_then(Value::as_list) else {
            return self
                .name()
                .map(|path| {
                    vec![FileEntry {
                        path,
                        length: non_negative(self.info.get_integer(b"length")),
                    }]
                })
                .unwrap_or_default();
        };

        let mut files: Vec<FileEntry> = list
            .iter()
            .filter_map(|file| {
                let components = file
                    .get(b"path.utf-8")
                    .or_else(|| file.get(b"path"))
                    .and_then(Value::as_list)?;

                let path = components
                    .iter()
                    .filter_map(Value::as_bytes)
                    .map(|c| String::from_utf8_lossy(c).into_owned())
                    .collect::<Vec<_>>()
                    .join("/");

                Some(FileEntry {
                    path,
                    length: non_negative(file.get_integer(b"length")),
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    pub fn total_size(&self) -> u64 {
        self.files().iter().map(|f| f.length).sum()
    }
}

fn non_negative(length: Option<i64>) -> u64 {
    length.and_then(|l| u64::try_from(l).ok()).unwrap_or(0)
}

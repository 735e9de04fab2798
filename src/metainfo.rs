//! Infohashes and the metadata recovered for them.

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{FileEntry, TorrentMetadata};

#[cfg(test)]
mod tests;

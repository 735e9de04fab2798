use thiserror::Error;

/// Errors produced while interpreting infohashes and recovered metadata.
#[derive(Debug, Error, PartialEq)]
pub enum MetainfoError {
    /// The infohash is not 20 bytes (40 hex characters).
    #[error("invalid info hash length: {0}")]
    InvalidInfoHashLength(usize),

    /// The infohash text is not hexadecimal.
    #[error("invalid info hash hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Recovered metadata whose top level is not a dictionary.
    #[error("info is not a dictionary")]
    NotADictionary,
}

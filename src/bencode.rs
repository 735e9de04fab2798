//! Bencode encoding and decoding ([BEP-3]).
//!
//! Every structure this crate exchanges with the network is bencoded: KRPC
//! datagrams, the extension handshake, ut_metadata messages and the info
//! dictionary that is finally recovered.
//!
//! ```
//! use magnet_spider::bencode::{decode, encode, Value};
//!
//! let value = decode(b"d3:foo3:bare").unwrap();
//! assert_eq!(value.get_str(b"foo"), Some("bar"));
//! assert_eq!(encode(&value), b"d3:foo3:bare");
//!
//! let ext = Value::dict([(b"m".as_slice(), Value::dict([(b"ut_metadata".as_slice(), Value::Integer(1))]))]);
//! assert_eq!(encode(&ext), b"d1:md11:ut_metadatai1eee");
//! ```
//!
//! Decoding is defensive: nesting is capped, string lengths are checked
//! against the remaining input before anything is copied, and malformed
//! integers (leading zeros, `-0`) are rejected.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_prefix};
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;

use super::*;
use crate::bencode::{decode, Value};
use std::net::SocketAddr;

fn peer() -> SocketAddr {
    "192.0.2.7:51413".parse().unwrap()
}

#[test]
fn test_info_hash_hex_roundtrip() {
    let hash = InfoHash([0x0f; 20]);
    let hex = hash.to_hex();
    assert_eq!(hex.len(), 40);
    assert_eq!(hex, "0f".repeat(20));
    assert_eq!(InfoHash::from_hex(&hex).unwrap(), hash);
    assert_eq!(InfoHash::from_hex(&hex.to_uppercase()).unwrap(), hash);
}

#[test]
fn test_info_hash_invalid() {
    assert_eq!(
        InfoHash::from_bytes(&[0u8; 19]),
        Err(MetainfoError::InvalidInfoHashLength(19))
    );
    assert!(InfoHash::from_hex("zz").is_err());
    assert_eq!(
        InfoHash::from_hex("abcd"),
        Err(MetainfoError::InvalidInfoHashLength(2))
    );
}

#[test]
fn test_magnet_uri() {
    let hash = InfoHash::from_hex("c12fe1c06bba254a9dc9f519b335aa7c1367a88a").unwrap();
    assert_eq!(
        hash.magnet_uri(),
        "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a"
    );
    assert_eq!(hash.to_string(), "c12fe1c06bba254a9dc9f519b335aa7c1367a88a");
}

#[test]
fn test_metadata_rejects_non_dict() {
    let err = TorrentMetadata::new(InfoHash([1; 20]), Value::Integer(3), peer()).unwrap_err();
    assert_eq!(err, MetainfoError::NotADictionary);
}

#[test]
fn test_single_file_listing() {
    let info = decode(b"d6:lengthi1024e4:name9:movie.mkv12:piece lengthi16384ee").unwrap();
    let meta = TorrentMetadata::new(InfoHash([2; 20]), info, peer()).unwrap();

    assert_eq!(meta.address().to_string(), "192.0.2.7");
    assert_eq!(meta.port(), 51413);
    assert_eq!(
        meta.files(),
        vec![FileEntry {
            path: "movie.mkv".into(),
            length: 1024
        }]
    );
    assert_eq!(meta.total_size(), 1024);
}

#[test]
fn test_multi_file_listing_sorted() {
    let info = decode(
        b"d5:filesld6:lengthi10e4:pathl3:sub5:b.txteed6:lengthi5e4:pathl5:a.txteee4:name3:dire",
    )
    .unwrap();
    let meta = TorrentMetadata::new(InfoHash([3; 20]), info, peer()).unwrap();

    let files = meta.files();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, "a.txt");
    assert_eq!(files[1].path, "sub/b.txt");
    assert_eq!(meta.total_size(), 15);
    assert_eq!(meta.name().as_deref(), Some("dir"));
}

#[test]
fn test_name_prefers_utf8_variant() {
    let info = decode(b"d4:name3:abc10:name.utf-83:xyze").unwrap();
    let meta = TorrentMetadata::new(InfoHash([4; 20]), info, peer()).unwrap();
    assert_eq!(meta.name().as_deref(), Some("xyz"));
}

#[test]
fn test_negative_length_counts_as_zero() {
    let info = decode(b"d6:lengthi-5e4:name1:xe").unwrap();
    let meta = TorrentMetadata::new(InfoHash([5; 20]), info, peer()).unwrap();
    assert_eq!(meta.total_size(), 0);
}

// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Exercises the codec against a hand-assembled preamble, the way a real pool
//! file would actually lay the bytes out, rather than round-tripping each
//! struct in isolation (covered by `codec.rs`'s own unit tests).

use tiered_pool::codec::{decode_uuid, encode_uuid, validate_magic_and_version, PoolHeader, PREAMBLE_LEN, UUID_LEN};
use tiered_pool::types::PoolUuid;

#[test]
fn preamble_bytes_match_the_documented_layout() {
    let uuid = PoolUuid::new();
    let header = PoolHeader { footer_addr: 9000 };

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"DDP");
    bytes.push(b'1');
    bytes.extend_from_slice(&encode_uuid(&uuid));
    bytes.extend_from_slice(&header.encode());

    assert_eq!(bytes.len() as u32, PREAMBLE_LEN);
    validate_magic_and_version(&bytes[0..4]).unwrap();

    let uuid_field = &bytes[4..4 + UUID_LEN];
    assert_eq!(decode_uuid(uuid_field).unwrap(), uuid);

    let header_field = &bytes[4 + UUID_LEN..];
    assert_eq!(PoolHeader::decode(header_field).unwrap(), header);
}

#[test]
fn uuid_field_rejects_non_utf8() {
    let bad = [0xFFu8; UUID_LEN];
    assert!(decode_uuid(&bad).is_err());
}
